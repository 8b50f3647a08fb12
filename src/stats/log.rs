//! Atomic ingest and query counters.

use crate::core::IngestReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters accumulated over a session.
#[derive(Debug)]
pub struct IngestStats {
    /// Directory scans performed
    scans: AtomicU64,
    /// Entries stored into the store
    stored: AtomicU64,
    /// Entries skipped because their cell was already filled
    duplicates: AtomicU64,
    /// Entries whose file could not be loaded
    load_failures: AtomicU64,
    /// Entries rejected as older than the retained history
    rejected: AtomicU64,
    /// Bins evicted to make room
    evicted: AtomicU64,
    /// Queries answered
    queries: AtomicU64,
    /// Queries that produced a non-empty frame
    frames_emitted: AtomicU64,
    session_start: DateTime<Utc>,
}

impl IngestStats {
    pub fn new() -> Self {
        Self {
            scans: AtomicU64::new(0),
            stored: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            load_failures: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            queries: AtomicU64::new(0),
            frames_emitted: AtomicU64::new(0),
            session_start: Utc::now(),
        }
    }

    pub fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold the outcome of one `ingest` call into the totals.
    pub fn record_report(&self, report: &IngestReport) {
        self.stored.fetch_add(report.stored, Ordering::Relaxed);
        self.duplicates
            .fetch_add(report.duplicates, Ordering::Relaxed);
        self.load_failures
            .fetch_add(report.load_failures, Ordering::Relaxed);
        self.rejected.fetch_add(report.rejected, Ordering::Relaxed);
        self.evicted.fetch_add(report.evicted, Ordering::Relaxed);
    }

    /// Record a query and whether it produced rows.
    pub fn record_query(&self, produced_rows: bool) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        if produced_rows {
            self.frames_emitted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            scans: self.scans.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            frames_emitted: self.frames_emitted.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Session Statistics:\n\
             - Directory scans: {}\n\
             - Entries stored: {}\n\
             - Duplicates skipped: {}\n\
             - Load failures: {}\n\
             - Entries rejected: {}\n\
             - Bins evicted: {}\n\
             - Queries: {} ({} with data)\n\
             - Session duration: {} seconds",
            stats.scans,
            stats.stored,
            stats.duplicates,
            stats.load_failures,
            stats.rejected,
            stats.evicted,
            stats.queries,
            stats.frames_emitted,
            stats.session_duration_secs
        )
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.scans,
            &self.stored,
            &self.duplicates,
            &self.load_failures,
            &self.rejected,
            &self.evicted,
            &self.queries,
            &self.frames_emitted,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for IngestStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub scans: u64,
    pub stored: u64,
    pub duplicates: u64,
    pub load_failures: u64,
    pub rejected: u64,
    pub evicted: u64,
    pub queries: u64,
    pub frames_emitted: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Thread-safe shared statistics.
pub type SharedIngestStats = Arc<IngestStats>;

pub fn create_shared_stats() -> SharedIngestStats {
    Arc::new(IngestStats::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_report() {
        let stats = IngestStats::new();
        stats.record_scan();
        stats.record_report(&IngestReport {
            stored: 3,
            duplicates: 2,
            load_failures: 1,
            partial_writes: 1,
            rejected: 0,
            evicted: 4,
        });
        stats.record_report(&IngestReport {
            stored: 1,
            ..IngestReport::default()
        });

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.scans, 1);
        assert_eq!(snapshot.stored, 4);
        assert_eq!(snapshot.duplicates, 2);
        assert_eq!(snapshot.load_failures, 1);
        assert_eq!(snapshot.evicted, 4);
    }

    #[test]
    fn test_record_query() {
        let stats = IngestStats::new();
        stats.record_query(true);
        stats.record_query(false);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.queries, 2);
        assert_eq!(snapshot.frames_emitted, 1);
    }

    #[test]
    fn test_reset() {
        let stats = IngestStats::new();
        stats.record_scan();
        stats.record_query(true);
        stats.reset();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.scans, 0);
        assert_eq!(snapshot.queries, 0);
    }

    #[test]
    fn test_summary_format() {
        let stats = IngestStats::new();
        let summary = stats.summary();
        assert!(summary.contains("Entries stored"));
        assert!(summary.contains("Bins evicted"));
        assert!(summary.contains("Queries: 0 (0 with data)"));
    }
}
