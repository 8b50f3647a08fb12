//! Session statistics for a running store.
//!
//! Counters only; no sample content is retained.

pub mod log;

pub use log::{create_shared_stats, IngestStats, SharedIngestStats, StatsSnapshot};
