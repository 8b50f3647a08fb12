//! The time-binned multi-source sample store.
//!
//! Each registered source owns a lane of `history_capacity × sample_size`
//! values plus a presence bit per bin slot. Bin slots are shared by all lanes
//! and managed by a [`BinTable`]; evicting a bin clears that slot in every
//! lane and hands it to the incoming bin.

use crate::core::aggregate::{Aggregation, Frame, WindowAggregator, WindowSlab};
use crate::core::binning::{BinId, BinSlot, BinTable, TimeBinIndex};
use crate::core::sample::{LoadError, SampleArray};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Addressing and retention parameters of a store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Width of a time bin in seconds
    pub bin_width: f64,
    /// Maximum number of resident bins
    pub history_capacity: usize,
    /// Number of values in every sample array
    pub sample_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bin_width: 1.0,
            history_capacity: 100,
            sample_size: 720,
        }
    }
}

impl StoreConfig {
    pub fn new(bin_width: f64, history_capacity: usize, sample_size: usize) -> Self {
        Self {
            bin_width,
            history_capacity,
            sample_size,
        }
    }

    /// Check the parameters are usable.
    pub fn validate(&self) -> Result<(), StoreError> {
        if !self.bin_width.is_finite() || self.bin_width <= 0.0 {
            return Err(StoreError::InvalidArgument(format!(
                "bin width must be a positive number, got {}",
                self.bin_width
            )));
        }
        if self.history_capacity < 1 {
            return Err(StoreError::InvalidArgument(
                "history capacity must be at least 1".to_string(),
            ));
        }
        if self.sample_size < 1 {
            return Err(StoreError::InvalidArgument(
                "sample size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome counters of one `ingest` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Entries written into the store
    pub stored: u64,
    /// Entries skipped because the cell already held data
    pub duplicates: u64,
    /// Entries whose loader failed (partial writes included)
    pub load_failures: u64,
    /// Load failures that looked like files still being written
    pub partial_writes: u64,
    /// New bins refused for being older than every resident bin
    pub rejected: u64,
    /// Bins evicted to admit newer ones
    pub evicted: u64,
}

impl IngestReport {
    /// Entries looked at, whatever happened to them.
    pub fn seen(&self) -> u64 {
        self.stored + self.duplicates + self.load_failures + self.rejected
    }
}

/// Errors surfaced by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Unsupported reducer, or `none` paired with a multi-row window.
    InvalidAggregationMode(String),
    /// A parameter is out of range.
    InvalidArgument(String),
    /// A new bin was older than every resident bin and was not stored.
    ///
    /// The rest of the batch was applied; `report` describes it.
    MonotonicityViolation {
        source: String,
        timestamp: f64,
        oldest: f64,
        report: IngestReport,
    },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::InvalidAggregationMode(e) => write!(f, "Invalid aggregation mode: {e}"),
            StoreError::InvalidArgument(e) => write!(f, "Invalid argument: {e}"),
            StoreError::MonotonicityViolation {
                source,
                timestamp,
                oldest,
                ..
            } => write!(
                f,
                "Monotonicity violation in {source}: timestamp {timestamp} is older than the oldest resident bin ({oldest})"
            ),
        }
    }
}

impl std::error::Error for StoreError {}

/// Per-source storage: one cell per bin slot.
///
/// A slot is present only while its cell holds at least one non-NaN value.
#[derive(Debug, Clone)]
struct SourceLane {
    values: Vec<f64>,
    present: Vec<bool>,
    sample_size: usize,
}

impl SourceLane {
    fn new(capacity: usize, sample_size: usize) -> Self {
        Self {
            values: vec![f64::NAN; capacity * sample_size],
            present: vec![false; capacity],
            sample_size,
        }
    }

    fn is_present(&self, slot: usize) -> bool {
        self.present.get(slot).copied().unwrap_or(false)
    }

    fn cell(&self, slot: usize) -> Option<&[f64]> {
        if !self.is_present(slot) {
            return None;
        }
        let start = slot * self.sample_size;
        self.values.get(start..start + self.sample_size)
    }

    fn write(&mut self, slot: usize, data: &[f64]) {
        let start = slot * self.sample_size;
        self.values[start..start + self.sample_size].copy_from_slice(data);
        self.present[slot] = data.iter().any(|v| !v.is_nan());
    }

    fn clear(&mut self, slot: usize) {
        let start = slot * self.sample_size;
        self.values[start..start + self.sample_size].fill(f64::NAN);
        self.present[slot] = false;
    }
}

/// Rolling, time-binned history of sample arrays from several named sources.
///
/// The store is driven by a single control flow; wrap it in a mutex if it has
/// to be shared between threads.
#[derive(Debug, Clone)]
pub struct SampleStore {
    config: StoreConfig,
    index: TimeBinIndex,
    bins: BinTable,
    sources: Vec<(String, SourceLane)>,
}

impl SampleStore {
    /// Create an empty store.
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        Ok(Self {
            config,
            index: TimeBinIndex::new(config.bin_width),
            bins: BinTable::new(config.history_capacity),
            sources: Vec::new(),
        })
    }

    pub fn config(&self) -> StoreConfig {
        self.config
    }

    /// Number of resident bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Registered source names in registration order.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|(name, _)| name.as_str())
    }

    pub fn source_index(&self, name: &str) -> Option<usize> {
        self.sources.iter().position(|(n, _)| n == name)
    }

    /// Resident bins ascending by timestamp.
    pub fn resident_bins(&self) -> Vec<BinSlot> {
        self.bins.sorted().into_iter().map(|(_, bin)| bin).collect()
    }

    /// Stored array for a (source, bin) pair, `None` if nothing was loaded.
    pub fn sample(&self, source: &str, bin: BinId) -> Option<&[f64]> {
        let slot = self.bins.slot_of(bin)?;
        let pix = self.source_index(source)?;
        self.sources[pix].1.cell(slot)
    }

    pub fn has_sample(&self, source: &str, bin: BinId) -> bool {
        self.sample(source, bin).is_some()
    }

    /// Register a source. Returns its position; no-op if already registered.
    pub fn add_source(&mut self, name: &str) -> usize {
        if let Some(pix) = self.source_index(name) {
            return pix;
        }
        self.sources.push((
            name.to_string(),
            SourceLane::new(self.bins.capacity(), self.config.sample_size),
        ));
        debug!(source = name, "Registered source");
        self.sources.len() - 1
    }

    /// Unregister a source and drop bins no remaining source has data for.
    ///
    /// Returns `false` if the source was unknown.
    pub fn remove_source(&mut self, name: &str) -> bool {
        let Some(pix) = self.source_index(name) else {
            return false;
        };
        self.sources.remove(pix);

        let vacant: Vec<usize> = self
            .bins
            .iter()
            .filter(|(slot, _)| !self.sources.iter().any(|(_, lane)| lane.is_present(*slot)))
            .map(|(slot, _)| slot)
            .collect();
        for slot in &vacant {
            self.bins.remove(*slot);
        }

        debug!(
            source = name,
            dropped_bins = vacant.len(),
            "Removed source"
        );
        true
    }

    /// Ingest `(timestamp, loader)` entries for a source, in the given order.
    ///
    /// Entries should be ascending by timestamp. Loaders run only when the
    /// cell is still empty; load failures skip the entry. An unregistered
    /// source is registered first.
    pub fn ingest<I, L>(&mut self, source: &str, entries: I) -> Result<IngestReport, StoreError>
    where
        I: IntoIterator<Item = (f64, L)>,
        L: FnOnce() -> Result<SampleArray, LoadError>,
    {
        let pix = self.add_source(source);
        let mut report = IngestReport::default();
        let mut violation: Option<(f64, f64)> = None;

        for (timestamp, loader) in entries {
            if !timestamp.is_finite() {
                warn!(source, timestamp, "Skipping entry with invalid timestamp");
                report.load_failures += 1;
                continue;
            }

            let bin = self.index.bin_of(timestamp);
            let resident = self.bins.slot_of(bin);

            match resident {
                Some(slot) if self.sources[pix].1.is_present(slot) => {
                    report.duplicates += 1;
                    continue;
                }
                Some(_) => {}
                None => {
                    if let Some((_, oldest)) = self.bins.oldest() {
                        if timestamp < oldest.timestamp {
                            warn!(
                                source,
                                timestamp,
                                oldest = oldest.timestamp,
                                "Refusing bin older than resident history"
                            );
                            report.rejected += 1;
                            violation.get_or_insert((timestamp, oldest.timestamp));
                            continue;
                        }
                    }
                }
            }

            let sample = match loader() {
                Ok(sample) => sample,
                Err(e) => {
                    report.load_failures += 1;
                    if e.is_partial_write() {
                        report.partial_writes += 1;
                        debug!(source, timestamp, "Skipping partially written sample: {e}");
                    } else {
                        warn!(source, timestamp, "Skipping unreadable sample: {e}");
                    }
                    continue;
                }
            };
            if sample.len() != self.config.sample_size {
                let e = LoadError::ShapeMismatch {
                    expected: self.config.sample_size,
                    found: sample.len(),
                };
                warn!(source, timestamp, "Skipping sample: {e}");
                report.load_failures += 1;
                continue;
            }

            let slot = match resident {
                Some(slot) => {
                    self.bins.touch(slot, timestamp);
                    slot
                }
                None => {
                    let admission = self.bins.admit(bin, timestamp);
                    if let Some(evicted) = admission.evicted {
                        for (_, lane) in &mut self.sources {
                            lane.clear(admission.slot);
                        }
                        report.evicted += 1;
                        debug!(bin = evicted.id, "Evicted oldest bin");
                    }
                    admission.slot
                }
            };

            self.sources[pix].1.write(slot, sample.as_slice());
            report.stored += 1;
        }

        if report.stored > 0 || report.load_failures > 0 {
            debug!(
                source,
                stored = report.stored,
                duplicates = report.duplicates,
                failures = report.load_failures,
                evicted = report.evicted,
                "Ingested entries"
            );
        }

        match violation {
            Some((timestamp, oldest)) => Err(StoreError::MonotonicityViolation {
                source: source.to_string(),
                timestamp,
                oldest,
                report,
            }),
            None => Ok(report),
        }
    }

    /// Aggregate the newest `window` bins of the selected sources.
    ///
    /// Returns [`Frame::empty`] when there is nothing to show.
    pub fn query<S: AsRef<str>>(
        &self,
        selection: &[S],
        mode: Aggregation,
        window: usize,
    ) -> Result<Frame, StoreError> {
        let aggregator = WindowAggregator::new(mode, window)?;

        if self.bins.is_empty() || selection.is_empty() {
            return Ok(Frame::empty());
        }

        let selected: Vec<&(String, SourceLane)> = self
            .sources
            .iter()
            .filter(|(name, _)| selection.iter().any(|s| s.as_ref() == name))
            .collect();
        if selected.is_empty() {
            return Ok(Frame::empty());
        }

        let bins = self.bins.sorted();
        let Some((_, newest)) = bins.last() else {
            return Ok(Frame::empty());
        };
        let latest = newest.timestamp;
        let target = aggregator.target_start(latest, self.config.bin_width);

        // First bin closest to the target start.
        let mut start = 0;
        let mut best = f64::INFINITY;
        for (i, (_, bin)) in bins.iter().enumerate() {
            let distance = (bin.timestamp - target).abs();
            if distance < best {
                best = distance;
                start = i;
            }
        }
        let window_bins = &bins[start..];

        let slab = WindowSlab {
            times: window_bins.iter().map(|(_, bin)| bin.timestamp).collect(),
            sources: selected.iter().map(|(name, _)| name.as_str()).collect(),
            cells: selected
                .iter()
                .map(|(_, lane)| window_bins.iter().map(|(slot, _)| lane.cell(*slot)).collect())
                .collect(),
            sample_size: self.config.sample_size,
        };
        if slab.is_vacant() {
            return Ok(Frame::empty());
        }

        Ok(aggregator.aggregate(&slab, target))
    }

    /// Query with the mode given by name.
    pub fn query_named<S: AsRef<str>>(
        &self,
        selection: &[S],
        mode: &str,
        window: usize,
    ) -> Result<Frame, StoreError> {
        self.query(selection, mode.parse()?, window)
    }

    /// Apply new parameters.
    ///
    /// A different bin width or sample size invalidates the addressing scheme
    /// and empties the store (sources stay registered); returns `true` then.
    /// A different capacity keeps the newest bins that still fit.
    pub fn reconfigure(&mut self, config: StoreConfig) -> Result<bool, StoreError> {
        config.validate()?;

        if config.bin_width != self.config.bin_width || config.sample_size != self.config.sample_size
        {
            self.config = config;
            self.index = TimeBinIndex::new(config.bin_width);
            self.bins = BinTable::new(config.history_capacity);
            for (_, lane) in &mut self.sources {
                *lane = SourceLane::new(config.history_capacity, config.sample_size);
            }
            info!(
                bin_width = config.bin_width,
                sample_size = config.sample_size,
                "Store reset after reconfiguration"
            );
            return Ok(true);
        }

        if config.history_capacity != self.config.history_capacity {
            let sorted = self.bins.sorted();
            let keep_from = sorted.len().saturating_sub(config.history_capacity);
            let mut bins = BinTable::new(config.history_capacity);
            let mut lanes: Vec<SourceLane> = self
                .sources
                .iter()
                .map(|_| SourceLane::new(config.history_capacity, config.sample_size))
                .collect();

            for (old_slot, bin) in &sorted[keep_from..] {
                let slot = bins.admit(bin.id, bin.timestamp).slot;
                for ((_, old), new) in self.sources.iter().zip(lanes.iter_mut()) {
                    if let Some(cell) = old.cell(*old_slot) {
                        new.write(slot, cell);
                    }
                }
            }

            for ((_, lane), new) in self.sources.iter_mut().zip(lanes) {
                *lane = new;
            }
            self.bins = bins;
            info!(
                capacity = config.history_capacity,
                dropped_bins = keep_from,
                "Resized store history"
            );
        }

        self.config = config;
        Ok(false)
    }
}
