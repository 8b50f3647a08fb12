//! Core functionality: the in-memory sample store.
//!
//! This module contains:
//! - Time binning and the fixed-capacity table of resident bins
//! - The multi-source sample store (ingestion, eviction, source lifecycle)
//! - Window aggregation and resampling for queries

pub mod aggregate;
pub mod binning;
pub mod interpolate;
pub mod sample;
pub mod store;

// Re-export commonly used types
pub use aggregate::{reduce_cells, Aggregation, Frame, WindowAggregator, WindowSlab};
pub use binning::{BinId, BinSlot, BinTable, TimeBinIndex};
pub use interpolate::{linspace, RegularGrid};
pub use sample::{LoadError, SampleArray};
pub use store::{IngestReport, SampleStore, StoreConfig, StoreError};
