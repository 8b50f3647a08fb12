//! binscope - time-binned multi-source sample store.
//!
//! Directories of periodically written, fixed-size sample files are ingested
//! into a rolling, fixed-capacity history of time bins. Queries collapse the
//! selected sources with a NaN-aware reducer and resample the newest bins
//! onto evenly spaced rows for signal and spectrogram views.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           binscope                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐          │
//! │  │  Directory  │──▶│  Directory  │──▶│ SampleStore │          │
//! │  │   Watcher   │   │   Scanner   │   │  (ingest)   │          │
//! │  └─────────────┘   └─────────────┘   └─────────────┘          │
//! │                           │                 │                  │
//! │                           ▼                 ▼                  │
//! │                    ┌─────────────┐   ┌─────────────┐          │
//! │                    │    .npy     │   │   Window    │──▶ Frame │
//! │                    │   decoder   │   │ Aggregator  │          │
//! │                    └─────────────┘   └─────────────┘          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use binscope::core::{Aggregation, LoadError, SampleArray, SampleStore, StoreConfig};
//!
//! let mut store = SampleStore::new(StoreConfig::new(1.0, 10, 3)).unwrap();
//! let entries = vec![(0.5, || Ok::<_, LoadError>(SampleArray::from(vec![1.0, 2.0, 3.0])))];
//! store.ingest("probe", entries).unwrap();
//!
//! let frame = store.query(&["probe"], Aggregation::Mean, 1).unwrap();
//! assert_eq!(frame.to_rows(), vec![vec![1.0, 2.0, 3.0]]);
//! ```

pub mod config;
pub mod core;
pub mod export;
pub mod scanner;
pub mod stats;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, PlotConfig};
pub use core::{Aggregation, Frame, IngestReport, SampleStore, StoreConfig, StoreError};
pub use export::{FrameExporter, FrameRecord};
pub use scanner::{DirectoryScanner, DirectoryWatcher, WatchEvent};
pub use stats::{IngestStats, SharedIngestStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
