//! Filesystem collaborators of the store.
//!
//! Sample files are discovered by listing a source directory, decoded lazily
//! from the NumPy `.npy` format, and re-scanned when a polling watcher sees
//! the directory change.

pub mod directory;
pub mod generator;
pub mod npy;
pub mod watcher;

pub use directory::{epoch_seconds, DirectoryScanner, Listing, ScanEntry, ScanError};
pub use generator::SampleGenerator;
pub use watcher::{DirectoryWatcher, WatchError, WatchEvent};
