//! Listing of sample files in a source directory.

use crate::core::sample::{LoadError, SampleArray};
use crate::scanner::npy;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Errors listing a source directory.
#[derive(Debug)]
pub enum ScanError {
    /// The directory does not exist.
    NotFound(PathBuf),
    /// The directory could not be read.
    Io { path: PathBuf, message: String },
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::NotFound(path) => write!(f, "Directory not found: {}", path.display()),
            ScanError::Io { path, message } => {
                write!(f, "Cannot read {}: {message}", path.display())
            }
        }
    }
}

impl std::error::Error for ScanError {}

/// One candidate sample file.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanEntry {
    pub path: PathBuf,
    /// Modification time in seconds since the Unix epoch
    pub timestamp: f64,
}

impl ScanEntry {
    /// Read the file's sample array.
    pub fn load(&self) -> Result<SampleArray, LoadError> {
        npy::read_sample_array(&self.path)
    }
}

/// Result of scanning one directory, ascending by modification time.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub entries: Vec<ScanEntry>,
}

impl Listing {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(timestamp, loader)` pairs ready for `SampleStore::ingest`.
    ///
    /// Files are only read when the store asks for them.
    pub fn into_entries(
        self,
    ) -> impl Iterator<Item = (f64, impl FnOnce() -> Result<SampleArray, LoadError>)> {
        self.entries
            .into_iter()
            .map(|entry| (entry.timestamp, move || entry.load()))
    }
}

/// Lists sample files by extension.
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    extension: String,
}

impl Default for DirectoryScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryScanner {
    /// Scanner for `.npy` files.
    pub fn new() -> Self {
        Self::with_extension("npy")
    }

    pub fn with_extension(extension: &str) -> Self {
        Self {
            extension: extension.trim_start_matches('.').to_lowercase(),
        }
    }

    /// List the newest `limit` sample files of `dir`, oldest first.
    ///
    /// Files that disappear while the listing is built are skipped.
    pub fn scan(&self, dir: &Path, limit: usize) -> Result<Listing, ScanError> {
        let read_dir = std::fs::read_dir(dir).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ScanError::NotFound(dir.to_path_buf())
            } else {
                ScanError::Io {
                    path: dir.to_path_buf(),
                    message: e.to_string(),
                }
            }
        })?;

        let mut entries = Vec::new();
        for item in read_dir {
            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    debug!(dir = %dir.display(), "Skipping unreadable entry: {e}");
                    continue;
                }
            };
            let path = item.path();
            if !self.matches(&path) {
                continue;
            }
            let metadata = match item.metadata() {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    debug!(path = %path.display(), "Skipping vanished file: {e}");
                    continue;
                }
            };
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            entries.push(ScanEntry {
                path,
                timestamp: epoch_seconds(modified),
            });
        }

        entries.sort_by(|a, b| {
            a.timestamp
                .total_cmp(&b.timestamp)
                .then_with(|| a.path.cmp(&b.path))
        });
        let skip = entries.len().saturating_sub(limit);
        Ok(Listing {
            entries: entries.split_off(skip),
        })
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }
}

/// Seconds since the Unix epoch, negative for earlier times.
pub fn epoch_seconds(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}
