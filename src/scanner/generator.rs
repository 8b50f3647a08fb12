//! Synthetic sample producer for exercising a watched directory.
//!
//! Writes one sine sweep per tick; the phase advances 90 degrees per second
//! of wall-clock time so consecutive files visibly drift.

use crate::scanner::npy;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// File name stem format, local time with microseconds.
pub const STAMP_FORMAT: &str = "%Y.%m.%d.%H.%M.%S.%6f";

/// Degrees of phase advance per second.
const DEGREES_PER_SECOND: f64 = 90.0;

/// Sine sweep of `sample_size` points, one degree apart, at time `seconds`.
pub fn sine_sample(sample_size: usize, seconds: f64) -> Vec<f64> {
    (0..sample_size)
        .map(|i| ((i as f64 + DEGREES_PER_SECOND * seconds).to_radians()).sin())
        .collect()
}

/// Writes sample files into one directory.
#[derive(Debug, Clone)]
pub struct SampleGenerator {
    dir: PathBuf,
    sample_size: usize,
}

impl SampleGenerator {
    /// Create the generator, creating `dir` if needed.
    pub fn new(dir: &Path, sample_size: usize) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            sample_size,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the sample for `now` and return its path.
    pub fn write_at(&self, now: DateTime<Local>) -> std::io::Result<PathBuf> {
        let seconds = now.timestamp_micros() as f64 / 1e6;
        let path = self
            .dir
            .join(format!("{}.npy", now.format(STAMP_FORMAT)));
        npy::write_sample_array(&path, &sine_sample(self.sample_size, seconds))?;
        Ok(path)
    }

    /// Write the sample for the current time.
    pub fn write_next(&self) -> std::io::Result<PathBuf> {
        self.write_at(Local::now())
    }
}
