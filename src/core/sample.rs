//! Sample arrays and the errors raised while loading them.

use serde::{Deserialize, Serialize};

/// A fixed-length numeric vector read from a single sample file.
///
/// This is the atomic unit of ingestion: one array per (source, bin).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleArray {
    values: Vec<f64>,
}

impl SampleArray {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Create an array with every element set to `value`.
    pub fn filled(len: usize, value: f64) -> Self {
        Self {
            values: vec![value; len],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.values
    }
}

impl From<Vec<f64>> for SampleArray {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

impl From<&[f64]> for SampleArray {
    fn from(values: &[f64]) -> Self {
        Self::new(values.to_vec())
    }
}

/// Per-entry load failures.
///
/// None of these abort an ingestion batch; the entry is skipped and the next
/// scan offers the file again.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    /// The file ended before the data its header promised (still being written).
    Truncated { expected: usize, found: usize },
    /// The file could not be opened or read.
    Io(String),
    /// The file is not a sample array this crate understands.
    Format(String),
    /// The array decoded fine but does not match the configured sample size.
    ShapeMismatch { expected: usize, found: usize },
}

impl LoadError {
    /// Whether the failure looks like a partial write that a later scan will fix.
    pub fn is_partial_write(&self) -> bool {
        matches!(self, LoadError::Truncated { .. })
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Truncated { expected, found } => {
                write!(f, "Truncated sample file: expected {expected} bytes, found {found}")
            }
            LoadError::Io(e) => write!(f, "IO error: {e}"),
            LoadError::Format(e) => write!(f, "Format error: {e}"),
            LoadError::ShapeMismatch { expected, found } => {
                write!(f, "Sample size mismatch: expected {expected}, found {found}")
            }
        }
    }
}

impl std::error::Error for LoadError {}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_array_basics() {
        let array = SampleArray::from(vec![1.0, 2.0, 3.0]);
        assert_eq!(array.len(), 3);
        assert!(!array.is_empty());
        assert_eq!(array.as_slice(), &[1.0, 2.0, 3.0]);

        let nan = SampleArray::filled(4, f64::NAN);
        assert!(nan.as_slice().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_partial_write_classification() {
        assert!(LoadError::Truncated {
            expected: 80,
            found: 12
        }
        .is_partial_write());
        assert!(!LoadError::Io("gone".into()).is_partial_write());
        assert!(!LoadError::ShapeMismatch {
            expected: 2,
            found: 3
        }
        .is_partial_write());
    }
}
