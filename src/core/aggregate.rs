//! Window aggregation: collapse the source axis and resample the time axis.
//!
//! Missing cells (a source that never reported for a bin) and NaN elements
//! inside loaded arrays are both treated as absent. Reduction is element-wise,
//! so one source missing a bin never suppresses another source's values.

use crate::core::interpolate::{linspace, round2, RegularGrid};
use crate::core::store::StoreError;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::str::FromStr;

/// How the source axis is collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// One row per source, unreduced (only valid for a single-row window)
    None,
    Mean,
    Sum,
    Max,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::None => "none",
            Aggregation::Mean => "mean",
            Aggregation::Sum => "sum",
            Aggregation::Max => "max",
        }
    }

    /// Reduce the values contributed for one element.
    ///
    /// NaN contributions are ignored. With nothing left to reduce the result
    /// is NaN, so absence is never reported as zero; this includes `Sum`,
    /// where NumPy's `nansum` would give 0. `None` does not reduce and always
    /// yields NaN.
    pub fn reduce(self, values: &[f64]) -> f64 {
        let present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if present.is_empty() {
            return f64::NAN;
        }
        match self {
            Aggregation::None => f64::NAN,
            Aggregation::Mean => Statistics::mean(present.iter()),
            Aggregation::Sum => present.iter().sum(),
            Aggregation::Max => Statistics::max(present.iter()),
        }
    }
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregation {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Aggregation::None),
            "mean" | "average" => Ok(Aggregation::Mean),
            "sum" => Ok(Aggregation::Sum),
            "max" => Ok(Aggregation::Max),
            _ => Err(StoreError::InvalidAggregationMode(format!(
                "unsupported aggregation mode '{s}'"
            ))),
        }
    }
}

/// Reduce one bin's cells (one per source, `None` when absent) element-wise.
pub fn reduce_cells(mode: Aggregation, cells: &[Option<&[f64]>], sample_size: usize) -> Vec<f64> {
    let mut scratch = Vec::with_capacity(cells.len());
    (0..sample_size)
        .map(|j| {
            scratch.clear();
            scratch.extend(cells.iter().flatten().filter_map(|cell| cell.get(j).copied()));
            mode.reduce(&scratch)
        })
        .collect()
}

/// Rows produced by a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Timestamp of each row
    pub times: Vec<f64>,
    /// Selected sources in registry order; row labels when unreduced
    pub sources: Vec<String>,
    /// Row-major values, shape (rows, sample size)
    pub values: Array2<f64>,
}

impl Frame {
    /// The "no data" marker.
    pub fn empty() -> Self {
        Self {
            times: Vec::new(),
            sources: Vec::new(),
            values: Array2::zeros((0, 0)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    pub fn rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn sample_size(&self) -> usize {
        self.values.ncols()
    }

    /// Values as nested vectors, one per row.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.values.outer_iter().map(|row| row.to_vec()).collect()
    }
}

/// The candidate window handed to the aggregator.
#[derive(Debug, Clone)]
pub struct WindowSlab<'a> {
    /// Ascending timestamps of the candidate bins
    pub times: Vec<f64>,
    /// Selected source names in registry order
    pub sources: Vec<&'a str>,
    /// `cells[source][time]`, `None` when the source has no data for that bin
    pub cells: Vec<Vec<Option<&'a [f64]>>>,
    pub sample_size: usize,
}

impl WindowSlab<'_> {
    /// Whether the slab holds no usable value at all.
    pub fn is_vacant(&self) -> bool {
        !self
            .cells
            .iter()
            .flatten()
            .flatten()
            .any(|cell| cell.iter().any(|v| !v.is_nan()))
    }
}

/// Validated query parameters plus the reduction and resampling steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowAggregator {
    mode: Aggregation,
    window: usize,
}

impl WindowAggregator {
    pub fn new(mode: Aggregation, window: usize) -> Result<Self, StoreError> {
        if window < 1 {
            return Err(StoreError::InvalidArgument(
                "window must be at least 1".to_string(),
            ));
        }
        if mode == Aggregation::None && window > 1 {
            return Err(StoreError::InvalidAggregationMode(format!(
                "mode 'none' requires window = 1, got {window}"
            )));
        }
        Ok(Self { mode, window })
    }

    pub fn mode(&self) -> Aggregation {
        self.mode
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Earliest timestamp the window wants to cover.
    pub fn target_start(&self, latest: f64, bin_width: f64) -> f64 {
        latest - bin_width * (self.window - 1) as f64
    }

    /// Reduce the slab and, for multi-row windows, resample it.
    pub fn aggregate(&self, slab: &WindowSlab<'_>, target_start: f64) -> Frame {
        let (Some(&first), Some(&latest)) = (slab.times.first(), slab.times.last()) else {
            return Frame::empty();
        };
        let sources: Vec<String> = slab.sources.iter().map(|s| s.to_string()).collect();
        let n = slab.sample_size;

        if self.mode == Aggregation::None {
            let last = slab.times.len() - 1;
            let mut values = Array2::from_elem((slab.cells.len(), n), f64::NAN);
            for (mut row, lane) in values.outer_iter_mut().zip(&slab.cells) {
                if let Some(cell) = lane[last] {
                    for (dst, src) in row.iter_mut().zip(cell.iter()) {
                        *dst = *src;
                    }
                }
            }
            return Frame {
                times: vec![latest; slab.cells.len()],
                sources,
                values,
            };
        }

        let reduced: Vec<Vec<f64>> = (0..slab.times.len())
            .map(|t| {
                let cells: Vec<Option<&[f64]>> = slab.cells.iter().map(|lane| lane[t]).collect();
                reduce_cells(self.mode, &cells, n)
            })
            .collect();

        if self.window == 1 {
            let row = reduced.last().cloned().unwrap_or_default();
            let values = match Array2::from_shape_vec((1, n), row) {
                Ok(values) => values,
                Err(e) => {
                    tracing::warn!("Cannot shape reduced row: {e}");
                    return Frame::empty();
                }
            };
            return Frame {
                times: vec![latest],
                sources,
                values,
            };
        }

        // Row count shrinks to the observed fraction of the requested span.
        let coverage = round2((latest - first) / (latest - target_start)).min(1.0);
        let rows = (self.window as f64 * coverage).floor() as usize;
        if rows == 0 || slab.times.len() < 2 {
            return Frame::empty();
        }

        let flat: Vec<f64> = reduced.into_iter().flatten().collect();
        let values = match Array2::from_shape_vec((slab.times.len(), n), flat) {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!("Cannot shape reduced window: {e}");
                return Frame::empty();
            }
        };
        let points: Vec<f64> = (0..n).map(|j| j as f64).collect();
        let grid = match RegularGrid::new(slab.times.clone(), points.clone(), values) {
            Ok(grid) => grid,
            Err(e) => {
                tracing::warn!("Cannot resample window: {e}");
                return Frame::empty();
            }
        };

        let times = linspace(first, latest, rows);
        let values = grid.sample(&times, &points);
        Frame {
            times,
            sources,
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("mean".parse::<Aggregation>().unwrap(), Aggregation::Mean);
        assert_eq!("SUM".parse::<Aggregation>().unwrap(), Aggregation::Sum);
        assert_eq!("average".parse::<Aggregation>().unwrap(), Aggregation::Mean);
        assert_eq!("none".parse::<Aggregation>().unwrap(), Aggregation::None);
        assert!(matches!(
            "median".parse::<Aggregation>(),
            Err(StoreError::InvalidAggregationMode(_))
        ));
    }

    #[test]
    fn test_reducers_ignore_nan() {
        let values = [1.0, f64::NAN, 3.0];
        assert_eq!(Aggregation::Mean.reduce(&values), 2.0);
        assert_eq!(Aggregation::Sum.reduce(&values), 4.0);
        assert_eq!(Aggregation::Max.reduce(&values), 3.0);
        assert!(Aggregation::Sum.reduce(&[f64::NAN]).is_nan());
        assert!(Aggregation::Mean.reduce(&[]).is_nan());
    }

    #[test]
    fn test_reduce_cells_element_wise() {
        let a = [1.0, 2.0, f64::NAN];
        let b = [f64::NAN, 3.0, 4.0];
        let cells = [Some(&a[..]), Some(&b[..])];
        assert_eq!(reduce_cells(Aggregation::Sum, &cells, 3), vec![1.0, 5.0, 4.0]);
        assert_eq!(reduce_cells(Aggregation::Max, &cells, 3), vec![1.0, 3.0, 4.0]);
        assert_eq!(reduce_cells(Aggregation::Mean, &cells, 3), vec![1.0, 2.5, 4.0]);
    }

    #[test]
    fn test_missing_cell_does_not_suppress_others() {
        let a = [2.0, 4.0];
        let cells = [None, Some(&a[..])];
        assert_eq!(reduce_cells(Aggregation::Mean, &cells, 2), vec![2.0, 4.0]);
    }

    #[test]
    fn test_aggregator_validation() {
        assert!(matches!(
            WindowAggregator::new(Aggregation::Mean, 0),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            WindowAggregator::new(Aggregation::None, 2),
            Err(StoreError::InvalidAggregationMode(_))
        ));
        assert!(WindowAggregator::new(Aggregation::None, 1).is_ok());
    }

    #[test]
    fn test_target_start() {
        let aggregator = WindowAggregator::new(Aggregation::Mean, 5).unwrap();
        assert_eq!(aggregator.target_start(10.0, 0.5), 8.0);
    }

    #[test]
    fn test_resample_linear_ramp() {
        let rows: Vec<[f64; 2]> = (0..5).map(|t| [t as f64, 10.0 * t as f64]).collect();
        let slab = WindowSlab {
            times: vec![0.0, 1.0, 2.0, 3.0, 4.0],
            sources: vec!["a"],
            cells: vec![rows.iter().map(|r| Some(&r[..])).collect()],
            sample_size: 2,
        };
        let aggregator = WindowAggregator::new(Aggregation::Mean, 5).unwrap();
        let frame = aggregator.aggregate(&slab, 0.0);

        assert_eq!(frame.rows(), 5);
        assert_eq!(frame.sample_size(), 2);
        assert_eq!(frame.times, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(frame.values[[2, 0]], 2.0);
        assert_eq!(frame.values[[4, 1]], 40.0);
    }

    #[test]
    fn test_vacant_slab() {
        let nan = [f64::NAN, f64::NAN];
        let slab = WindowSlab {
            times: vec![1.0],
            sources: vec!["a", "b"],
            cells: vec![vec![Some(&nan[..])], vec![None]],
            sample_size: 2,
        };
        assert!(slab.is_vacant());
    }
}
