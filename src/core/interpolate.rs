//! Linear interpolation on a regular 2-D grid.
//!
//! Used to resample a reduced (time × sample-index) slab onto evenly spaced
//! output rows.

use ndarray::Array2;

/// Errors building an interpolation grid.
#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    /// An axis has no coordinates.
    EmptyAxis,
    /// Axis coordinates are not strictly ascending.
    NotAscending,
    /// The value matrix does not match the axis lengths.
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

impl std::fmt::Display for GridError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GridError::EmptyAxis => write!(f, "Grid axis has no coordinates"),
            GridError::NotAscending => write!(f, "Grid axis is not strictly ascending"),
            GridError::ShapeMismatch { expected, found } => write!(
                f,
                "Grid values have shape {found:?}, expected {expected:?}"
            ),
        }
    }
}

impl std::error::Error for GridError {}

/// `n` evenly spaced values from `start` to `stop` inclusive.
///
/// The last value is exactly `stop`.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            let mut out: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
            out[n - 1] = stop;
            out
        }
    }
}

/// Round to two decimal places, ties to even.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Bilinear interpolant over axes (row coordinate, column coordinate).
#[derive(Debug, Clone)]
pub struct RegularGrid {
    rows: Vec<f64>,
    cols: Vec<f64>,
    values: Array2<f64>,
}

impl RegularGrid {
    pub fn new(rows: Vec<f64>, cols: Vec<f64>, values: Array2<f64>) -> Result<Self, GridError> {
        check_axis(&rows)?;
        check_axis(&cols)?;
        let expected = (rows.len(), cols.len());
        if values.dim() != expected {
            return Err(GridError::ShapeMismatch {
                expected,
                found: values.dim(),
            });
        }
        Ok(Self { rows, cols, values })
    }

    /// Value at `(row, col)`, NaN outside the grid.
    ///
    /// Corners with zero weight are skipped, so a point that lies exactly on
    /// a grid line is not affected by missing values on the neighbouring line.
    pub fn at(&self, row: f64, col: f64) -> f64 {
        let (Some((r, wr)), Some((c, wc))) = (locate(&self.rows, row), locate(&self.cols, col))
        else {
            return f64::NAN;
        };

        let mut acc = 0.0;
        for (ri, rw) in [(r, 1.0 - wr), (r + 1, wr)] {
            if rw == 0.0 {
                continue;
            }
            for (ci, cw) in [(c, 1.0 - wc), (c + 1, wc)] {
                if cw == 0.0 {
                    continue;
                }
                acc += self.values[[ri, ci]] * rw * cw;
            }
        }
        acc
    }

    /// Evaluate on the cartesian product of `rows × cols`.
    pub fn sample(&self, rows: &[f64], cols: &[f64]) -> Array2<f64> {
        Array2::from_shape_fn((rows.len(), cols.len()), |(i, j)| self.at(rows[i], cols[j]))
    }
}

fn check_axis(axis: &[f64]) -> Result<(), GridError> {
    if axis.is_empty() {
        return Err(GridError::EmptyAxis);
    }
    if axis.windows(2).any(|pair| !(pair[1] > pair[0])) {
        return Err(GridError::NotAscending);
    }
    Ok(())
}

/// Lower cell index and fractional weight of `v` along `axis`.
fn locate(axis: &[f64], v: f64) -> Option<(usize, f64)> {
    let first = *axis.first()?;
    let last = *axis.last()?;
    if !(v >= first && v <= last) {
        return None;
    }
    if axis.len() == 1 {
        return Some((0, 0.0));
    }
    // Index of the first coordinate strictly greater than v, clamped so the
    // cell [i, i + 1] stays inside the axis.
    let upper = axis.partition_point(|&a| a <= v).clamp(1, axis.len() - 1);
    let i = upper - 1;
    let w = (v - axis[i]) / (axis[i + 1] - axis[i]);
    Some((i, w.clamp(0.0, 1.0)))
}
