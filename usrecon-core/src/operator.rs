use crate::error::{ReconError, Result};
use crate::kernel;

/// Read-only view of a dense row-major forward model `H`.
///
/// Construction enforces `|H| == rows * cols`, so the kernels can rely on it.
/// The view borrows the buffer and is cheap to copy, which lets a single
/// loaded operator be shared by every product computed during one solve.
///
/// # Example
///
/// ```rust
/// # use usrecon_core::operator::DenseOperator;
///
/// let data = [1.0, 0.0, 0.0, 1.0];
/// let h = DenseOperator::new(&data, 2, 2).unwrap();
/// assert_eq!(h.apply(&[3.0, 4.0]), vec![3.0, 4.0]);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct DenseOperator<'a> {
    data: &'a [f64],
    rows: usize,
    cols: usize,
}

impl<'a> DenseOperator<'a> {
    pub fn new(data: &'a [f64], rows: usize, cols: usize) -> Result<Self> {
        let expected = rows.checked_mul(cols).ok_or_else(|| {
            ReconError::InvalidDimensions(format!("{rows} x {cols} overflows"))
        })?;
        if data.len() != expected {
            return Err(ReconError::DimensionMismatch {
                what: "H",
                expected,
                got: data.len(),
            });
        }
        Ok(DenseOperator { data, rows, cols })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn data(&self) -> &'a [f64] {
        self.data
    }

    /// `H v`, length `rows`.
    pub fn apply(&self, v: &[f64]) -> Vec<f64> {
        kernel::matvec(self.data, self.rows, self.cols, v)
    }

    /// `Hᵗ v`, length `cols`.
    pub fn apply_transpose(&self, v: &[f64]) -> Vec<f64> {
        kernel::matvec_t(self.data, self.rows, self.cols, v)
    }
}
