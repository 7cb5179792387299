//! Core linear-algebra traits for aksp.

use crate::error::KError;
use crate::parallel::Comm;

/// Matrix–vector product: y ← A x.
pub trait MatVec<V> {
    /// Compute y = A · x.
    fn matvec(&self, x: &V, y: &mut V);
}

/// Inner products & norms.
pub trait InnerProduct<V> {
    /// Associated scalar type.
    type Scalar: Copy + PartialOrd + From<f64>;
    /// Compute dot(x, y).
    fn dot(&self, x: &V, y: &V) -> Self::Scalar;
    /// Compute ‖x‖₂.
    fn norm(&self, x: &V) -> Self::Scalar;
}

/// A row-distributed sparse operator, seen only through its local rows.
///
/// Column indices are local: `0..local_rows()` address owned entries and
/// `local_rows()..local_cols()` address ghost entries received from
/// neighbouring ranks.
pub trait RowMatrix {
    type Comm: Comm;

    /// Number of rows owned by this rank.
    fn local_rows(&self) -> usize;
    /// Owned plus ghost columns.
    fn local_cols(&self) -> usize;
    /// Upper bound on ‖A‖∞, identical on every rank (collective).
    fn norm_inf(&self) -> f64;
    /// Copy row `row` into `cols`/`vals`, returning the entry count.
    ///
    /// Fails with [`KError::CapacityExceeded`] when either buffer is shorter
    /// than the row; the buffers are left untouched in that case.
    fn extract_row_copy(&self, row: usize, cols: &mut [usize], vals: &mut [f64]) -> Result<usize, KError>;
    /// y = A x_ext, with `x_ext.len() == local_cols()` and `y.len() == local_rows()`.
    fn multiply_local(&self, x_ext: &[f64], y: &mut [f64]);
    /// Fill the ghost segment of `v_ext` from the owning ranks.
    fn exchange_ghosts(&self, v_ext: &mut [f64]);
    /// Process configuration this operator is distributed over.
    fn comm(&self) -> &Self::Comm;
}
