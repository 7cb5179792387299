//! Matrix-free adapter between a [`RowMatrix`] and the Krylov kernels.
//!
//! The adapter is the only place that knows an operator is distributed: it
//! extends vectors with a ghost segment before multiplying, refreshes ghosts
//! through the operator's communicator, and reduces inner products across
//! ranks. Kernels and preconditioners see [`MatVec`] / [`InnerProduct`] and
//! row extraction, nothing about storage layout.

use crate::core::traits::{InnerProduct, MatVec, RowMatrix};
use crate::core::wrappers::{local_dot, local_sq_norm};
use crate::error::KError;
use crate::matrix::LocalCsr;
use crate::parallel::Comm;

/// Non-owning view of a distributed operator.
pub struct OperatorAdapter<'a, A: RowMatrix> {
    a: &'a A,
    n_local: usize,
    n_ghost: usize,
    norm_bound: f64,
}

impl<'a, A: RowMatrix> OperatorAdapter<'a, A> {
    /// Wrap `a`. Collective: computes the global norm bound.
    pub fn new(a: &'a A) -> Self {
        let n_local = a.local_rows();
        let n_ghost = a.local_cols().saturating_sub(n_local);
        let norm_bound = a.norm_inf();
        Self { a, n_local, n_ghost, norm_bound }
    }

    pub fn n_local(&self) -> usize {
        self.n_local
    }

    pub fn n_ghost(&self) -> usize {
        self.n_ghost
    }

    /// Upper bound on ‖A‖∞.
    pub fn norm_bound(&self) -> f64 {
        self.norm_bound
    }

    pub fn comm(&self) -> &A::Comm {
        self.a.comm()
    }

    /// y = A x_ext for a vector whose ghost segment is already current.
    pub fn multiply(&self, x_ext: &[f64], y: &mut [f64]) -> Result<(), KError> {
        if x_ext.len() != self.n_local + self.n_ghost || y.len() != self.n_local {
            return Err(KError::InvalidArgument(format!(
                "multiply expects x of length {} and y of length {}, got {} and {}",
                self.n_local + self.n_ghost,
                self.n_local,
                x_ext.len(),
                y.len()
            )));
        }
        self.a.multiply_local(x_ext, y);
        Ok(())
    }

    /// Refresh the ghost segment of `v_ext`; nothing to do on one rank.
    pub fn exchange_ghosts(&self, v_ext: &mut [f64]) {
        if self.a.comm().size() == 1 {
            return;
        }
        self.a.exchange_ghosts(v_ext);
    }

    /// Copy the requested local rows back to back into `cols`/`vals`.
    ///
    /// `row_lengths[k]` receives the entry count of `rows[k]`. Returns the
    /// total number of entries written, or [`KError::CapacityExceeded`] with
    /// the space needed so far when the buffers run out; the caller retries
    /// with larger buffers.
    pub fn extract_rows(
        &self,
        rows: &[usize],
        cols: &mut [usize],
        vals: &mut [f64],
        row_lengths: &mut [usize],
    ) -> Result<usize, KError> {
        if row_lengths.len() < rows.len() {
            return Err(KError::InvalidArgument(format!(
                "row_lengths holds {} entries for {} rows",
                row_lengths.len(),
                rows.len()
            )));
        }
        let capacity = cols.len().min(vals.len());
        let mut used = 0;
        for (k, &row) in rows.iter().enumerate() {
            match self.a.extract_row_copy(row, &mut cols[used..capacity], &mut vals[used..capacity]) {
                Ok(len) => {
                    row_lengths[k] = len;
                    used += len;
                }
                Err(KError::CapacityExceeded { needed, .. }) => {
                    return Err(KError::CapacityExceeded { needed: used + needed, available: capacity });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(used)
    }

    /// Extract the owned square block, growing the row buffer until it fits.
    pub fn extract_local_matrix(&self) -> Result<LocalCsr, KError> {
        let rows: Vec<usize> = (0..self.n_local).collect();
        let mut row_lengths = vec![0usize; self.n_local];
        let mut capacity = 4 * self.n_local.max(1);
        let (cols, vals) = loop {
            let mut cols = vec![0usize; capacity];
            let mut vals = vec![0.0; capacity];
            match self.extract_rows(&rows, &mut cols, &mut vals, &mut row_lengths) {
                Ok(used) => {
                    cols.truncate(used);
                    vals.truncate(used);
                    break (cols, vals);
                }
                Err(KError::CapacityExceeded { needed, .. }) => {
                    capacity = needed.max(2 * capacity);
                }
                Err(e) => return Err(e),
            }
        };
        let mut offset = 0;
        let local_rows = row_lengths
            .iter()
            .map(|&len| {
                let row = (offset..offset + len)
                    .filter(|&k| cols[k] < self.n_local)
                    .map(|k| (cols[k], vals[k]))
                    .collect();
                offset += len;
                row
            })
            .collect();
        Ok(LocalCsr::from_rows(local_rows))
    }
}

impl<'a, A: RowMatrix> MatVec<Vec<f64>> for OperatorAdapter<'a, A> {
    /// Extends `x` with a ghost segment, refreshes it, and multiplies.
    fn matvec(&self, x: &Vec<f64>, y: &mut Vec<f64>) {
        assert_eq!(x.len(), self.n_local, "Input vector x has incorrect length");
        assert_eq!(y.len(), self.n_local, "Output vector y has incorrect length");
        if self.n_ghost == 0 {
            self.a.multiply_local(x, y);
            return;
        }
        let mut x_ext = vec![0.0; self.n_local + self.n_ghost];
        x_ext[..self.n_local].copy_from_slice(x);
        self.exchange_ghosts(&mut x_ext);
        self.a.multiply_local(&x_ext, y);
    }
}

impl<'a, A: RowMatrix> InnerProduct<Vec<f64>> for OperatorAdapter<'a, A> {
    type Scalar = f64;

    /// Global dot product, identical on every rank.
    fn dot(&self, x: &Vec<f64>, y: &Vec<f64>) -> f64 {
        self.a.comm().all_reduce_sum(local_dot(x, y))
    }

    fn norm(&self, x: &Vec<f64>) -> f64 {
        self.a.comm().all_reduce_sum(local_sq_norm(x)).sqrt()
    }
}
