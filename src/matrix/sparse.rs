// Reference row-distributed CSR backend for the `RowMatrix` contract.

use crate::core::traits::RowMatrix;
use crate::error::KError;
use crate::parallel::{Comm, GhostPlan, SerialComm};
use faer::Mat;

/// Row-distributed CSR matrix.
///
/// Holds this rank's rows only. Column indices are local; the last
/// `ncols - nrows` columns are ghosts filled through `ghost_plan`.
#[derive(Debug, Clone)]
pub struct CsrMatrix<C: Comm = SerialComm> {
    nrows: usize,
    ncols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
    ghost_plan: GhostPlan,
    comm: C,
}

impl CsrMatrix<SerialComm> {
    /// Build a single-rank CSR from raw row‐ptr, col‐idx, and values.
    pub fn from_csr(
        nrows: usize,
        ncols: usize,
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self, KError> {
        if nrows != ncols {
            return Err(KError::InvalidArgument(format!(
                "single-rank operator must be square, got {nrows}x{ncols}"
            )));
        }
        Self::distributed(SerialComm, nrows, 0, row_ptr, col_idx, values, GhostPlan::default())
    }

    /// Build from (row, col, value) triplets; duplicates are summed.
    pub fn from_triplets(n: usize, triplets: &[(usize, usize, f64)]) -> Result<Self, KError> {
        let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        for &(i, j, v) in triplets {
            if i >= n || j >= n {
                return Err(KError::InvalidArgument(format!("triplet ({i}, {j}) outside {n}x{n}")));
            }
            rows[i].push((j, v));
        }
        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for mut row in rows {
            row.sort_by_key(|&(j, _)| j);
            for (j, v) in row {
                if col_idx.len() > *row_ptr.last().unwrap_or(&0) && col_idx.last() == Some(&j) {
                    if let Some(last) = values.last_mut() {
                        *last += v;
                    }
                } else {
                    col_idx.push(j);
                    values.push(v);
                }
            }
            row_ptr.push(col_idx.len());
        }
        Self::from_csr(n, n, row_ptr, col_idx, values)
    }

    /// Convert the nonzeros of a dense Faer matrix.
    pub fn from_dense(a: &Mat<f64>) -> Result<Self, KError> {
        let n = a.nrows();
        let mut triplets = Vec::new();
        for i in 0..n {
            for j in 0..a.ncols() {
                let v = a[(i, j)];
                if v != 0.0 {
                    triplets.push((i, j, v));
                }
            }
        }
        Self::from_triplets(n, &triplets)
    }
}

impl<C: Comm> CsrMatrix<C> {
    /// Build this rank's piece of a distributed operator.
    ///
    /// `n_ghost` extra columns follow the `nrows` owned ones; `ghost_plan`
    /// must fill exactly those slots.
    pub fn distributed(
        comm: C,
        nrows: usize,
        n_ghost: usize,
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<f64>,
        ghost_plan: GhostPlan,
    ) -> Result<Self, KError> {
        let ncols = nrows + n_ghost;
        if row_ptr.len() != nrows + 1 || row_ptr[0] != 0 {
            return Err(KError::InvalidArgument("row_ptr must have nrows + 1 entries starting at 0".into()));
        }
        if row_ptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(KError::InvalidArgument("row_ptr must be non-decreasing".into()));
        }
        let nnz = row_ptr[nrows];
        if col_idx.len() != nnz || values.len() != nnz {
            return Err(KError::InvalidArgument(format!(
                "expected {nnz} column indices and values, got {} and {}",
                col_idx.len(),
                values.len()
            )));
        }
        if let Some(&j) = col_idx.iter().find(|&&j| j >= ncols) {
            return Err(KError::InvalidArgument(format!("column {j} outside {ncols} local columns")));
        }
        if ghost_plan.ghost_count() != n_ghost {
            return Err(KError::InvalidArgument(format!(
                "ghost plan fills {} slots, operator has {n_ghost} ghost columns",
                ghost_plan.ghost_count()
            )));
        }
        Ok(Self { nrows, ncols, row_ptr, col_idx, values, ghost_plan, comm })
    }

    /// Number of stored entries on this rank.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }
}

impl<C: Comm> RowMatrix for CsrMatrix<C> {
    type Comm = C;

    fn local_rows(&self) -> usize {
        self.nrows
    }

    fn local_cols(&self) -> usize {
        self.ncols
    }

    fn norm_inf(&self) -> f64 {
        let local = (0..self.nrows)
            .map(|i| self.values[self.row_ptr[i]..self.row_ptr[i + 1]].iter().map(|v| v.abs()).sum::<f64>())
            .fold(0.0, f64::max);
        self.comm.all_reduce_max(local)
    }

    fn extract_row_copy(&self, row: usize, cols: &mut [usize], vals: &mut [f64]) -> Result<usize, KError> {
        if row >= self.nrows {
            return Err(KError::InvalidArgument(format!("row {row} outside {} local rows", self.nrows)));
        }
        let (start, end) = (self.row_ptr[row], self.row_ptr[row + 1]);
        let len = end - start;
        let available = cols.len().min(vals.len());
        if available < len {
            return Err(KError::CapacityExceeded { needed: len, available });
        }
        cols[..len].copy_from_slice(&self.col_idx[start..end]);
        vals[..len].copy_from_slice(&self.values[start..end]);
        Ok(len)
    }

    fn multiply_local(&self, x_ext: &[f64], y: &mut [f64]) {
        assert_eq!(x_ext.len(), self.ncols, "Input vector x has incorrect length");
        assert_eq!(y.len(), self.nrows, "Output vector y has incorrect length");
        let (row_ptr, col_idx, values) = (&self.row_ptr, &self.col_idx, &self.values);
        let row_dot = |i: usize| {
            (row_ptr[i]..row_ptr[i + 1])
                .map(|k| values[k] * x_ext[col_idx[k]])
                .sum::<f64>()
        };
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            y.par_iter_mut().enumerate().for_each(|(i, yi)| *yi = row_dot(i));
        }
        #[cfg(not(feature = "rayon"))]
        {
            for (i, yi) in y.iter_mut().enumerate() {
                *yi = row_dot(i);
            }
        }
    }

    fn exchange_ghosts(&self, v_ext: &mut [f64]) {
        self.comm.exchange(&self.ghost_plan, v_ext);
    }

    fn comm(&self) -> &C {
        &self.comm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_spmv() {
        // 3×3 identity in CSR: row_ptr=[0,1,2,3], col_idx=[0,1,2], vals=[1,1,1]
        let m = CsrMatrix::from_csr(3, 3, vec![0, 1, 2, 3], vec![0, 1, 2], vec![1.0, 1.0, 1.0]).unwrap();
        let x = vec![2.0, 3.0, 5.0];
        let mut y = vec![0.0; 3];
        m.multiply_local(&x, &mut y);
        assert_eq!(y, x);
    }

    #[test]
    fn triplets_sum_duplicates() {
        let m = CsrMatrix::from_triplets(2, &[(0, 0, 1.0), (0, 0, 2.0), (1, 0, -1.0), (1, 1, 4.0)]).unwrap();
        assert_eq!(m.nnz(), 3);
        let mut cols = [0usize; 2];
        let mut vals = [0.0; 2];
        assert_eq!(m.extract_row_copy(0, &mut cols, &mut vals).unwrap(), 1);
        assert_eq!(vals[0], 3.0);
        assert_eq!(m.norm_inf(), 5.0);
    }

    #[test]
    fn short_buffer_reports_capacity() {
        let m = CsrMatrix::from_triplets(2, &[(0, 0, 1.0), (0, 1, 2.0), (1, 1, 1.0)]).unwrap();
        let mut cols = [7usize; 1];
        let mut vals = [9.0; 1];
        let err = m.extract_row_copy(0, &mut cols, &mut vals).unwrap_err();
        assert_eq!(err, KError::CapacityExceeded { needed: 2, available: 1 });
        assert_eq!((cols[0], vals[0]), (7, 9.0));
    }

    #[test]
    fn rejects_malformed_layout() {
        assert!(CsrMatrix::from_csr(2, 2, vec![0, 1], vec![0], vec![1.0]).is_err());
        assert!(CsrMatrix::from_csr(2, 2, vec![0, 1, 2], vec![0, 5], vec![1.0, 1.0]).is_err());
    }
}
