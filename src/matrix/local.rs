//! Rank-local square block of a distributed operator.
//!
//! Subdomain solves see only the owned rows and owned columns; ghost
//! couplings are dropped when the block is extracted.

use faer::Mat;

/// Square CSR block with column indices sorted within each row.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalCsr {
    pub n: usize,
    pub row_ptr: Vec<usize>,
    pub col_idx: Vec<usize>,
    pub vals: Vec<f64>,
}

impl LocalCsr {
    /// Assemble from per-row (column, value) lists; rows are sorted here.
    pub fn from_rows(rows: Vec<Vec<(usize, f64)>>) -> Self {
        let n = rows.len();
        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::new();
        let mut vals = Vec::new();
        row_ptr.push(0);
        for mut row in rows {
            row.sort_by_key(|&(j, _)| j);
            for (j, v) in row {
                col_idx.push(j);
                vals.push(v);
            }
            row_ptr.push(col_idx.len());
        }
        Self { n, row_ptr, col_idx, vals }
    }

    pub fn row(&self, i: usize) -> (&[usize], &[f64]) {
        let (s, e) = (self.row_ptr[i], self.row_ptr[i + 1]);
        (&self.col_idx[s..e], &self.vals[s..e])
    }

    pub fn nnz(&self) -> usize {
        self.vals.len()
    }

    /// Diagonal entries; missing ones read as zero.
    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.n)
            .map(|i| {
                let (cols, vals) = self.row(i);
                cols.binary_search(&i).map(|k| vals[k]).unwrap_or(0.0)
            })
            .collect()
    }

    pub fn matvec(&self, x: &[f64], y: &mut [f64]) {
        for (i, yi) in y.iter_mut().enumerate().take(self.n) {
            let (cols, vals) = self.row(i);
            *yi = cols.iter().zip(vals).map(|(&j, v)| v * x[j]).sum();
        }
    }

    /// Diagonal perturbation `d ← rthresh·d + sign(d)·athresh` applied before
    /// factorization; a missing diagonal is inserted when `athresh != 0`.
    pub fn with_thresholds(&self, athresh: f64, rthresh: f64) -> Self {
        if athresh == 0.0 && rthresh == 1.0 {
            return self.clone();
        }
        let perturb = |d: f64| rthresh * d + if d < 0.0 { -athresh } else { athresh };
        let rows = (0..self.n)
            .map(|i| {
                let (cols, vals) = self.row(i);
                let mut row: Vec<(usize, f64)> = cols
                    .iter()
                    .zip(vals)
                    .map(|(&j, &v)| if j == i { (j, perturb(v)) } else { (j, v) })
                    .collect();
                if athresh != 0.0 && cols.binary_search(&i).is_err() {
                    row.push((i, perturb(0.0)));
                }
                row
            })
            .collect();
        Self::from_rows(rows)
    }

    pub fn to_dense(&self) -> Mat<f64> {
        let mut a = Mat::<f64>::zeros(self.n, self.n);
        for i in 0..self.n {
            let (cols, vals) = self.row(i);
            for (&j, &v) in cols.iter().zip(vals) {
                a[(i, j)] = v;
            }
        }
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tridiag(n: usize) -> LocalCsr {
        let rows = (0..n)
            .map(|i| {
                let mut r = vec![(i, 2.0)];
                if i > 0 {
                    r.push((i - 1, -1.0));
                }
                if i + 1 < n {
                    r.push((i + 1, -1.0));
                }
                r
            })
            .collect();
        LocalCsr::from_rows(rows)
    }

    #[test]
    fn rows_are_sorted() {
        let a = tridiag(3);
        assert_eq!(a.row(1).0, &[0, 1, 2]);
        assert_eq!(a.diagonal(), vec![2.0; 3]);
    }

    #[test]
    fn thresholds_shift_diagonal() {
        let a = LocalCsr::from_rows(vec![vec![(0, -2.0)], vec![(0, 1.0)]]);
        let b = a.with_thresholds(0.5, 2.0);
        assert_eq!(b.diagonal(), vec![-4.5, 0.5]);
        assert_eq!(b.nnz(), 3);
    }

    #[test]
    fn dense_matches_matvec() {
        let a = tridiag(4);
        let d = a.to_dense();
        let x = [1.0, 2.0, 3.0, 4.0];
        let mut y = [0.0; 4];
        a.matvec(&x, &mut y);
        for i in 0..4 {
            let expect: f64 = (0..4).map(|j| d[(i, j)] * x[j]).sum();
            assert_eq!(y[i], expect);
        }
    }
}
