//! Incomplete LU factorizations of a rank-local block.
//!
//! Two constructions share one triangular-solve representation:
//!
//! - ILU(k): the sparsity pattern is grown by level of fill; an entry created
//!   through a chain of `k` eliminations has level `k` and is kept while
//!   `k <= level`. Level 0 is the pattern of the block itself.
//! - ILUT: row-wise elimination with numerical dropping. Entries smaller than
//!   `drop · ‖a_i‖₂` are discarded and each of the L and U parts keeps its
//!   `lfil` largest entries, where `lfil` follows the requested fill ratio.
//!
//! A zero pivot is not an error here: the factor is kept and its solves
//! produce non-finite values, which the condition estimate reports as an
//! infinite estimate so a caller can retry with a diagonal perturbation.
//!
//! # References
//! - Saad, Y. (2003). Iterative Methods for Sparse Linear Systems, §10.3–10.4.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use crate::matrix::LocalCsr;

/// Sparse row structure for storing L/U factors.
///
/// Each row stores the column indices and values of nonzero entries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SparseRow {
    /// Column indices of nonzero entries
    pub cols: Vec<usize>,
    /// Values of nonzero entries
    pub vals: Vec<f64>,
}

impl SparseRow {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, col: usize, val: f64) {
        self.cols.push(col);
        self.vals.push(val);
    }

    pub fn len(&self) -> usize {
        self.cols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cols.is_empty()
    }
}

/// Unit-lower L, strictly-upper U and the pivots, with `A ≈ L (D + U)`.
#[derive(Clone, Debug, Default)]
pub struct LuFactors {
    pub n: usize,
    pub l: Vec<SparseRow>,
    pub u: Vec<SparseRow>,
    pub diag: Vec<f64>,
}

impl LuFactors {
    /// Solve L y = r, then (D + U) z = y.
    pub fn solve(&self, r: &[f64], z: &mut [f64]) {
        let n = self.n;
        for i in 0..n {
            let mut sum = r[i];
            for (&j, &v) in self.l[i].cols.iter().zip(&self.l[i].vals) {
                sum -= v * z[j];
            }
            z[i] = sum;
        }
        for i in (0..n).rev() {
            let mut sum = z[i];
            for (&j, &v) in self.u[i].cols.iter().zip(&self.u[i].vals) {
                sum -= v * z[j];
            }
            z[i] = sum / self.diag[i];
        }
    }

    /// Stored entries of L and U including the pivots.
    pub fn nnz(&self) -> usize {
        self.n + self.l.iter().chain(&self.u).map(SparseRow::len).sum::<usize>()
    }

    fn split_row(&mut self, i: usize, row: impl IntoIterator<Item = (usize, f64)>) {
        let (mut l, mut u) = (SparseRow::new(), SparseRow::new());
        let mut d = 0.0;
        for (j, v) in row {
            match j.cmp(&i) {
                std::cmp::Ordering::Less => l.push(j, v),
                std::cmp::Ordering::Equal => d = v,
                std::cmp::Ordering::Greater => u.push(j, v),
            }
        }
        self.l.push(l);
        self.u.push(u);
        self.diag.push(d);
    }
}

fn next_below<V>(work: &BTreeMap<usize, V>, after: Option<usize>, limit: usize) -> Option<usize> {
    let lower = match after {
        Some(k) => Excluded(k),
        None => Unbounded,
    };
    work.range((lower, Excluded(limit))).next().map(|(&k, _)| k)
}

/// ILU(k) by level of fill.
pub fn iluk(a: &LocalCsr, level: usize) -> LuFactors {
    let n = a.n;
    let mut f = LuFactors { n, ..Default::default() };
    let mut u_levels: Vec<Vec<usize>> = Vec::with_capacity(n);
    for i in 0..n {
        let (cols, vals) = a.row(i);
        let mut work: BTreeMap<usize, (f64, usize)> = cols.iter().zip(vals).map(|(&j, &v)| (j, (v, 0))).collect();
        let mut cursor = None;
        while let Some(k) = next_below(&work, cursor, i) {
            cursor = Some(k);
            let (val, lev_ik) = work[&k];
            if f.diag[k] == 0.0 {
                work.insert(k, (0.0, lev_ik));
                continue;
            }
            let lik = val / f.diag[k];
            work.insert(k, (lik, lev_ik));
            for ((&j, &ukj), &lev_kj) in f.u[k].cols.iter().zip(&f.u[k].vals).zip(&u_levels[k]) {
                let lev = lev_ik + lev_kj + 1;
                match work.get_mut(&j) {
                    Some(entry) => {
                        entry.0 -= lik * ukj;
                        entry.1 = entry.1.min(lev);
                    }
                    None if lev <= level => {
                        work.insert(j, (-lik * ukj, lev));
                    }
                    None => {}
                }
            }
        }
        u_levels.push(work.range((Excluded(i), Unbounded)).map(|(_, &(_, lev))| lev).collect());
        f.split_row(i, work.into_iter().map(|(j, (v, _))| (j, v)));
    }
    f
}

/// ILUT with drop tolerance `drop` (relative to the row 2-norm) and fill ratio `fill`.
pub fn ilut(a: &LocalCsr, fill: f64, drop: f64) -> LuFactors {
    let n = a.n;
    let mut f = LuFactors { n, ..Default::default() };
    for i in 0..n {
        let (cols, vals) = a.row(i);
        let row_norm = vals.iter().map(|v| v * v).sum::<f64>().sqrt();
        let tau = drop.max(0.0) * row_norm;
        let lfil = ((fill.max(0.0) * cols.len() as f64) / 2.0).ceil().max(1.0) as usize;

        let mut work: BTreeMap<usize, f64> = cols.iter().zip(vals).map(|(&j, &v)| (j, v)).collect();
        let mut cursor = None;
        while let Some(k) = next_below(&work, cursor, i) {
            cursor = Some(k);
            let wk = if f.diag[k] != 0.0 { work[&k] / f.diag[k] } else { 0.0 };
            if wk.abs() <= tau {
                work.remove(&k);
                continue;
            }
            work.insert(k, wk);
            for (&j, &ukj) in f.u[k].cols.iter().zip(&f.u[k].vals) {
                *work.entry(j).or_insert(0.0) -= wk * ukj;
            }
        }

        let diag = work.remove(&i).unwrap_or(0.0);
        let (lower, upper): (Vec<(usize, f64)>, Vec<(usize, f64)>) =
            work.into_iter().filter(|&(_, v)| v != 0.0 && v.abs() > tau).partition(|&(j, _)| j < i);
        let keep = |mut part: Vec<(usize, f64)>| {
            if part.len() > lfil {
                part.sort_by(|a, b| b.1.abs().partial_cmp(&a.1.abs()).unwrap_or(std::cmp::Ordering::Equal));
                part.truncate(lfil);
                part.sort_by_key(|&(j, _)| j);
            }
            part
        };
        f.split_row(i, keep(lower).into_iter().chain([(i, diag)]).chain(keep(upper)));
    }
    f
}
