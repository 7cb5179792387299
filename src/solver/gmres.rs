//! Generalized Minimal Residual (GMRES) solver with fixed restart (Saad §6.4)
//!
//! Right-preconditioned restarted GMRES: the Arnoldi process runs on A M⁻¹
//! and the update is taken along the preconditioned basis, so the residual
//! minimized and monitored is the true residual b − Ax.
//!
//! # Features
//! - Double (iterative) Gram-Schmidt orthogonalization for numerical stability
//! - Givens rotations for the least-squares update
//! - Happy breakdown detection; a breakdown without convergence is reported
//!   as precision loss
//! - An ill-conditioned triangular factor of the Hessenberg matrix stops the
//!   solve with [`TerminationReason::IllCond`]
//!
//! # References
//! - Saad, Y. (2003). Iterative Methods for Sparse Linear Systems, 2nd Edition. SIAM. §6.4

use crate::config::TerminationReason;
use crate::error::KError;
use crate::preconditioner::Preconditioner;
use crate::solver::{KrylovOperator, LinearSolver, precondition};
use crate::utils::convergence::{Convergence, SolveStats, residual_vector};

/// Relative size of the new Arnoldi vector below which the Krylov space is invariant.
const HAPPY_BREAKDOWN: f64 = 1e-14;

/// GMRES solver struct with restart length.
pub struct GmresSolver {
    /// Number of Arnoldi vectors before restart
    pub restart: usize,
    /// Convergence criteria (tolerance and max iterations)
    pub conv: Convergence,
}

impl GmresSolver {
    pub fn new(restart: usize, conv: Convergence) -> Self {
        Self { restart: restart.max(1), conv }
    }

    /// Orthogonalize `w` against `v_basis[..=j]` twice, filling column `j` of `h`.
    fn orthogonalize<M: KrylovOperator>(a: &M, v_basis: &[Vec<f64>], w: &mut Vec<f64>, h: &mut [Vec<f64>], j: usize) {
        for pass in 0..2 {
            for i in 0..=j {
                let hij = a.dot(w, &v_basis[i]);
                h[i][j] = if pass == 0 { hij } else { h[i][j] + hij };
                for (wk, vik) in w.iter_mut().zip(&v_basis[i]) {
                    *wk -= hij * vik;
                }
            }
        }
    }

    /// Apply Givens rotations to Hessenberg matrix and update g vector.
    fn apply_givens_and_update_g(h: &mut [Vec<f64>], g: &mut [f64], cs: &mut [f64], sn: &mut [f64], j: usize) {
        for i in 0..j {
            let temp = cs[i] * h[i][j] + sn[i] * h[i + 1][j];
            h[i + 1][j] = -sn[i] * h[i][j] + cs[i] * h[i + 1][j];
            h[i][j] = temp;
        }
        let h_kk = h[j][j];
        let h_k1k = h[j + 1][j];
        let r = h_kk.hypot(h_k1k);
        if r == 0.0 {
            cs[j] = 1.0;
            sn[j] = 0.0;
        } else {
            cs[j] = h_kk / r;
            sn[j] = h_k1k / r;
        }
        h[j][j] = cs[j] * h_kk + sn[j] * h_k1k;
        h[j + 1][j] = 0.0;
        let temp = cs[j] * g[j] + sn[j] * g[j + 1];
        g[j + 1] = -sn[j] * g[j] + cs[j] * g[j + 1];
        g[j] = temp;
    }

    /// True when the leading `m` diagonal entries of the rotated Hessenberg
    /// matrix span more than the relative precision of `f64`.
    fn ill_conditioned(h: &[Vec<f64>], m: usize) -> bool {
        let (lo, hi) = (0..m).map(|i| h[i][i].abs()).fold((f64::INFINITY, 0.0f64), |(lo, hi), d| (lo.min(d), hi.max(d)));
        m > 0 && !(lo > hi * f64::EPSILON)
    }

    /// Solve upper-triangular system H y = g for y.
    fn back_substitution(h: &[Vec<f64>], g: &[f64], m: usize) -> Vec<f64> {
        let mut y = vec![0.0; m];
        for i in (0..m).rev() {
            let mut sum = g[i];
            for j in (i + 1)..m {
                sum -= h[i][j] * y[j];
            }
            y[i] = sum / h[i][i];
        }
        y
    }
}

impl<M: KrylovOperator> LinearSolver<M> for GmresSolver {
    fn solve(&mut self, a: &M, pc: Option<&dyn Preconditioner>, b: &[f64], x: &mut [f64]) -> Result<SolveStats, KError> {
        let n = b.len();
        let m_max = self.restart;
        let mut r = residual_vector(a, b, x);
        let mut beta = a.norm(&r);
        let res0 = beta;
        if res0 == 0.0 {
            return Ok(self.conv.finish(a, b, x, res0, 0, 0.0, TerminationReason::Normal));
        }
        let mut iteration = 0;
        let mut rec_res = beta;
        while iteration < self.conv.max_iters {
            let mut v_basis: Vec<Vec<f64>> = Vec::with_capacity(m_max + 1);
            let mut z_basis: Vec<Vec<f64>> = Vec::with_capacity(m_max);
            v_basis.push(r.iter().map(|ri| ri / beta).collect());
            let mut h = vec![vec![0.0; m_max]; m_max + 1];
            let mut g = vec![0.0; m_max + 1];
            g[0] = beta;
            let mut cs = vec![0.0; m_max];
            let mut sn = vec![0.0; m_max];
            let mut m = 0;
            let mut converged = false;
            let mut happy = false;
            for j in 0..m_max {
                if iteration >= self.conv.max_iters {
                    break;
                }
                iteration += 1;
                let mut zj = vec![0.0; n];
                precondition(pc, &v_basis[j], &mut zj)?;
                let mut w = vec![0.0; n];
                a.matvec(&zj, &mut w);
                z_basis.push(zj);
                let w_norm = a.norm(&w);
                Self::orthogonalize(a, &v_basis, &mut w, &mut h, j);
                h[j + 1][j] = a.norm(&w);
                happy = !(h[j + 1][j] > HAPPY_BREAKDOWN * w_norm);
                if !happy {
                    let hj1 = h[j + 1][j];
                    v_basis.push(w.iter().map(|wi| wi / hj1).collect());
                }
                Self::apply_givens_and_update_g(&mut h, &mut g, &mut cs, &mut sn, j);
                rec_res = g[j + 1].abs();
                m = j + 1;
                if self.conv.check(rec_res, res0) {
                    converged = true;
                    break;
                }
                if happy {
                    break;
                }
            }
            if Self::ill_conditioned(&h, m) {
                return Ok(self.conv.finish(a, b, x, res0, iteration, rec_res, TerminationReason::IllCond));
            }
            let y = Self::back_substitution(&h, &g, m);
            for (yj, zj) in y.iter().zip(&z_basis) {
                for (xi, zji) in x.iter_mut().zip(zj) {
                    *xi += yj * zji;
                }
            }
            r = residual_vector(a, b, x);
            beta = a.norm(&r);
            if converged || self.conv.check(beta, res0) {
                return Ok(self.conv.finish(a, b, x, res0, iteration, rec_res, TerminationReason::Normal));
            }
            if happy {
                return Ok(self.conv.finish(a, b, x, res0, iteration, rec_res, TerminationReason::Loss));
            }
        }
        Ok(self.conv.finish(a, b, x, res0, iteration, rec_res, TerminationReason::MaxIts))
    }
}
