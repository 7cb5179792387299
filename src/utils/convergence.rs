//! Convergence tracking & tolerance checks for iterative solvers.

use crate::config::status::TerminationReason;
use crate::core::traits::{InnerProduct, MatVec};

/// Stopping criteria.
#[derive(Debug, Clone, Copy)]
pub struct Convergence {
    pub tol: f64,
    pub max_iters: usize,
}

/// Statistics of one kernel run.
#[derive(Clone, Debug, PartialEq)]
pub struct SolveStats {
    pub iterations: usize,
    /// True residual ‖b − Ax‖ at exit.
    pub residual: f64,
    /// `residual` divided by the initial residual.
    pub scaled_residual: f64,
    /// Residual tracked by the recurrence.
    pub recursive_residual: f64,
    pub reason: TerminationReason,
}

impl Convergence {
    /// True once `res_norm / res0_norm <= tol`.
    pub fn check(&self, res_norm: f64, res0_norm: f64) -> bool {
        if res0_norm == 0.0 {
            return true;
        }
        res_norm / res0_norm <= self.tol
    }

    /// Close out a run: recompute the true residual and downgrade a claimed
    /// convergence to precision loss when it disagrees with the recurrence by
    /// more than a factor of ten.
    pub fn finish<M>(
        &self,
        a: &M,
        b: &[f64],
        x: &[f64],
        res0: f64,
        iterations: usize,
        recursive_residual: f64,
        reason: TerminationReason,
    ) -> SolveStats
    where
        M: MatVec<Vec<f64>> + InnerProduct<Vec<f64>, Scalar = f64>,
    {
        let residual = true_residual(a, b, x);
        let scaled_residual = if res0 > 0.0 { residual / res0 } else { residual };
        let reason = if reason == TerminationReason::Normal && res0 > 0.0 && !(scaled_residual <= 10.0 * self.tol) {
            TerminationReason::Loss
        } else {
            reason
        };
        SolveStats { iterations, residual, scaled_residual, recursive_residual, reason }
    }
}

/// ‖b − A x‖₂, reduced across ranks.
pub fn true_residual<M>(a: &M, b: &[f64], x: &[f64]) -> f64
where
    M: MatVec<Vec<f64>> + InnerProduct<Vec<f64>, Scalar = f64>,
{
    let r = residual_vector(a, b, x);
    a.norm(&r)
}

/// r = b − A x
pub fn residual_vector<M>(a: &M, b: &[f64], x: &[f64]) -> Vec<f64>
where
    M: MatVec<Vec<f64>>,
{
    let mut ax = vec![0.0; b.len()];
    a.matvec(&x.to_vec(), &mut ax);
    ax.iter().zip(b).map(|(&axi, &bi)| bi - axi).collect()
}
