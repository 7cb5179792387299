//! Krylov kernels.
//!
//! The kernels work on anything that offers a matrix-vector product and a
//! (possibly distributed) inner product. [`KrylovDriver`] is the reference
//! implementation of the [`KrylovKernel`] seam used by the solver session: it
//! reads the method and limits from the options, runs one solve, and writes
//! the outcome into a [`Status`] vector instead of returning an error.

use log::warn;

use crate::config::{AzOption, AzParam, Diagnostics, Options, Params, SolverKind, Status, TerminationReason};
use crate::core::traits::{InnerProduct, MatVec};
use crate::error::KError;
use crate::preconditioner::Preconditioner;
use crate::utils::convergence::{Convergence, SolveStats};

pub mod bicgstab;
pub mod cg;
pub mod gmres;

pub use bicgstab::BiCgStabSolver;
pub use cg::PcgSolver;
pub use gmres::GmresSolver;

/// Operators the kernels accept: a product and a reduced inner product.
pub trait KrylovOperator: MatVec<Vec<f64>> + InnerProduct<Vec<f64>, Scalar = f64> {}

impl<T> KrylovOperator for T where T: MatVec<Vec<f64>> + InnerProduct<Vec<f64>, Scalar = f64> {}

/// Common interface for the iterative solvers.
pub trait LinearSolver<M> {
    /// Solve A·x = b starting from the contents of `x`, writing the result into `x`.
    ///
    /// Numerical trouble is reported through [`SolveStats::reason`]; an `Err`
    /// only comes from a failing preconditioner.
    fn solve(&mut self, a: &M, pc: Option<&dyn Preconditioner>, b: &[f64], x: &mut [f64]) -> Result<SolveStats, KError>;
}

/// The Krylov-kernel collaborator of a solver session.
///
/// One call runs one solve attempt: it mutates `x` in place and populates
/// every slot of `status`. Implementations never return early on a
/// numerical failure; they report it through [`StatusKey::Why`](crate::config::StatusKey::Why).
pub trait KrylovKernel {
    #[allow(clippy::too_many_arguments)]
    fn solve<M: KrylovOperator>(
        &mut self,
        op: &M,
        pc: Option<&dyn Preconditioner>,
        b: &[f64],
        x: &mut [f64],
        options: &Options,
        params: &Params,
        status: &mut Status,
    );
}

/// z = M⁻¹ r, or a copy of `r` without a preconditioner.
pub(crate) fn precondition(pc: Option<&dyn Preconditioner>, r: &[f64], z: &mut [f64]) -> Result<(), KError> {
    match pc {
        Some(pc) => pc.apply(r, z),
        None => {
            z.copy_from_slice(r);
            Ok(())
        }
    }
}

/// Reference kernel: CG, restarted GMRES and BiCGStab.
#[derive(Debug, Default, Clone, Copy)]
pub struct KrylovDriver;

impl KrylovDriver {
    pub fn new() -> Self {
        KrylovDriver
    }

    fn run<M: KrylovOperator>(
        &self,
        op: &M,
        pc: Option<&dyn Preconditioner>,
        b: &[f64],
        x: &mut [f64],
        options: &Options,
        params: &Params,
    ) -> Result<SolveStats, KError> {
        let tol = params[AzParam::Tol];
        if !(tol >= 0.0) {
            return Err(param_error(format!("tol = {tol} must be a non-negative number")));
        }
        if b.len() != x.len() {
            return Err(param_error(format!("x has {} entries, b has {}", x.len(), b.len())));
        }
        let conv = Convergence { tol, max_iters: options.count(AzOption::MaxIter)? };
        match options.solver_kind()? {
            SolverKind::Cg => PcgSolver::new(conv).solve(op, pc, b, x),
            SolverKind::Gmres => {
                let restart = options.count(AzOption::Kspace)?;
                if restart == 0 {
                    return Err(param_error("kspace must be at least 1 for GMRES".to_string()));
                }
                GmresSolver::new(restart, conv).solve(op, pc, b, x)
            }
            SolverKind::Bicgstab => BiCgStabSolver::new(conv).solve(op, pc, b, x),
        }
    }
}

fn param_error(msg: String) -> KError {
    KError::Param { why: TerminationReason::Param.code(), msg }
}

impl KrylovKernel for KrylovDriver {
    #[allow(clippy::too_many_arguments)]
    fn solve<M: KrylovOperator>(
        &mut self,
        op: &M,
        pc: Option<&dyn Preconditioner>,
        b: &[f64],
        x: &mut [f64],
        options: &Options,
        params: &Params,
        status: &mut Status,
    ) {
        let stats = self.run(op, pc, b, x, options, params).unwrap_or_else(|e| {
            let reason = match e {
                KError::Param { .. } => TerminationReason::Param,
                _ => TerminationReason::Breakdown,
            };
            if options.diagnostics().contains(Diagnostics::WARNINGS) {
                warn!("krylov kernel stopped: {e}");
            }
            SolveStats {
                iterations: 0,
                residual: f64::NAN,
                scaled_residual: f64::NAN,
                recursive_residual: f64::NAN,
                reason,
            }
        });
        status.record(&stats);
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::nonsym4;
    use super::*;
    use crate::config::StatusKey;

    #[test]
    fn driver_records_status() {
        let (a, x_true, b) = nonsym4();
        let mut x = vec![0.0; 4];
        let mut status = Status::default();
        let mut o = Options::default();
        o.set(AzOption::Solver, SolverKind::Bicgstab.code());
        let mut p = Params::default();
        p.set(AzParam::Tol, 1e-12);
        KrylovDriver.solve(&a, None, &b, &mut x, &o, &p, &mut status);
        assert_eq!(status[StatusKey::Why], TerminationReason::Normal.code());
        assert!(status.iterations() > 0);
        for (xi, ei) in x.iter().zip(&x_true) {
            assert!((xi - ei).abs() < 1e-8);
        }
    }

    #[test]
    fn bad_parameters_become_param_status() {
        let (a, _, b) = nonsym4();
        let mut x = vec![0.0; 4];
        let mut status = Status::default();
        let mut o = Options::default();
        o.set(AzOption::Kspace, 0);
        KrylovDriver.solve(&a, None, &b, &mut x, &o, &Params::default(), &mut status);
        assert_eq!(status.reason(), Some(TerminationReason::Param));

        let mut p = Params::default();
        p.set(AzParam::Tol, f64::NAN);
        KrylovDriver.solve(&a, None, &b, &mut x, &Options::default(), &p, &mut status);
        assert_eq!(status.outcome().unwrap_err().code(), -1);
    }

    #[test]
    fn failing_preconditioner_is_a_breakdown() {
        let (a, _, b) = nonsym4();
        let mut x = vec![0.0; 4];
        let mut status = Status::default();
        let broken = |_: &[f64], _: &mut [f64]| -> Result<(), KError> { Err(KError::Unsupported("apply")) };
        KrylovDriver.solve(&a, Some(&broken), &b, &mut x, &Options::default(), &Params::default(), &mut status);
        assert_eq!(status.reason(), Some(TerminationReason::Breakdown));
    }
}
