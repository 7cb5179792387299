//! Solver session for Krylov subspace methods.
//!
//! A [`KspContext`] binds an operator and a vector pair, holds the options,
//! parameters and status of the solve, owns the preconditioner through a
//! [`PcManager`], and forwards each solve to a [`KrylovKernel`].
//!
//! # Usage
//!
//! 1. Construct a `KspContext` and adjust options/parameters.
//! 2. `configure` it with `(A, x, b)`.
//! 3. Call `iterate`, or `adaptive_iterate` for the retrying controller.
//!
//! # References
//! - Saad, Y. (2003). Iterative Methods for Sparse Linear Systems. SIAM.

use std::ops::{Deref, DerefMut};

use log::{debug, info, warn};

use crate::config::options::clamp_count;
use crate::config::{AzOption, AzParam, Diagnostics, Options, Params, PreCalc, PrecondKind, SolveOutcome, Status};
use crate::context::pc_context::{PcManager, PcState};
use crate::context::problem::{LinearProblem, set_problem_options};
use crate::core::operator::OperatorAdapter;
use crate::core::traits::RowMatrix;
use crate::error::KError;
use crate::parallel::Comm;
use crate::preconditioner::{Preconditioner, build_default};
use crate::solver::{KrylovDriver, KrylovKernel};
use crate::strategy::{AdaptiveParams, AdaptiveReport};

/// Session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconfigured,
    Configured,
    /// A kernel call is in flight.
    Solving,
}

/// Operator and vectors bound by `configure`.
pub(crate) struct BoundProblem<'a, A: RowMatrix> {
    pub(crate) op: OperatorAdapter<'a, A>,
    pub(crate) x: &'a mut [f64],
    pub(crate) b: &'a [f64],
}

/// Solver session over a row-distributed operator.
pub struct KspContext<'a, A: RowMatrix, K: KrylovKernel = KrylovDriver> {
    pub(crate) options: Options,
    pub(crate) params: Params,
    pub(crate) status: Status,
    state: SessionState,
    pub(crate) problem: Option<BoundProblem<'a, A>>,
    pub(crate) pc: PcManager<'a>,
    kernel: K,
    pub(crate) adaptive: AdaptiveParams,
    /// Install a preset table on the next adaptive solve.
    pub(crate) use_adaptive_defaults: bool,
    pub(crate) report: AdaptiveReport,
}

impl<'a, A: RowMatrix> KspContext<'a, A, KrylovDriver> {
    pub fn new() -> Self {
        Self::with_kernel(KrylovDriver)
    }
}

impl<'a, A: RowMatrix> Default for KspContext<'a, A, KrylovDriver> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, A: RowMatrix, K: KrylovKernel> KspContext<'a, A, K> {
    /// Session that forwards solves to `kernel`.
    pub fn with_kernel(kernel: K) -> Self {
        Self {
            options: Options::default(),
            params: Params::default(),
            status: Status::default(),
            state: SessionState::Unconfigured,
            problem: None,
            pc: PcManager::new(),
            kernel,
            adaptive: AdaptiveParams::default(),
            use_adaptive_defaults: true,
            report: AdaptiveReport::default(),
        }
    }

    /// Bind the operator and vectors. Collective: computes the operator's norm bound.
    ///
    /// `x` and `b` must both hold exactly `a.local_rows()` entries.
    pub fn configure(&mut self, a: &'a A, x: &'a mut [f64], b: &'a [f64]) -> Result<(), KError> {
        let n = a.local_rows();
        if x.len() != n || b.len() != n {
            return Err(KError::InvalidArgument(format!(
                "operator owns {n} rows but x has {} and b has {} entries",
                x.len(),
                b.len()
            )));
        }
        let op = OperatorAdapter::new(a);
        debug!("rank {}: configured {} local rows, {} ghosts", op.comm().rank(), n, op.n_ghost());
        self.problem = Some(BoundProblem { op, x, b });
        self.pc.mark_stale();
        self.state = SessionState::Configured;
        Ok(())
    }

    /// Bind a [`LinearProblem`] and apply its difficulty presets.
    pub fn configure_problem(&mut self, problem: LinearProblem<'a, A>) -> Result<(), KError> {
        let missing = |what: &str| KError::InvalidArgument(format!("linear problem has no {what}"));
        let a = problem.operator.ok_or_else(|| missing("operator"))?;
        let x = problem.lhs.ok_or_else(|| missing("left-hand side"))?;
        let b = problem.rhs.ok_or_else(|| missing("right-hand side"))?;
        set_problem_options(&mut self.options, &mut self.params, problem.difficulty, problem.symmetric);
        self.pc.mark_stale();
        self.configure(a, x, b)
    }

    /// Configure and run [`iterate`](Self::iterate) in one call.
    pub fn solve(
        &mut self,
        a: &'a A,
        x: &'a mut [f64],
        b: &'a [f64],
        max_iters: usize,
        tol: f64,
    ) -> Result<SolveOutcome, KError> {
        self.configure(a, x, b)?;
        self.iterate(max_iters, tol)
    }

    /// Run one Krylov solve with at most `max_iters` iterations.
    ///
    /// A default preconditioner is built for the call and destroyed afterwards
    /// when none exists; a stale one is rebuilt and kept.
    pub fn iterate(&mut self, max_iters: usize, tol: f64) -> Result<SolveOutcome, KError> {
        if self.problem.is_none() {
            return Err(KError::NotConfigured);
        }
        self.options.set(AzOption::MaxIter, clamp_count(max_iters));
        self.params.set(AzParam::Tol, tol);
        let precond = self.options.precond_kind()?;

        if self.pc.is_user_supplied() && precond != PrecondKind::User {
            self.destroy_preconditioner();
        }
        if self.pc.state() == PcState::Stale {
            if self.warnings_enabled() {
                warn!("preconditioner options changed since the last build; rebuilding");
            }
            self.destroy_preconditioner();
            if !matches!(precond, PrecondKind::None | PrecondKind::User) {
                self.construct_preconditioner()?;
            }
        }

        match (self.pc.state(), precond) {
            (PcState::Absent, PrecondKind::User) => Err(KError::UnsupportedPreconditioner { precond: precond.name() }),
            (PcState::Absent, PrecondKind::Jacobi | PrecondKind::DomDecomp) => {
                let mut scope = self.preconditioner_scope();
                scope.construct_preconditioner()?;
                scope.run_kernel()
            }
            _ => self.run_kernel(),
        }
    }

    /// [`iterate`](Self::iterate) one recursion level down, for use as an
    /// inner solve; per-solve summaries are not logged.
    pub fn recursive_iterate(&mut self, max_iters: usize, tol: f64) -> Result<SolveOutcome, KError> {
        let level = self.options.get(AzOption::RecursionLevel);
        self.options.set(AzOption::RecursionLevel, level.saturating_add(1));
        let result = self.iterate(max_iters, tol);
        self.options.set(AzOption::RecursionLevel, level);
        result
    }

    fn run_kernel(&mut self) -> Result<SolveOutcome, KError> {
        let outcome = self.kernel_call();
        self.log_summary(&outcome);
        outcome
    }

    /// Hand the bound problem to the kernel and classify its status.
    pub(crate) fn kernel_call(&mut self) -> Result<SolveOutcome, KError> {
        let problem = self.problem.as_mut().ok_or(KError::NotConfigured)?;
        let pc = match self.options.precond_kind()? {
            PrecondKind::None => None,
            _ => self.pc.get(),
        };
        self.state = SessionState::Solving;
        self.kernel.solve(&problem.op, pc, problem.b, &mut *problem.x, &self.options, &self.params, &mut self.status);
        self.state = SessionState::Configured;
        self.status.outcome()
    }

    pub(crate) fn log_summary(&self, outcome: &Result<SolveOutcome, KError>) {
        let diag = self.options.diagnostics();
        let rank = self.problem.as_ref().map_or(0, |p| p.op.comm().rank());
        if rank != 0 || self.options.get(AzOption::RecursionLevel) > 0 {
            return;
        }
        let solver = self.options.solver_kind().map_or("?", |k| k.name());
        let precond = self.options.precond_kind().map_or("?", |k| k.name());
        match outcome {
            Ok(o) if diag.contains(Diagnostics::SUMMARY) => info!(
                "{solver}/{precond}: {:?} after {} iterations, residual {:e} (scaled {:e})",
                o,
                self.status.iterations(),
                self.status.residual(),
                self.status.scaled_residual()
            ),
            Err(e) if diag.contains(Diagnostics::WARNINGS) => warn!("{solver}/{precond}: {e}"),
            _ => {}
        }
    }

    pub(crate) fn warnings_enabled(&self) -> bool {
        self.diagnostic_enabled(Diagnostics::WARNINGS)
    }

    /// `flag` is set in the `Output` option and this is rank 0.
    pub(crate) fn diagnostic_enabled(&self, flag: Diagnostics) -> bool {
        self.options.diagnostics().contains(flag) && self.problem.as_ref().is_none_or(|p| p.op.comm().rank() == 0)
    }

    pub(crate) fn current_x(&self) -> Result<&[f64], KError> {
        self.problem.as_ref().map(|p| &*p.x).ok_or(KError::NotConfigured)
    }

    /// Overwrite the bound solution vector with `saved`.
    pub(crate) fn restore_x(&mut self, saved: &[f64]) -> Result<(), KError> {
        let problem = self.problem.as_mut().ok_or(KError::NotConfigured)?;
        problem.x.copy_from_slice(saved);
        Ok(())
    }

    /// Build the default preconditioner for the current options and return
    /// its condition estimate. Collective.
    ///
    /// With no preconditioner configured nothing is built and the previous
    /// estimate is returned. A caller-supplied preconditioner is only estimated.
    pub fn construct_preconditioner(&mut self) -> Result<f64, KError> {
        let problem = self.problem.as_ref().ok_or(KError::NotConfigured)?;
        match self.options.precond_kind()? {
            PrecondKind::None => return Ok(self.pc.condest()),
            PrecondKind::User if !self.pc.is_user_supplied() => {
                return Err(KError::UnsupportedPreconditioner { precond: PrecondKind::User.name() });
            }
            PrecondKind::User => {}
            PrecondKind::Jacobi | PrecondKind::DomDecomp => {
                let (options, params) = (&self.options, &self.params);
                self.pc.build(&problem.op, |op| {
                    let pc: Box<dyn Preconditioner + 'a> = build_default(op, options, params)?;
                    Ok(pc)
                })?;
            }
        }
        let condest = self.pc.estimate_condition(&problem.op)?;
        self.options.set(AzOption::PreCalc, PreCalc::Reuse.code());
        debug!("preconditioner built, condest = {condest:e}");
        Ok(condest)
    }

    /// Release the preconditioner. Never fails; calling it twice is harmless.
    pub fn destroy_preconditioner(&mut self) {
        self.pc.destroy();
        self.options.set(AzOption::PreCalc, PreCalc::Calc.code());
    }

    /// Borrow the session so that the preconditioner is destroyed when the
    /// guard goes out of scope, on every exit path.
    pub fn preconditioner_scope(&mut self) -> PcScope<'_, 'a, A, K> {
        PcScope { ctx: self }
    }

    /// Bind a caller-supplied preconditioner and select [`PrecondKind::User`].
    pub fn set_preconditioner(&mut self, pc: Box<dyn Preconditioner + 'a>) {
        self.pc.install(pc);
        self.options.set(AzOption::Precond, PrecondKind::User.code());
    }

    pub fn set_option(&mut self, key: AzOption, value: i32) {
        if key.shapes_preconditioner() && self.options.get(key) != value {
            self.pc.mark_stale();
        }
        self.options.set(key, value);
    }

    pub fn set_parameter(&mut self, key: AzParam, value: f64) {
        if key.shapes_preconditioner() && self.params.get(key) != value {
            self.pc.mark_stale();
        }
        self.params.set(key, value);
    }

    pub fn set_option_by_name(&mut self, name: &str, value: i32) -> Result<(), KError> {
        self.set_option(name.parse()?, value);
        Ok(())
    }

    pub fn set_parameter_by_name(&mut self, name: &str, value: f64) -> Result<(), KError> {
        self.set_parameter(name.parse()?, value);
        Ok(())
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn num_iters(&self) -> usize {
        self.status.iterations()
    }

    pub fn true_residual(&self) -> f64 {
        self.status.residual()
    }

    pub fn scaled_residual(&self) -> f64 {
        self.status.scaled_residual()
    }

    /// Last condition estimate, or -1 before any estimate.
    pub fn condest(&self) -> f64 {
        self.pc.condest()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn preconditioner_state(&self) -> PcState {
        self.pc.state()
    }

    /// Current contents of the bound solution vector.
    pub fn solution(&self) -> Option<&[f64]> {
        self.problem.as_ref().map(|p| &*p.x)
    }

    pub fn adaptive_report(&self) -> &AdaptiveReport {
        &self.report
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }
}

/// Scoped preconditioner acquisition; see [`KspContext::preconditioner_scope`].
pub struct PcScope<'s, 'a, A: RowMatrix, K: KrylovKernel> {
    ctx: &'s mut KspContext<'a, A, K>,
}

impl<'a, A: RowMatrix, K: KrylovKernel> Deref for PcScope<'_, 'a, A, K> {
    type Target = KspContext<'a, A, K>;
    fn deref(&self) -> &Self::Target {
        &*self.ctx
    }
}

impl<A: RowMatrix, K: KrylovKernel> DerefMut for PcScope<'_, '_, A, K> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.ctx
    }
}

impl<A: RowMatrix, K: KrylovKernel> Drop for PcScope<'_, '_, A, K> {
    fn drop(&mut self) {
        self.ctx.destroy_preconditioner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SolverKind, StatusKey, TerminationReason};
    use crate::matrix::CsrMatrix;
    use crate::solver::KrylovOperator;

    fn tridiag(n: usize) -> CsrMatrix {
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 4.0));
            if i > 0 {
                t.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                t.push((i, i + 1, -1.0));
            }
        }
        CsrMatrix::from_triplets(n, &t).unwrap()
    }

    /// Kernel that writes a fixed termination code and leaves x alone.
    struct FixedStatus(f64);

    impl KrylovKernel for FixedStatus {
        fn solve<M: KrylovOperator>(
            &mut self,
            _op: &M,
            _pc: Option<&dyn Preconditioner>,
            _b: &[f64],
            _x: &mut [f64],
            _options: &Options,
            _params: &Params,
            status: &mut Status,
        ) {
            status.set(StatusKey::Why, self.0);
            status.set(StatusKey::Its, 3.0);
        }
    }

    #[test]
    fn iterate_requires_configure() {
        let mut ksp: KspContext<'_, CsrMatrix> = KspContext::new();
        assert_eq!(ksp.iterate(10, 1e-8).unwrap_err(), KError::NotConfigured);
        assert_eq!(ksp.state(), SessionState::Unconfigured);
    }

    #[test]
    fn configure_checks_lengths() {
        let a = tridiag(3);
        let mut x = vec![0.0; 2];
        let b = vec![1.0; 3];
        let mut ksp = KspContext::new();
        let err = ksp.configure(&a, &mut x, &b).unwrap_err();
        assert!(matches!(err, KError::InvalidArgument(_)));
        assert_eq!(err.code(), -1);
    }

    #[test]
    fn iterate_converges_and_drops_throwaway_preconditioner() {
        let a = tridiag(10);
        let mut x = vec![0.0; 10];
        let b = vec![1.0; 10];
        let mut ksp = KspContext::new();
        ksp.set_option(AzOption::Precond, PrecondKind::Jacobi.code());
        ksp.configure(&a, &mut x, &b).unwrap();
        assert_eq!(ksp.iterate(100, 1e-10).unwrap(), SolveOutcome::Converged);
        assert_eq!(ksp.preconditioner_state(), PcState::Absent);
        assert_eq!(ksp.options()[AzOption::PreCalc], PreCalc::Calc.code());
        assert!(ksp.scaled_residual() <= 1e-9);
        assert!(ksp.condest() > 0.0);
    }

    #[test]
    fn constructed_preconditioner_is_kept_and_reused() {
        let a = tridiag(6);
        let mut x = vec![0.0; 6];
        let b = vec![1.0; 6];
        let mut ksp = KspContext::new();
        ksp.set_option(AzOption::Precond, PrecondKind::DomDecomp.code());
        ksp.configure(&a, &mut x, &b).unwrap();
        let condest = ksp.construct_preconditioner().unwrap();
        assert!(condest.is_finite());
        assert_eq!(ksp.options()[AzOption::PreCalc], PreCalc::Reuse.code());
        assert_eq!(ksp.construct_preconditioner().unwrap_err(), KError::PreconditionerExists);

        ksp.iterate(50, 1e-10).unwrap();
        assert_eq!(ksp.preconditioner_state(), PcState::Built);

        ksp.set_parameter(AzParam::Athresh, 1e-3);
        assert_eq!(ksp.preconditioner_state(), PcState::Stale);
        ksp.iterate(50, 1e-10).unwrap();
        assert_eq!(ksp.preconditioner_state(), PcState::Built);

        ksp.destroy_preconditioner();
        ksp.destroy_preconditioner();
        assert_eq!(ksp.preconditioner_state(), PcState::Absent);
    }

    #[test]
    fn user_kind_without_preconditioner_is_unsupported() {
        let a = tridiag(4);
        let mut x = vec![0.0; 4];
        let b = vec![1.0; 4];
        let mut ksp = KspContext::new();
        ksp.set_option_by_name("precond", PrecondKind::User.code()).unwrap();
        ksp.configure(&a, &mut x, &b).unwrap();
        let err = ksp.iterate(10, 1e-8).unwrap_err();
        assert_eq!(err, KError::UnsupportedPreconditioner { precond: "user" });
        assert_eq!(err.code(), -2);
    }

    #[test]
    fn user_preconditioner_is_applied() {
        let a = tridiag(5);
        let mut x = vec![0.0; 5];
        let b = vec![2.0; 5];
        let mut ksp = KspContext::new();
        ksp.set_preconditioner(Box::new(|r: &[f64], z: &mut [f64]| -> Result<(), KError> {
            for (zi, ri) in z.iter_mut().zip(r) {
                *zi = ri / 4.0;
            }
            Ok(())
        }));
        ksp.set_option(AzOption::Solver, SolverKind::Cg.code());
        ksp.configure(&a, &mut x, &b).unwrap();
        assert_eq!(ksp.iterate(50, 1e-10).unwrap(), SolveOutcome::Converged);
        assert_eq!(ksp.preconditioner_state(), PcState::Built);
    }

    #[test]
    fn status_codes_are_classified() {
        let a = tridiag(2);
        let b = vec![1.0; 2];
        for (why, expect) in [
            (TerminationReason::MaxIts.code(), Ok(SolveOutcome::MaxIterations)),
            (TerminationReason::Breakdown.code(), Err(-2)),
            (TerminationReason::Loss.code(), Err(-3)),
            (TerminationReason::IllCond.code(), Err(-4)),
            (TerminationReason::Param.code(), Err(-1)),
            (42.0, Err(-5)),
        ] {
            let mut x = vec![0.0; 2];
            let mut ksp = KspContext::with_kernel(FixedStatus(why));
            ksp.configure(&a, &mut x, &b).unwrap();
            let got = ksp.iterate(5, 1e-6).map_err(|e| e.code());
            assert_eq!(got, expect, "why = {why}");
            assert_eq!(ksp.num_iters(), 3);
        }
    }

    #[test]
    fn recursion_level_is_restored() {
        let a = tridiag(2);
        let mut x = vec![0.0; 2];
        let b = vec![1.0; 2];
        let mut ksp = KspContext::with_kernel(FixedStatus(TerminationReason::Breakdown.code()));
        ksp.configure(&a, &mut x, &b).unwrap();
        assert!(ksp.recursive_iterate(5, 1e-6).is_err());
        assert_eq!(ksp.options()[AzOption::RecursionLevel], 0);
    }

    #[test]
    fn unknown_names_are_rejected() {
        let mut ksp: KspContext<'_, CsrMatrix> = KspContext::new();
        assert!(ksp.set_option_by_name("no_such_option", 1).is_err());
        ksp.set_parameter_by_name("drop", 0.5).unwrap();
        assert_eq!(ksp.params()[AzParam::Drop], 0.5);
    }
}
