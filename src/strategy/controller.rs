//! Adaptive solve: retry a domain-decomposition solve with more robust
//! preconditioner settings until it converges or the limits run out.
//!
//! Each pass over the trial table searches for diagonal thresholds whose
//! preconditioner has a condition estimate below the current ceiling, then
//! runs one Krylov solve. A solve that stops at the iteration limit triggers
//! one escalation, in this order:
//!
//! 1. double the fill (graph fill, or the ILUT fill ratio), up to `max_fill`;
//! 2. for ILUT with a positive drop tolerance, set the drop tolerance to zero;
//! 3. double the Krylov space, up to `max_kspace` (GMRES only).
//!
//! The solution vector only moves forward: an attempt whose true residual does
//! not improve on the best accepted one is rolled back to the previous iterate.
//! A non-finite residual never counts as an improvement, and a converged
//! attempt is always kept.

use log::{debug, info, warn};

use crate::config::options::clamp_count;
use crate::config::{AzOption, AzParam, Diagnostics, PrecondKind, SolveOutcome, SolverKind, SubdomainSolve};
use crate::context::KspContext;
use crate::core::traits::RowMatrix;
use crate::error::KError;
use crate::solver::KrylovKernel;
use crate::strategy::{AdaptiveParams, AdaptiveReport, Attempt, Trial};

impl<'a, A: RowMatrix, K: KrylovKernel> KspContext<'a, A, K> {
    /// Replace the trial table and limits; the built-in presets are no longer applied.
    pub fn set_adaptive_params(&mut self, params: AdaptiveParams) {
        self.adaptive = params;
        self.use_adaptive_defaults = false;
    }

    /// Set the trial table from parallel threshold slices.
    ///
    /// A non-positive `condest_threshold` keeps the current ceiling.
    pub fn set_adaptive_trials(
        &mut self,
        athresh: &[f64],
        rthresh: &[f64],
        condest_threshold: f64,
        max_fill: f64,
        max_kspace: usize,
    ) -> Result<(), KError> {
        self.adaptive.trials = AdaptiveParams::trials_from(athresh, rthresh)?;
        if condest_threshold > 0.0 {
            self.adaptive.condest_threshold = condest_threshold;
        }
        self.adaptive.max_fill = max_fill;
        self.adaptive.max_kspace = max_kspace;
        self.use_adaptive_defaults = false;
        Ok(())
    }

    pub fn adaptive_params(&self) -> &AdaptiveParams {
        &self.adaptive
    }

    /// Solve with escalating preconditioner settings.
    ///
    /// Falls back to a single [`iterate`](Self::iterate) unless the session
    /// uses domain decomposition with an incomplete subdomain factorization
    /// and the trial table is non-empty. Convergence failures other than the
    /// iteration limit end the solve immediately. The preconditioner is
    /// destroyed before returning.
    pub fn adaptive_iterate(&mut self, max_iters: usize, tol: f64) -> Result<SolveOutcome, KError> {
        if self.problem.is_none() {
            return Err(KError::NotConfigured);
        }
        self.report = AdaptiveReport::default();
        let precond = self.options.precond_kind()?;
        if precond != PrecondKind::DomDecomp {
            debug!("adaptive solve not applicable to {}; running one solve", precond.name());
            return self.iterate(max_iters, tol);
        }
        let subdomain = self.options.subdomain_solve()?;
        if subdomain == SubdomainSolve::Lu {
            debug!("exact subdomain solve; running one solve");
            return self.iterate(max_iters, tol);
        }
        if self.use_adaptive_defaults {
            let kspace = self.options.get(AzOption::Kspace).max(0) as usize;
            self.adaptive = AdaptiveParams::preset(subdomain, kspace);
            self.use_adaptive_defaults = false;
        }
        if self.adaptive.trials.is_empty() {
            debug!("empty adaptive trial table; running one solve");
            return self.iterate(max_iters, tol);
        }
        self.options.set(AzOption::MaxIter, clamp_count(max_iters));
        self.params.set(AzParam::Tol, tol);

        let mut scope = self.preconditioner_scope();
        scope.destroy_preconditioner();
        let outcome = scope.escalate(subdomain == SubdomainSolve::Ilut);
        scope.log_summary(&outcome);
        if scope.diagnostic_enabled(Diagnostics::ADAPTIVE) {
            info!("adaptive solve finished after {} attempts: {:?}", scope.report.len(), scope.report.escalations());
        }
        outcome
    }

    fn escalate(&mut self, ilut: bool) -> Result<SolveOutcome, KError> {
        let mut fill = if ilut {
            self.params[AzParam::IlutFill]
        } else {
            self.options.count(AzOption::GraphFill)? as f64
        };
        let mut kspace = self.options.count(AzOption::Kspace)?;
        let fill_ceiling = fill.max(self.adaptive.max_fill);
        let kspace_ceiling = match self.options.solver_kind()? {
            SolverKind::Gmres => kspace.max(self.adaptive.max_kspace),
            _ => kspace,
        };
        let threshold = self.adaptive.condest_threshold;
        let mut condest_ceiling = threshold;
        let mut best_residual: Option<f64> = None;
        let mut saved = Vec::new();

        while kspace <= kspace_ceiling {
            self.set_fill(ilut, fill);
            self.options.set(AzOption::Kspace, clamp_count(kspace));
            if self.adaptive.reset_condest_on_escalation {
                condest_ceiling = threshold;
            }
            let (trial, condest) = self.search_condition(condest_ceiling)?;
            if !self.adaptive.reset_condest_on_escalation {
                condest_ceiling = condest;
            }

            saved.clear();
            saved.extend_from_slice(self.current_x()?);
            let outcome = self.kernel_call();
            let residual = self.status.residual();
            let improved = residual.is_finite() && best_residual.is_none_or(|best| residual < best);
            let accepted = matches!(outcome, Ok(SolveOutcome::Converged)) || improved;
            if accepted {
                best_residual = Some(residual);
            } else {
                self.restore_x(&saved)?;
            }
            let attempt = Attempt {
                fill,
                kspace,
                trial,
                condest,
                drop: self.params[AzParam::Drop],
                reason: self.status.reason(),
                residual,
                accepted,
            };
            if self.diagnostic_enabled(Diagnostics::ADAPTIVE) {
                debug!("adaptive attempt {}: {:?}", self.report.len(), attempt);
            }
            self.report.attempts.push(attempt);

            if outcome? == SolveOutcome::Converged {
                return Ok(SolveOutcome::Converged);
            }

            let drop = self.params[AzParam::Drop];
            if fill < fill_ceiling {
                fill = (2.0 * fill).max(1.0).min(fill_ceiling);
            } else if ilut && drop > 0.0 {
                self.params.set(AzParam::Drop, 0.0);
            } else {
                match kspace.checked_mul(2) {
                    Some(k) => kspace = k.max(1),
                    None => break,
                }
            }
        }
        Ok(SolveOutcome::MaxIterations)
    }

    /// Build preconditioners through the trial table until one has a
    /// condition estimate below `ceiling`. Returns the trial index and its
    /// estimate; when every trial fails the last build is kept.
    fn search_condition(&mut self, ceiling: f64) -> Result<(usize, f64), KError> {
        let last = self.adaptive.trials.len().saturating_sub(1);
        let mut trial = 0;
        loop {
            let Trial { athresh, rthresh } = self
                .adaptive
                .trials
                .get(trial)
                .copied()
                .ok_or_else(|| KError::InvalidArgument("adaptive trial table is empty".to_string()))?;
            self.params.set(AzParam::Athresh, athresh);
            self.params.set(AzParam::Rthresh, rthresh);
            self.destroy_preconditioner();
            let condest = self.construct_preconditioner()?;
            if condest < ceiling {
                return Ok((trial, condest));
            }
            if trial == last {
                if self.warnings_enabled() {
                    warn!("no diagonal threshold trial brings condest below {ceiling:e}; continuing with {condest:e}");
                }
                return Ok((trial, condest));
            }
            trial += 1;
        }
    }

    fn set_fill(&mut self, ilut: bool, fill: f64) {
        if ilut {
            self.params.set(AzParam::IlutFill, fill);
        } else {
            self.options.set(AzOption::GraphFill, clamp_count(fill as usize));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{
        AzOption, AzParam, Options, Params, PrecondKind, SolveOutcome, SolverKind, Status, StatusKey, SubdomainSolve,
        TerminationReason,
    };
    use crate::context::{KspContext, PcState};
    use crate::error::KError;
    use crate::matrix::CsrMatrix;
    use crate::preconditioner::Preconditioner;
    use crate::solver::{KrylovKernel, KrylovOperator};
    use crate::strategy::AdaptiveParams;

    /// Plays back (why, residual) pairs and stamps x with the call number.
    struct Scripted {
        script: Vec<(TerminationReason, f64)>,
        calls: usize,
    }

    impl Scripted {
        fn new(script: Vec<(TerminationReason, f64)>) -> Self {
            Self { script, calls: 0 }
        }
    }

    impl KrylovKernel for Scripted {
        fn solve<M: KrylovOperator>(
            &mut self,
            _op: &M,
            _pc: Option<&dyn Preconditioner>,
            _b: &[f64],
            x: &mut [f64],
            _options: &Options,
            _params: &Params,
            status: &mut Status,
        ) {
            let (why, r) = self.script.get(self.calls).copied().unwrap_or((TerminationReason::MaxIts, 1.0));
            self.calls += 1;
            x.iter_mut().for_each(|xi| *xi = self.calls as f64);
            status.set(StatusKey::Why, why.code());
            status.set(StatusKey::Its, 1.0);
            status.set(StatusKey::R, r);
        }
    }

    fn tridiag(n: usize) -> CsrMatrix {
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 3.0));
            if i > 0 {
                t.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                t.push((i, i + 1, -1.0));
            }
        }
        CsrMatrix::from_triplets(n, &t).unwrap()
    }

    fn dd_ilu<'a>(kernel: Scripted) -> KspContext<'a, CsrMatrix, Scripted> {
        let mut ksp = KspContext::with_kernel(kernel);
        ksp.set_option(AzOption::Precond, PrecondKind::DomDecomp.code());
        ksp.set_option(AzOption::SubdomainSolve, SubdomainSolve::Ilu.code());
        ksp
    }

    #[test]
    fn escalates_fill_then_kspace() {
        let a = tridiag(4);
        let mut x = vec![0.0; 4];
        let b = vec![1.0; 4];
        let mut ksp = dd_ilu(Scripted::new(vec![]));
        ksp.set_option(AzOption::Kspace, 5);
        ksp.set_adaptive_params(AdaptiveParams::preset(SubdomainSolve::Ilu, 5).with_max_fill(2.0).with_max_kspace(10));
        ksp.configure(&a, &mut x, &b).unwrap();
        assert_eq!(ksp.adaptive_iterate(10, 1e-8).unwrap(), SolveOutcome::MaxIterations);
        assert_eq!(ksp.adaptive_report().escalations(), vec![(0.0, 5), (1.0, 5), (2.0, 5), (2.0, 10)]);
        assert_eq!(ksp.preconditioner_state(), PcState::Absent);
        assert_eq!(ksp.options()[AzOption::GraphFill], 2);
    }

    #[test]
    fn ilut_drops_tolerance_before_kspace() {
        let a = tridiag(4);
        let mut x = vec![0.0; 4];
        let b = vec![1.0; 4];
        let mut ksp = KspContext::with_kernel(Scripted::new(vec![]));
        ksp.set_option(AzOption::Precond, PrecondKind::DomDecomp.code());
        ksp.set_option(AzOption::Solver, SolverKind::Bicgstab.code());
        ksp.set_parameter(AzParam::Drop, 0.1);
        ksp.set_adaptive_params(AdaptiveParams::default().with_max_fill(1.0));
        ksp.configure(&a, &mut x, &b).unwrap();
        assert_eq!(ksp.adaptive_iterate(10, 1e-8).unwrap(), SolveOutcome::MaxIterations);
        let drops: Vec<f64> = ksp.adaptive_report().attempts.iter().map(|a| a.drop).collect();
        assert_eq!(drops, vec![0.1, 0.0]);
        assert_eq!(ksp.kernel().calls, 2);
    }

    #[test]
    fn worse_attempt_is_rolled_back() {
        let a = tridiag(3);
        let mut x = vec![0.0; 3];
        let b = vec![1.0; 3];
        let script = vec![(TerminationReason::MaxIts, 0.5), (TerminationReason::MaxIts, 0.9)];
        let mut ksp = dd_ilu(Scripted::new(script));
        ksp.set_adaptive_params(AdaptiveParams::preset(SubdomainSolve::Ilu, 30).with_max_fill(1.0).with_max_kspace(30));
        ksp.set_option(AzOption::Solver, SolverKind::Cg.code());
        ksp.configure(&a, &mut x, &b).unwrap();
        ksp.adaptive_iterate(10, 1e-8).unwrap();
        let accepted: Vec<bool> = ksp.adaptive_report().attempts.iter().map(|a| a.accepted).collect();
        assert_eq!(accepted, vec![true, false]);
        assert_eq!(ksp.solution().unwrap(), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn nan_attempt_is_never_kept() {
        let a = tridiag(3);
        let mut x = vec![0.0; 3];
        let b = vec![1.0; 3];
        let script = vec![(TerminationReason::MaxIts, f64::NAN), (TerminationReason::Normal, 1e-12)];
        let mut ksp = dd_ilu(Scripted::new(script));
        ksp.set_adaptive_params(AdaptiveParams::preset(SubdomainSolve::Ilu, 30).with_max_fill(1.0));
        ksp.configure(&a, &mut x, &b).unwrap();
        assert_eq!(ksp.adaptive_iterate(10, 1e-8).unwrap(), SolveOutcome::Converged);
        let accepted: Vec<bool> = ksp.adaptive_report().attempts.iter().map(|a| a.accepted).collect();
        assert_eq!(accepted, vec![false, true]);
        assert_eq!(ksp.solution().unwrap(), &[2.0, 2.0, 2.0]);
    }

    #[test]
    fn nan_only_attempts_leave_the_initial_guess() {
        let a = tridiag(3);
        let mut x = vec![0.25; 3];
        let b = vec![1.0; 3];
        let script = vec![(TerminationReason::MaxIts, f64::NAN), (TerminationReason::MaxIts, f64::INFINITY)];
        let mut ksp = dd_ilu(Scripted::new(script));
        ksp.set_option(AzOption::Solver, SolverKind::Cg.code());
        ksp.set_adaptive_params(AdaptiveParams::preset(SubdomainSolve::Ilu, 30).with_max_fill(1.0));
        ksp.configure(&a, &mut x, &b).unwrap();
        assert_eq!(ksp.adaptive_iterate(10, 1e-8).unwrap(), SolveOutcome::MaxIterations);
        assert!(ksp.adaptive_report().attempts.iter().all(|a| !a.accepted));
        assert_eq!(ksp.solution().unwrap(), &[0.25, 0.25, 0.25]);
    }

    #[test]
    fn converged_attempt_is_kept_even_with_a_larger_residual() {
        let a = tridiag(3);
        let mut x = vec![0.0; 3];
        let b = vec![1.0; 3];
        let script = vec![(TerminationReason::MaxIts, 1e-14), (TerminationReason::Normal, 1e-12)];
        let mut ksp = dd_ilu(Scripted::new(script));
        ksp.set_adaptive_params(AdaptiveParams::preset(SubdomainSolve::Ilu, 30).with_max_fill(1.0));
        ksp.configure(&a, &mut x, &b).unwrap();
        assert_eq!(ksp.adaptive_iterate(10, 1e-8).unwrap(), SolveOutcome::Converged);
        let accepted: Vec<bool> = ksp.adaptive_report().attempts.iter().map(|a| a.accepted).collect();
        assert_eq!(accepted, vec![true, true]);
        assert_eq!(ksp.solution().unwrap(), &[2.0, 2.0, 2.0]);
    }

    #[test]
    fn non_dd_session_ignores_invalid_subdomain_settings() {
        let a = tridiag(3);
        let mut x = vec![0.0; 3];
        let b = vec![1.0; 3];
        let mut ksp = KspContext::with_kernel(Scripted::new(vec![(TerminationReason::Normal, 0.0)]));
        ksp.set_option(AzOption::Precond, PrecondKind::Jacobi.code());
        ksp.set_option(AzOption::SubdomainSolve, 99);
        ksp.set_option(AzOption::Kspace, -4);
        ksp.configure(&a, &mut x, &b).unwrap();
        assert_eq!(ksp.adaptive_iterate(10, 1e-8).unwrap(), SolveOutcome::Converged);
        assert!(ksp.adaptive_report().is_empty());
        assert_eq!(ksp.kernel().calls, 1);
    }

    #[test]
    fn breakdown_aborts() {
        let a = tridiag(3);
        let mut x = vec![0.0; 3];
        let b = vec![1.0; 3];
        let mut ksp = dd_ilu(Scripted::new(vec![(TerminationReason::Breakdown, f64::NAN)]));
        ksp.configure(&a, &mut x, &b).unwrap();
        let err = ksp.adaptive_iterate(10, 1e-8).unwrap_err();
        assert!(matches!(err, KError::Breakdown { .. }));
        assert_eq!(ksp.adaptive_report().len(), 1);
        assert_eq!(ksp.preconditioner_state(), PcState::Absent);
    }

    #[test]
    fn condest_search_exhaustion_uses_last_trial() {
        let a = tridiag(3);
        let mut x = vec![0.0; 3];
        let b = vec![1.0; 3];
        let mut ksp = dd_ilu(Scripted::new(vec![(TerminationReason::Normal, 0.0)]));
        ksp.set_adaptive_trials(&[0.0, 1e-3], &[1.0, 1.0], 1e-30, 4.0, 30).unwrap();
        ksp.configure(&a, &mut x, &b).unwrap();
        assert_eq!(ksp.adaptive_iterate(10, 1e-8).unwrap(), SolveOutcome::Converged);
        let attempt = &ksp.adaptive_report().attempts[0];
        assert_eq!(attempt.trial, 1);
        assert_eq!(ksp.params()[AzParam::Athresh], 1e-3);
    }

    #[test]
    fn mismatched_trials_are_rejected() {
        let mut ksp: KspContext<'_, CsrMatrix> = KspContext::new();
        assert!(ksp.set_adaptive_trials(&[0.0, 1.0], &[1.0], 0.0, 4.0, 10).is_err());
        ksp.set_adaptive_trials(&[0.0], &[1.0], 0.0, 4.0, 10).unwrap();
        assert_eq!(ksp.adaptive_params().condest_threshold, 1e16);
    }
}
