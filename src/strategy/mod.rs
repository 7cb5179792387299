//! Adaptive solve strategy: trial tables, escalation limits and the attempt log.
//!
//! The controller itself lives in [`controller`] as methods on
//! [`KspContext`](crate::context::KspContext).

use crate::config::{SubdomainSolve, TerminationReason};

pub mod controller;

/// One diagonal perturbation to try before factoring a subdomain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trial {
    pub athresh: f64,
    pub rthresh: f64,
}

/// Limits and trial table of the adaptive controller.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveParams {
    pub trials: Vec<Trial>,
    /// A preconditioner whose estimate reaches this value is rejected.
    pub condest_threshold: f64,
    /// Ceiling for graph fill (ILU/BILU) or the ILUT fill ratio.
    pub max_fill: f64,
    /// Ceiling for the GMRES Krylov space.
    pub max_kspace: usize,
    /// Start every pass over the trial table from `condest_threshold`
    /// instead of the last estimate.
    pub reset_condest_on_escalation: bool,
}

impl AdaptiveParams {
    /// Default table for a subdomain solve and the current Krylov space.
    pub fn preset(subdomain: SubdomainSolve, kspace: usize) -> Self {
        let (athresh, rthresh): (&[f64], &[f64]) = match subdomain {
            // relative increments 0, 1e-14, 1e-3 over the unit diagonal scale
            SubdomainSolve::Bilu => (&[0.0, 1e-14, 1e-3], &[1.0, 1.0 + 1e-14, 1.0 + 1e-3]),
            _ => (
                &[0.0, 1e-12, 1e-12, 1e-5, 1e-5, 1e-2, 1e-2],
                &[1.0, 1.0, 1.01, 1.0, 1.01, 1.01, 1.1],
            ),
        };
        Self {
            trials: athresh.iter().zip(rthresh).map(|(&athresh, &rthresh)| Trial { athresh, rthresh }).collect(),
            condest_threshold: 1e16,
            max_fill: 4.0,
            max_kspace: 4 * kspace,
            reset_condest_on_escalation: true,
        }
    }

    /// Pair up threshold slices; lengths must agree.
    pub fn trials_from(athresh: &[f64], rthresh: &[f64]) -> Result<Vec<Trial>, crate::error::KError> {
        if athresh.len() != rthresh.len() {
            return Err(crate::error::KError::InvalidArgument(format!(
                "{} absolute thresholds but {} relative thresholds",
                athresh.len(),
                rthresh.len()
            )));
        }
        Ok(athresh.iter().zip(rthresh).map(|(&athresh, &rthresh)| Trial { athresh, rthresh }).collect())
    }

    pub fn with_trials(mut self, trials: Vec<Trial>) -> Self {
        self.trials = trials;
        self
    }

    pub fn with_condest_threshold(mut self, threshold: f64) -> Self {
        self.condest_threshold = threshold;
        self
    }

    pub fn with_max_fill(mut self, max_fill: f64) -> Self {
        self.max_fill = max_fill;
        self
    }

    pub fn with_max_kspace(mut self, max_kspace: usize) -> Self {
        self.max_kspace = max_kspace;
        self
    }

    pub fn with_reset_condest_on_escalation(mut self, reset: bool) -> Self {
        self.reset_condest_on_escalation = reset;
        self
    }
}

impl Default for AdaptiveParams {
    fn default() -> Self {
        Self::preset(SubdomainSolve::Ilut, 30)
    }
}

/// One Krylov solve performed by the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub fill: f64,
    pub kspace: usize,
    /// Index of the trial whose thresholds built the preconditioner.
    pub trial: usize,
    pub condest: f64,
    pub drop: f64,
    /// Raw termination code; `None` when outside the closed set.
    pub reason: Option<TerminationReason>,
    pub residual: f64,
    /// False when the solution was rolled back to the previous iterate.
    pub accepted: bool,
}

/// Every attempt of the last adaptive solve, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdaptiveReport {
    pub attempts: Vec<Attempt>,
}

impl AdaptiveReport {
    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// Distinct (fill, kspace) settings in the order they were first tried.
    pub fn escalations(&self) -> Vec<(f64, usize)> {
        let mut seen: Vec<(f64, usize)> = Vec::new();
        for a in &self.attempts {
            if seen.last() != Some(&(a.fill, a.kspace)) {
                seen.push((a.fill, a.kspace));
            }
        }
        seen
    }
}
