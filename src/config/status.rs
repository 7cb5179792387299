//! Solve status vector and its classification into a result.

use std::ops::Index;

use crate::error::KError;
use crate::utils::convergence::SolveStats;

/// Slots of the status vector written by a Krylov kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKey {
    /// Termination code, see [`TerminationReason`].
    Why,
    /// Iterations performed.
    Its,
    /// True residual norm ‖b − Ax‖.
    R,
    /// Residual scaled by the initial residual.
    ScaledR,
    /// Residual as tracked by the recurrence.
    RecR,
}

impl StatusKey {
    pub const COUNT: usize = 5;
}

/// Closed set of termination reasons a kernel may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationReason {
    Normal,
    Param,
    Breakdown,
    MaxIts,
    Loss,
    IllCond,
}

impl TerminationReason {
    pub fn code(self) -> f64 {
        match self {
            TerminationReason::Normal => 0.0,
            TerminationReason::Param => 1.0,
            TerminationReason::Breakdown => 2.0,
            TerminationReason::MaxIts => 3.0,
            TerminationReason::Loss => 4.0,
            TerminationReason::IllCond => 5.0,
        }
    }

    /// `None` for codes outside the closed set.
    pub fn from_code(code: f64) -> Option<Self> {
        [
            TerminationReason::Normal,
            TerminationReason::Param,
            TerminationReason::Breakdown,
            TerminationReason::MaxIts,
            TerminationReason::Loss,
            TerminationReason::IllCond,
        ]
        .into_iter()
        .find(|r| r.code() == code)
    }
}

/// Non-error outcome of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveOutcome {
    Converged,
    /// Iteration cap reached without meeting the tolerance.
    MaxIterations,
}

impl SolveOutcome {
    /// 0 on convergence, 1 when the iteration cap was hit.
    pub fn code(self) -> i32 {
        match self {
            SolveOutcome::Converged => 0,
            SolveOutcome::MaxIterations => 1,
        }
    }
}

/// Status vector, indexed by [`StatusKey`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Status {
    values: [f64; StatusKey::COUNT],
}

impl Index<StatusKey> for Status {
    type Output = f64;
    fn index(&self, key: StatusKey) -> &f64 {
        &self.values[key as usize]
    }
}

impl Status {
    pub fn set(&mut self, key: StatusKey, value: f64) {
        self.values[key as usize] = value;
    }

    /// Overwrite every slot from the statistics of one kernel run.
    pub fn record(&mut self, stats: &SolveStats) {
        self.set(StatusKey::Why, stats.reason.code());
        self.set(StatusKey::Its, stats.iterations as f64);
        self.set(StatusKey::R, stats.residual);
        self.set(StatusKey::ScaledR, stats.scaled_residual);
        self.set(StatusKey::RecR, stats.recursive_residual);
    }

    pub fn iterations(&self) -> usize {
        let its = self[StatusKey::Its];
        if its.is_finite() && its > 0.0 { its as usize } else { 0 }
    }

    pub fn residual(&self) -> f64 {
        self[StatusKey::R]
    }

    pub fn scaled_residual(&self) -> f64 {
        self[StatusKey::ScaledR]
    }

    pub fn reason(&self) -> Option<TerminationReason> {
        TerminationReason::from_code(self[StatusKey::Why])
    }

    /// Classify the termination code.
    ///
    /// Convergence failures carry the status values that triggered them;
    /// a code outside the closed set is an [`KError::Internal`] error.
    pub fn outcome(&self) -> Result<SolveOutcome, KError> {
        let why = self[StatusKey::Why];
        let iterations = self.iterations();
        let residual = self.residual();
        match TerminationReason::from_code(why) {
            Some(TerminationReason::Normal) => Ok(SolveOutcome::Converged),
            Some(TerminationReason::MaxIts) => Ok(SolveOutcome::MaxIterations),
            Some(TerminationReason::Param) => Err(KError::Param {
                why,
                msg: format!("kernel rejected its parameters after {iterations} iterations"),
            }),
            Some(TerminationReason::Breakdown) => Err(KError::Breakdown { why, iterations, residual }),
            Some(TerminationReason::Loss) => Err(KError::PrecisionLoss { why, iterations, residual }),
            Some(TerminationReason::IllCond) => Err(KError::IllConditioned { why, iterations, residual }),
            None => Err(KError::Internal { code: why }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_set_classification() {
        let mut s = Status::default();
        assert_eq!(s.outcome().unwrap(), SolveOutcome::Converged);
        s.set(StatusKey::Why, TerminationReason::MaxIts.code());
        assert_eq!(s.outcome().unwrap().code(), 1);

        s.set(StatusKey::Its, 7.0);
        s.set(StatusKey::R, 0.25);
        s.set(StatusKey::Why, TerminationReason::Loss.code());
        let err = s.outcome().unwrap_err();
        assert_eq!(err, KError::PrecisionLoss { why: 4.0, iterations: 7, residual: 0.25 });
        assert_eq!(err.code(), -3);

        s.set(StatusKey::Why, TerminationReason::IllCond.code());
        assert_eq!(s.outcome().unwrap_err().code(), -4);
    }

    #[test]
    fn unknown_code_is_internal() {
        let mut s = Status::default();
        s.set(StatusKey::Why, 17.0);
        let err = s.outcome().unwrap_err();
        assert_eq!(err, KError::Internal { code: 17.0 });
        assert_eq!(err.code(), -5);
        assert!(s.reason().is_none());
    }
}
