//! Preconditioner lifecycle for a solver session.
//!
//! A session owns at most one preconditioner at a time. It is either built
//! from the session's options by a factory, or installed by the caller.
//! There is no in-place refresh: when a parameter that shapes the
//! factorization changes, the built preconditioner is marked stale and the
//! next solve destroys and rebuilds it.

use crate::core::operator::OperatorAdapter;
use crate::core::traits::RowMatrix;
use crate::error::KError;
use crate::parallel::Comm;
use crate::preconditioner::Preconditioner;

/// Lifecycle state of the managed preconditioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcState {
    Absent,
    Built,
    /// Built, but a factorization-shaping value changed afterwards.
    Stale,
}

pub struct PcManager<'a> {
    pc: Option<Box<dyn Preconditioner + 'a>>,
    state: PcState,
    user_supplied: bool,
    condest: f64,
}

impl Default for PcManager<'_> {
    fn default() -> Self {
        Self { pc: None, state: PcState::Absent, user_supplied: false, condest: -1.0 }
    }
}

impl<'a> PcManager<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PcState {
        self.state
    }

    pub fn is_user_supplied(&self) -> bool {
        self.user_supplied
    }

    /// Last condition estimate, or -1 before any estimate.
    pub fn condest(&self) -> f64 {
        self.condest
    }

    /// The preconditioner, when built and current.
    pub fn get(&self) -> Option<&(dyn Preconditioner + 'a)> {
        match self.state {
            PcState::Built => self.pc.as_deref(),
            _ => None,
        }
    }

    /// Build through `factory`. Fails with [`KError::PreconditionerExists`]
    /// unless the manager is empty; the state is unchanged on failure.
    pub fn build<A, F>(&mut self, op: &OperatorAdapter<'_, A>, factory: F) -> Result<(), KError>
    where
        A: RowMatrix,
        F: FnOnce(&OperatorAdapter<'_, A>) -> Result<Box<dyn Preconditioner + 'a>, KError>,
    {
        if self.state != PcState::Absent {
            return Err(KError::PreconditionerExists);
        }
        self.pc = Some(factory(op)?);
        self.state = PcState::Built;
        self.user_supplied = false;
        Ok(())
    }

    /// Bind a caller-supplied preconditioner, replacing any current one.
    pub fn install(&mut self, pc: Box<dyn Preconditioner + 'a>) {
        self.pc = Some(pc);
        self.state = PcState::Built;
        self.user_supplied = true;
        self.condest = -1.0;
    }

    /// Release the preconditioner. Always leaves the manager empty.
    pub fn destroy(&mut self) {
        self.pc = None;
        self.state = PcState::Absent;
        self.user_supplied = false;
    }

    /// Built → Stale; caller-supplied preconditioners are never stale.
    pub fn mark_stale(&mut self) {
        if self.state == PcState::Built && !self.user_supplied {
            self.state = PcState::Stale;
        }
    }

    /// ‖M⁻¹ 1‖∞ over all ranks (collective), stored and returned.
    ///
    /// Non-finite entries count as an infinite estimate.
    pub fn estimate_condition<A: RowMatrix>(&mut self, op: &OperatorAdapter<'_, A>) -> Result<f64, KError> {
        let pc = self
            .get()
            .ok_or_else(|| KError::InvalidArgument("condition estimate needs a built preconditioner".to_string()))?;
        let ones = vec![1.0; op.n_local()];
        let mut z = vec![0.0; op.n_local()];
        pc.apply(&ones, &mut z)?;
        let local = z
            .iter()
            .map(|v| if v.is_finite() { v.abs() } else { f64::INFINITY })
            .fold(0.0, f64::max);
        self.condest = op.comm().all_reduce_max(local);
        Ok(self.condest)
    }
}
