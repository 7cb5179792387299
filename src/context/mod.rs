//! Solver sessions and the preconditioner lifecycle.
//!
//! - [`ksp_context`]: the [`KspContext`] session, its state machine and the
//!   scoped preconditioner guard.
//! - [`pc_context`]: [`PcManager`], which owns at most one preconditioner.
//! - [`problem`]: [`LinearProblem`] bundles and difficulty presets.
//!
//! # Example
//! ```rust,ignore
//! use aksp::{CsrMatrix, KspContext};
//! let mut ksp = KspContext::new();
//! ksp.configure(&a, &mut x, &b)?;
//! let outcome = ksp.adaptive_iterate(500, 1e-8)?;
//! ```

pub mod ksp_context;
pub mod pc_context;
pub mod problem;

pub use ksp_context::{KspContext, PcScope, SessionState};
pub use pc_context::{PcManager, PcState};
pub use problem::{LinearProblem, ProblemDifficulty, set_problem_options};
