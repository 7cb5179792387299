//! Solver configuration: options, parameters and the status vector.

pub mod options;
pub mod status;

pub use options::{AzOption, AzParam, Diagnostics, Options, Params, PreCalc, PrecondKind, SolverKind, SubdomainSolve};
pub use status::{SolveOutcome, Status, StatusKey, TerminationReason};
