use thiserror::Error;

// Unified error type for aksp

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("solver session is not configured with an operator and vectors")]
    NotConfigured,
    #[error("precond = {precond} requires a caller-supplied preconditioner, none is bound")]
    UnsupportedPreconditioner { precond: &'static str },
    #[error("a preconditioner is already built; destroy it before rebuilding")]
    PreconditionerExists,
    #[error("row buffer too small: {needed} nonzeros needed, {available} available")]
    CapacityExceeded { needed: usize, available: usize },
    #[error("solver parameter error (status why = {why}): {msg}")]
    Param { why: f64, msg: String },
    #[error("numerical breakdown after {iterations} iterations (status why = {why}, residual {residual:e})")]
    Breakdown { why: f64, iterations: usize, residual: f64 },
    #[error("loss of precision after {iterations} iterations (status why = {why}, residual {residual:e})")]
    PrecisionLoss { why: f64, iterations: usize, residual: f64 },
    #[error("ill-conditioned Krylov subspace after {iterations} iterations (status why = {why}, residual {residual:e})")]
    IllConditioned { why: f64, iterations: usize, residual: f64 },
    #[error("internal error: unknown termination status why = {code}")]
    Internal { code: f64 },
    #[error("factorization error: {0}")]
    FactorError(String),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl KError {
    /// Integer result code: -1 parameter/argument, -2 breakdown or a missing
    /// caller-supplied preconditioner, -3 loss, -4 ill-conditioned, -5 internal.
    pub fn code(&self) -> i32 {
        match self {
            KError::InvalidArgument(_) | KError::NotConfigured | KError::Param { .. } => -1,
            KError::Breakdown { .. } | KError::UnsupportedPreconditioner { .. } => -2,
            KError::PrecisionLoss { .. } => -3,
            KError::IllConditioned { .. } => -4,
            _ => -5,
        }
    }
}
