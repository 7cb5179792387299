//! aksp: adaptive Krylov solves over row-distributed sparse operators.
//!
//! A [`KspContext`] binds an operator implementing [`RowMatrix`] together with
//! a solution and right-hand-side vector, builds a preconditioner from its
//! options, and hands the system to a [`KrylovKernel`]. The adaptive
//! controller ([`KspContext::adaptive_iterate`]) retries stalled solves with
//! perturbed diagonals, more fill, no dropping, or a larger Krylov space.
//!
//! Multi-process runs implement [`Comm`] (an MPI communicator is available
//! behind the `mpi` feature); every collective decision is made on reduced
//! scalars, so all ranks follow the same path.

pub mod parallel;

pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod matrix;
pub mod preconditioner;
pub mod solver;
pub mod strategy;
pub mod utils;

// Re-exports for convenience
pub use crate::config::*;
pub use crate::context::*;
pub use crate::core::*;
pub use crate::error::*;
pub use crate::matrix::*;
pub use crate::parallel::*;
pub use crate::preconditioner::*;
pub use crate::solver::*;
pub use crate::strategy::{AdaptiveParams, AdaptiveReport, Attempt, Trial};

pub use crate::utils::convergence::SolveStats;
