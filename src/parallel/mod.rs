//! Process configuration and collective operations.
//!
//! Every rank runs the same control flow; the reductions here are the only
//! places where ranks exchange the scalars that drive branch decisions.

pub trait Comm {
    /// Rank of this process.
    fn rank(&self) -> usize;
    /// Number of processes.
    fn size(&self) -> usize;
    /// Block until every rank reaches this point.
    fn barrier(&self);
    /// Sum of `x` over all ranks.
    fn all_reduce_sum(&self, x: f64) -> f64;
    /// Maximum of `x` over all ranks.
    fn all_reduce_max(&self, x: f64) -> f64;
    /// Update the ghost entries of `v_ext` following `plan`.
    fn exchange(&self, plan: &GhostPlan, v_ext: &mut [f64]);
}

/// Point-to-point exchange pattern for one distributed operator.
///
/// For each neighbour, `send` lists the owned indices whose values that rank
/// needs and `recv` lists the ghost slots (indices into the extended vector)
/// filled from it, in matching order on both sides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GhostPlan {
    pub neighbors: Vec<Neighbor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub rank: usize,
    pub send: Vec<usize>,
    pub recv: Vec<usize>,
}

impl GhostPlan {
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Total number of ghost slots this plan fills.
    pub fn ghost_count(&self) -> usize {
        self.neighbors.iter().map(|n| n.recv.len()).sum()
    }
}

pub mod serial_comm;
pub use serial_comm::SerialComm;

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;
