/// MPI-based parallel communication module.
///
/// This module provides an implementation of the `Comm` trait using the MPI (Message Passing Interface)
/// backend for distributed-memory parallelism. Ranks agree on reduced scalars through
/// `all_reduce_sum`/`all_reduce_max`, and ghost entries of distributed vectors are refreshed
/// with point-to-point messages driven by a [`GhostPlan`](super::GhostPlan).
///
/// # References
/// - [MPI Standard](https://www.mpi-forum.org/)
///
/// # Example
/// ```no_run
/// # #[cfg(feature = "mpi")] {
/// use aksp::parallel::{Comm, MpiComm};
/// let comm = MpiComm::new().unwrap();
/// println!("Rank: {} / {}", comm.rank(), comm.size());
/// comm.barrier();
/// # }
/// ```

use mpi::collective::SystemOperation;
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

use crate::error::KError;

/// MPI communicator wrapper for distributed parallelism.
///
/// Owns the MPI universe, so MPI is finalized when the `MpiComm` is dropped.
pub struct MpiComm {
    /// The MPI world communicator (all processes in the job).
    pub world: SimpleCommunicator,
    /// The rank (ID) of this process within the communicator.
    pub rank: usize,
    /// The total number of processes in the communicator.
    pub size: usize,
    // declared last: finalizes after `world` is released
    _universe: Universe,
}

impl MpiComm {
    /// Initializes MPI and constructs a new `MpiComm` instance.
    pub fn new() -> Result<Self, KError> {
        let universe = mpi::initialize().ok_or(KError::Unsupported("MPI is already initialized"))?;
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        Ok(MpiComm { world, rank, size, _universe: universe })
    }
}

impl super::Comm for MpiComm {
    fn rank(&self) -> usize { self.rank }
    fn size(&self) -> usize { self.size }
    fn barrier(&self) { self.world.barrier(); }

    fn all_reduce_sum(&self, x: f64) -> f64 {
        let mut y = x;
        self.world.all_reduce_into(&x, &mut y, SystemOperation::sum());
        y
    }

    fn all_reduce_max(&self, x: f64) -> f64 {
        let mut y = x;
        self.world.all_reduce_into(&x, &mut y, SystemOperation::max());
        y
    }

    /// Sends owned boundary values to every neighbour, then receives the
    /// neighbours' values into the ghost slots. Sends are non-blocking so the
    /// ordering of neighbours cannot deadlock.
    fn exchange(&self, plan: &super::GhostPlan, v_ext: &mut [f64]) {
        if plan.is_empty() {
            return;
        }
        let sendbufs: Vec<Vec<f64>> = plan
            .neighbors
            .iter()
            .map(|n| n.send.iter().map(|&i| v_ext[i]).collect())
            .collect();
        mpi::request::scope(|scope| {
            let mut requests = Vec::with_capacity(sendbufs.len());
            for (n, buf) in plan.neighbors.iter().zip(&sendbufs) {
                requests.push(
                    self.world
                        .process_at_rank(n.rank as i32)
                        .immediate_send(scope, &buf[..]),
                );
            }
            for n in &plan.neighbors {
                let (data, _status) = self.world.process_at_rank(n.rank as i32).receive_vec::<f64>();
                for (&slot, value) in n.recv.iter().zip(data) {
                    v_ext[slot] = value;
                }
            }
            for req in requests {
                req.wait();
            }
        });
    }
}
