// Single-process communication: every collective is the identity.

use super::{Comm, GhostPlan};

#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl SerialComm {
    pub fn new() -> Self {
        SerialComm
    }
}

impl Comm for SerialComm {
    fn rank(&self) -> usize { 0 }
    fn size(&self) -> usize { 1 }
    fn barrier(&self) {}
    fn all_reduce_sum(&self, x: f64) -> f64 { x }
    fn all_reduce_max(&self, x: f64) -> f64 { x }
    fn exchange(&self, plan: &GhostPlan, _v_ext: &mut [f64]) {
        debug_assert!(plan.is_empty(), "serial operator cannot have neighbours");
    }
}
