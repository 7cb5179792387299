//! Preconditioned Conjugate Gradient (PCG) per Saad §9.2

use crate::config::TerminationReason;
use crate::error::KError;
use crate::preconditioner::Preconditioner;
use crate::solver::{KrylovOperator, LinearSolver, precondition};
use crate::utils::convergence::{Convergence, SolveStats, residual_vector};

/// PCG monitoring the unpreconditioned residual ‖r‖₂.
pub struct PcgSolver {
    pub conv: Convergence,
    pub residual_history: Vec<f64>,
}

impl PcgSolver {
    pub fn new(conv: Convergence) -> Self {
        Self { conv, residual_history: Vec::new() }
    }
}

impl<M: KrylovOperator> LinearSolver<M> for PcgSolver {
    fn solve(&mut self, a: &M, pc: Option<&dyn Preconditioner>, b: &[f64], x: &mut [f64]) -> Result<SolveStats, KError> {
        let n = b.len();
        let mut r = residual_vector(a, b, x);
        let res0 = a.norm(&r);
        self.residual_history.clear();
        self.residual_history.push(res0);
        if res0 == 0.0 {
            return Ok(self.conv.finish(a, b, x, res0, 0, 0.0, TerminationReason::Normal));
        }
        let mut z = vec![0.0; n];
        precondition(pc, &r, &mut z)?;
        let mut p = z.clone();
        let mut rz = a.dot(&r, &z);
        // Indefinite-preconditioner detection
        if !(rz.is_finite() && rz >= 0.0) {
            return Ok(self.conv.finish(a, b, x, res0, 0, res0, TerminationReason::Breakdown));
        }
        let mut ap = vec![0.0; n];
        let mut res_norm = res0;
        for i in 0..self.conv.max_iters {
            a.matvec(&p, &mut ap);
            let p_dot_ap = a.dot(&p, &ap);
            // Indefinite-matrix detection
            if !(p_dot_ap > 0.0) {
                return Ok(self.conv.finish(a, b, x, res0, i, res_norm, TerminationReason::Breakdown));
            }
            let alpha = rz / p_dot_ap;
            for (xj, pj) in x.iter_mut().zip(&p) {
                *xj += alpha * pj;
            }
            for (rj, apj) in r.iter_mut().zip(&ap) {
                *rj -= alpha * apj;
            }
            res_norm = a.norm(&r);
            self.residual_history.push(res_norm);
            if self.conv.check(res_norm, res0) {
                return Ok(self.conv.finish(a, b, x, res0, i + 1, res_norm, TerminationReason::Normal));
            }
            precondition(pc, &r, &mut z)?;
            let rz_new = a.dot(&r, &z);
            if !(rz_new.is_finite() && rz_new >= 0.0) {
                return Ok(self.conv.finish(a, b, x, res0, i + 1, res_norm, TerminationReason::Breakdown));
            }
            let beta = rz_new / rz;
            for (pj, zj) in p.iter_mut().zip(&z) {
                *pj = zj + beta * *pj;
            }
            rz = rz_new;
        }
        Ok(self.conv.finish(a, b, x, res0, self.conv.max_iters, res_norm, TerminationReason::MaxIts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::test_support::DenseMat;
    use approx::assert_relative_eq;

    struct IdentityPC;
    impl Preconditioner for IdentityPC {
        fn apply(&self, r: &[f64], z: &mut [f64]) -> Result<(), KError> {
            z.copy_from_slice(r);
            Ok(())
        }
    }

    #[test]
    fn pcg_solves_small_spd() {
        // SPD system: [[4,1],[1,3]] x = [1,2]
        let a = DenseMat { data: vec![vec![4.0, 1.0], vec![1.0, 3.0]] };
        let b = vec![1.0, 2.0];
        let mut x = vec![0.0, 0.0];
        let mut solver = PcgSolver::new(Convergence { tol: 1e-10, max_iters: 20 });
        let stats = solver.solve(&a, Some(&IdentityPC), &b, &mut x).unwrap();
        assert_eq!(stats.reason, TerminationReason::Normal);
        assert!(stats.iterations <= 2);
        let expected = [0.09090909090909091, 0.6363636363636364];
        for (xi, ei) in x.iter().zip(expected.iter()) {
            assert_relative_eq!(*xi, *ei, epsilon = 1e-8);
        }
        assert_eq!(solver.residual_history.len(), stats.iterations + 1);
    }

    #[test]
    fn indefinite_matrix_is_a_breakdown() {
        let a = DenseMat { data: vec![vec![1.0, 0.0], vec![0.0, -1.0]] };
        let b = vec![0.0, 1.0];
        let mut x = vec![0.0; 2];
        let stats = PcgSolver::new(Convergence { tol: 1e-10, max_iters: 20 }).solve(&a, None, &b, &mut x).unwrap();
        assert_eq!(stats.reason, TerminationReason::Breakdown);
    }

    #[test]
    fn iteration_cap_is_reported() {
        let a = DenseMat {
            data: vec![vec![4.0, 1.0, 0.0], vec![1.0, 4.0, 1.0], vec![0.0, 1.0, 4.0]],
        };
        let b = vec![1.0, 2.0, 3.0];
        let mut x = vec![0.0; 3];
        let stats = PcgSolver::new(Convergence { tol: 1e-14, max_iters: 1 }).solve(&a, None, &b, &mut x).unwrap();
        assert_eq!(stats.reason, TerminationReason::MaxIts);
        assert_eq!(stats.iterations, 1);
    }
}
