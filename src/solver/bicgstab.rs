//! Right-preconditioned BiCGStab solver (Saad §7.4.2)

use crate::config::TerminationReason;
use crate::error::KError;
use crate::preconditioner::Preconditioner;
use crate::solver::{KrylovOperator, LinearSolver, precondition};
use crate::utils::convergence::{Convergence, SolveStats, residual_vector};

pub struct BiCgStabSolver {
    pub conv: Convergence,
}

impl BiCgStabSolver {
    pub fn new(conv: Convergence) -> Self {
        Self { conv }
    }
}

impl<M: KrylovOperator> LinearSolver<M> for BiCgStabSolver {
    fn solve(&mut self, a: &M, pc: Option<&dyn Preconditioner>, b: &[f64], x: &mut [f64]) -> Result<SolveStats, KError> {
        let n = b.len();
        let mut r = residual_vector(a, b, x);
        let res0 = a.norm(&r);
        if res0 == 0.0 {
            return Ok(self.conv.finish(a, b, x, res0, 0, 0.0, TerminationReason::Normal));
        }
        // shadow residual
        let r_hat = r.clone();
        let tiny = f64::EPSILON * res0 * res0;
        let mut rho_prev = 1.0;
        let mut alpha = 1.0;
        let mut omega = 1.0;
        let mut v = vec![0.0; n];
        let mut p = vec![0.0; n];
        let mut p_hat = vec![0.0; n];
        let mut s_hat = vec![0.0; n];
        let mut t = vec![0.0; n];
        let mut res_norm = res0;
        for i in 1..=self.conv.max_iters {
            let rho = a.dot(&r_hat, &r);
            if !(rho.abs() > tiny) {
                return Ok(self.conv.finish(a, b, x, res0, i - 1, res_norm, TerminationReason::Breakdown));
            }
            let beta = (rho / rho_prev) * (alpha / omega);
            // p = r + beta * (p - omega * v)
            for ((pj, rj), vj) in p.iter_mut().zip(&r).zip(&v) {
                *pj = rj + beta * (*pj - omega * vj);
            }
            precondition(pc, &p, &mut p_hat)?;
            a.matvec(&p_hat, &mut v);
            let alpha_den = a.dot(&r_hat, &v);
            if !(alpha_den.abs() > tiny) {
                return Ok(self.conv.finish(a, b, x, res0, i, res_norm, TerminationReason::Breakdown));
            }
            alpha = rho / alpha_den;
            // s = r - alpha * v, stored in r
            for (rj, vj) in r.iter_mut().zip(&v) {
                *rj -= alpha * vj;
            }
            let s_norm = a.norm(&r);
            if self.conv.check(s_norm, res0) {
                for (xj, pj) in x.iter_mut().zip(&p_hat) {
                    *xj += alpha * pj;
                }
                return Ok(self.conv.finish(a, b, x, res0, i, s_norm, TerminationReason::Normal));
            }
            precondition(pc, &r, &mut s_hat)?;
            a.matvec(&s_hat, &mut t);
            let tt = a.dot(&t, &t);
            if !(tt > 0.0) {
                return Ok(self.conv.finish(a, b, x, res0, i, s_norm, TerminationReason::Breakdown));
            }
            omega = a.dot(&t, &r) / tt;
            for ((xj, pj), sj) in x.iter_mut().zip(&p_hat).zip(&s_hat) {
                *xj += alpha * pj + omega * sj;
            }
            for (rj, tj) in r.iter_mut().zip(&t) {
                *rj -= omega * tj;
            }
            res_norm = a.norm(&r);
            if self.conv.check(res_norm, res0) {
                return Ok(self.conv.finish(a, b, x, res0, i, res_norm, TerminationReason::Normal));
            }
            if omega == 0.0 {
                return Ok(self.conv.finish(a, b, x, res0, i, res_norm, TerminationReason::Breakdown));
            }
            rho_prev = rho;
        }
        Ok(self.conv.finish(a, b, x, res0, self.conv.max_iters, res_norm, TerminationReason::MaxIts))
    }
}
