//! Non-overlapping domain decomposition (block Jacobi over ranks).
//!
//! Each rank factors its owned square block after the diagonal perturbation
//! `d ← rthresh·d + sign(d)·athresh` and applies the factor to its piece of
//! the residual. Couplings to ghost columns are ignored, so no communication
//! happens inside `apply`.

use faer::linalg::solvers::{FullPivLu, SolveCore};
use faer::{Conj, MatMut};
use log::{debug, warn};

use crate::config::{AzOption, AzParam, Diagnostics, Options, Params, SubdomainSolve};
use crate::core::operator::OperatorAdapter;
use crate::core::traits::RowMatrix;
use crate::error::KError;
use crate::matrix::LocalCsr;
use crate::parallel::Comm;
use crate::preconditioner::Preconditioner;
use crate::preconditioner::ilu::{LuFactors, ilut, iluk};

/// Factor of one subdomain block.
pub enum SubdomainFactor {
    /// Exact dense LU with full pivoting.
    Lu(FullPivLu<f64>),
    /// ILU(k), ILUT or BILU.
    Incomplete(LuFactors),
}

impl SubdomainFactor {
    /// Factor `block` according to `kind` and the current options.
    pub fn factor(block: &LocalCsr, kind: SubdomainSolve, options: &Options, params: &Params) -> Result<Self, KError> {
        Ok(match kind {
            SubdomainSolve::Lu => SubdomainFactor::Lu(FullPivLu::new(block.to_dense().as_ref())),
            SubdomainSolve::Ilu | SubdomainSolve::Bilu => {
                SubdomainFactor::Incomplete(iluk(block, options.count(AzOption::GraphFill)?))
            }
            SubdomainSolve::Ilut => {
                let fill = params[AzParam::IlutFill];
                let drop = params[AzParam::Drop];
                if !(fill >= 0.0) || !(drop >= 0.0) {
                    return Err(KError::Param {
                        why: crate::config::TerminationReason::Param.code(),
                        msg: format!("ilut_fill = {fill} and drop = {drop} must be non-negative"),
                    });
                }
                SubdomainFactor::Incomplete(ilut(block, fill, drop))
            }
        })
    }

    fn solve(&self, r: &[f64], z: &mut [f64]) {
        match self {
            SubdomainFactor::Lu(lu) => {
                let n = r.len();
                z.copy_from_slice(r);
                let z_mat = MatMut::from_column_major_slice_mut(z, n, 1);
                lu.solve_in_place_with_conj(Conj::No, z_mat);
            }
            SubdomainFactor::Incomplete(f) => f.solve(r, z),
        }
    }
}

/// Domain-decomposition preconditioner over this rank's rows.
pub struct DomainDecomp {
    n: usize,
    kind: SubdomainSolve,
    factor: SubdomainFactor,
}

impl DomainDecomp {
    /// Extract and perturb the local block, then factor it.
    pub fn build<A: RowMatrix>(
        op: &OperatorAdapter<'_, A>,
        options: &Options,
        params: &Params,
    ) -> Result<Self, KError> {
        let kind = options.subdomain_solve()?;
        let overlap = options.get(AzOption::Overlap);
        if overlap > 0 && options.diagnostics().contains(Diagnostics::WARNINGS) && op.comm().rank() == 0 {
            warn!("overlap = {overlap} requested; subdomains are built without overlap");
        }
        let (athresh, rthresh) = (params[AzParam::Athresh], params[AzParam::Rthresh]);
        let block = op.extract_local_matrix()?.with_thresholds(athresh, rthresh);
        let factor = SubdomainFactor::factor(&block, kind, options, params)?;
        debug!(
            "rank {}: {} subdomain factor over {} rows (athresh = {:e}, rthresh = {})",
            op.comm().rank(),
            kind.name(),
            block.n,
            athresh,
            rthresh
        );
        Ok(Self { n: block.n, kind, factor })
    }

    pub fn kind(&self) -> SubdomainSolve {
        self.kind
    }

    /// Stored entries of an incomplete factor; `None` for exact LU.
    pub fn factor_nnz(&self) -> Option<usize> {
        match &self.factor {
            SubdomainFactor::Incomplete(f) => Some(f.nnz()),
            SubdomainFactor::Lu(_) => None,
        }
    }
}

impl Preconditioner for DomainDecomp {
    fn apply(&self, r: &[f64], z: &mut [f64]) -> Result<(), KError> {
        if r.len() != self.n || z.len() != self.n {
            return Err(KError::InvalidArgument(format!(
                "subdomain solve expects vectors of length {}, got {} and {}",
                self.n,
                r.len(),
                z.len()
            )));
        }
        self.factor.solve(r, z);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "dom_decomp"
    }
}
