//! Preconditioners for the Krylov kernels.
//!
//! This module defines the [`Preconditioner`] trait and the default
//! constructions selected through [`AzOption::Precond`]: point Jacobi and
//! non-overlapping domain decomposition with an ILU(k), ILUT, BILU or exact
//! LU solve on each subdomain.

use crate::config::{AzOption, AzParam, Options, Params, PrecondKind};
use crate::core::operator::OperatorAdapter;
use crate::core::traits::RowMatrix;
use crate::error::KError;

/// A preconditioner M ≈ A⁻¹ acting on this rank's rows.
pub trait Preconditioner {
    /// Apply M⁻¹ to r, writing z = M⁻¹ r
    fn apply(&self, r: &[f64], z: &mut [f64]) -> Result<(), KError>;
    /// Short label used in log output.
    fn name(&self) -> &'static str {
        "user"
    }
}

/// Plain functions and closures act as caller-supplied preconditioners.
impl<F> Preconditioner for F
where
    F: Fn(&[f64], &mut [f64]) -> Result<(), KError>,
{
    fn apply(&self, r: &[f64], z: &mut [f64]) -> Result<(), KError> {
        self(r, z)
    }
}

pub mod dom_decomp;
pub mod ilu;
pub mod jacobi;

pub use dom_decomp::{DomainDecomp, SubdomainFactor};
pub use ilu::{LuFactors, SparseRow};
pub use jacobi::Jacobi;

/// Build the default preconditioner named by the options.
///
/// Fails with a parameter error for an out-of-range kind, and for
/// [`PrecondKind::None`] / [`PrecondKind::User`], which have no default
/// construction.
pub fn build_default<A: RowMatrix>(
    op: &OperatorAdapter<'_, A>,
    options: &Options,
    params: &Params,
) -> Result<Box<dyn Preconditioner>, KError> {
    match options.precond_kind()? {
        PrecondKind::Jacobi => {
            let local = op.extract_local_matrix()?;
            let sweeps = options.get(AzOption::PolyOrd).max(1) as usize;
            Ok(Box::new(Jacobi::new(local, sweeps, params[AzParam::Omega])))
        }
        PrecondKind::DomDecomp => Ok(Box::new(DomainDecomp::build(op, options, params)?)),
        kind @ (PrecondKind::None | PrecondKind::User) => Err(KError::InvalidArgument(format!(
            "precond = {} has no default construction",
            kind.name()
        ))),
    }
}
