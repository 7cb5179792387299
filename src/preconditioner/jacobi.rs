// Jacobi preconditioner implementation

use crate::error::KError;
use crate::matrix::LocalCsr;
use crate::preconditioner::Preconditioner;

/// Damped Jacobi: `sweeps` steps of z ← z + ω D⁻¹ (r − A_loc z) from z = 0.
///
/// One sweep with ω = 1 is the classic M⁻¹ = D⁻¹. Ghost couplings are not
/// part of the local block, so each rank smooths its own rows only.
pub struct Jacobi {
    pub(crate) inv_diag: Vec<f64>,
    local: LocalCsr,
    sweeps: usize,
    omega: f64,
}

impl Jacobi {
    pub fn new(local: LocalCsr, sweeps: usize, omega: f64) -> Self {
        let inv_diag = local
            .diagonal()
            .into_iter()
            .map(|d| if d != 0.0 { 1.0 / d } else { 0.0 })
            .collect();
        Self { inv_diag, local, sweeps: sweeps.max(1), omega }
    }
}

impl Preconditioner for Jacobi {
    fn apply(&self, r: &[f64], z: &mut [f64]) -> Result<(), KError> {
        let n = self.inv_diag.len();
        if r.len() != n || z.len() != n {
            return Err(KError::InvalidArgument(format!(
                "jacobi expects vectors of length {n}, got {} and {}",
                r.len(),
                z.len()
            )));
        }
        for i in 0..n {
            z[i] = self.omega * self.inv_diag[i] * r[i];
        }
        if self.sweeps > 1 {
            let mut az = vec![0.0; n];
            for _ in 1..self.sweeps {
                self.local.matvec(z, &mut az);
                for i in 0..n {
                    z[i] += self.omega * self.inv_diag[i] * (r[i] - az[i]);
                }
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "jacobi"
    }
}
