//! Rank-local vector kernels shared by the operator adapter and the Krylov kernels.
//!
//! Local sums are computed with Rayon when the `rayon` feature is enabled; the
//! cross-rank reduction happens one level up, in
//! [`OperatorAdapter`](crate::core::operator::OperatorAdapter).

/// Local dot product `x^T y` over this rank's entries.
pub fn local_dot(x: &[f64], y: &[f64]) -> f64 {
    assert_eq!(x.len(), y.len(), "Vectors must have the same length");
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        x.par_iter()
            .zip(y.par_iter())
            .map(|(xi, yi)| xi * yi)
            .sum()
    }
    #[cfg(not(feature = "rayon"))]
    {
        x.iter().zip(y.iter()).map(|(xi, yi)| xi * yi).sum()
    }
}

/// Local sum of squares `x^T x`.
pub fn local_sq_norm(x: &[f64]) -> f64 {
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        x.par_iter().map(|xi| xi * xi).sum()
    }
    #[cfg(not(feature = "rayon"))]
    {
        x.iter().map(|xi| xi * xi).sum()
    }
}

/// y ← y + alpha x
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}
