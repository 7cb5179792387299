//! Matrix module: the reference distributed CSR backend and rank-local blocks.

pub mod local;
pub use local::LocalCsr;
pub mod sparse;
pub use sparse::CsrMatrix;
