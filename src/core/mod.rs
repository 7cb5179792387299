//! Core traits, vector kernels, and the distributed operator adapter.

pub mod operator;
pub mod traits;
pub mod wrappers;

pub use operator::OperatorAdapter;
pub use traits::{InnerProduct, MatVec, RowMatrix};
