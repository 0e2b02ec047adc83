//! Backend-agnostic problem description.
//!
//! The estimator describes its least-squares problem as parameter blocks and
//! residual blocks; a backend compiles that description into its own problem
//! type. The same description is evaluated in plain `f64` to account losses.

mod eval;
mod types;

pub use eval::*;
pub use types::*;
