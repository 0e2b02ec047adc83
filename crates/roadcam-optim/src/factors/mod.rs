//! Residual functions with automatic differentiation support.
//!
//! Every residual is a pure function of its parameter values and the constants
//! captured when the residual block was built. All of them are generic over
//! [`nalgebra::RealField`] so they evaluate both with `f64` and with the dual
//! numbers tiny-solver uses for Jacobians.
//!
//! - [`reprojection`]: observed pixel against the rendered parametric landmark,
//!   plus a penalty for `lambda` leaving `[0, max_lambda]`,
//! - [`scalar`]: soft pins ([`target_value_residual`]) and soft bounds
//!   ([`interval_residual`]) for single parameters.

pub mod reprojection;
pub mod scalar;

pub use reprojection::*;
pub use scalar::*;
