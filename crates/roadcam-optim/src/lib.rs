//! Extrinsic pose estimation for fixed traffic cameras built on tiny-solver.
//!
//! The crate is layered the same way as any least-squares problem here:
//! - [`factors`]: residual functions generic over `nalgebra::RealField` so the
//!   solver can evaluate them with dual numbers,
//! - [`ir`]: a backend-agnostic problem description (parameter blocks and
//!   residual blocks tagged with their family),
//! - [`backend`]: compilation of the IR into a tiny-solver problem,
//! - [`estimator`]: the [`PoseEstimator`] that owns the landmarks, builds the
//!   problem, retries from perturbed guesses and reports losses.

pub mod backend;
pub mod estimator;
pub mod factors;
pub mod ir;
pub mod logging;

pub use crate::backend::Termination;
pub use crate::estimator::{
    EstimationFailure, EstimatorConfig, EstimatorState, Losses, PoseEstimator, PoseReport,
};
