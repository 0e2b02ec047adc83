use thiserror::Error;

use crate::backend::Termination;

/// Why an estimation attempt (or the whole estimation) did not produce a valid pose.
///
/// The estimator never returns these from `estimate()`; the most recent one is
/// available through `PoseEstimator::last_failure`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimationFailure {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("no landmark carries an expected pixel")]
    NoObservations,
    #[error("solver failed: {0}")]
    Solver(String),
    #[error("solver stopped before converging: {termination}")]
    NotConverged { termination: Termination },
    #[error("solution contains non-finite values")]
    NonFinite,
    #[error("{count} observed landmark(s) project behind the camera")]
    BehindCamera { count: usize },
    #[error("RMS reprojection error {rms:.3} px exceeds {limit:.3} px")]
    ReprojectionError { rms: f64, limit: f64 },
    #[error("rotation deviates {deviation:.2} deg from its guess (limit {limit:.2} deg)")]
    RotationDeviation { deviation: f64, limit: f64 },
}

impl EstimationFailure {
    /// Failures that no retry with a different guess can fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EstimationFailure::InvalidConfiguration(_) | EstimationFailure::NoObservations
        )
    }
}
