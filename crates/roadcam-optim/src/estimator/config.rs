use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::backend::BackendSolveOptions;
use crate::ir::RobustLoss;

/// Weight penalty scales at or above this value disable weight adaptation.
pub const WEIGHT_ADAPTATION_LIMIT: f64 = 1e12;

/// Tunables of [`crate::PoseEstimator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Pulls every group weight toward 1. Values at or above
    /// [`WEIGHT_ADAPTATION_LIMIT`] keep the weights fixed at 1.
    pub weight_penalize_scale: f64,
    /// Scale of the soft bounds on landmark `lambda`/`mu`.
    pub lambda_penalize_scale: f64,
    /// Scale of the penalty keeping the rotation near its guess.
    pub rotation_penalize_scale: f64,
    /// Half-width of the penalty-free rotation window around the guess, degrees.
    pub rotation_tolerance_deg: f64,
    /// Horizontal distance of the heuristic camera guess from the landmark mean.
    pub initial_distance_from_mean: f64,
    /// Height of the heuristic camera guess above the landmark mean.
    pub initial_height_above_mean: f64,
    /// Maximum number of solve attempts.
    pub max_tries_until_abort: usize,
    /// Seed for the perturbations of retry attempts.
    pub seed: u64,
    /// Robust loss on reprojection residuals.
    pub robust_loss: RobustLoss,
    /// Largest RMS reprojection error of a valid solution, pixels.
    pub max_rms_reprojection_error_px: f64,
    /// Largest per-axis deviation of a valid rotation from its guess, degrees.
    pub max_rotation_deviation_deg: f64,
    pub solver: BackendSolveOptions,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            weight_penalize_scale: f64::MAX,
            lambda_penalize_scale: 2.0,
            rotation_penalize_scale: 50.0,
            rotation_tolerance_deg: 30.0,
            initial_distance_from_mean: 500.0,
            initial_height_above_mean: 30.0,
            max_tries_until_abort: 15,
            seed: 42,
            robust_loss: RobustLoss::Huber { scale: 10.0 },
            max_rms_reprojection_error_px: 20.0,
            max_rotation_deviation_deg: 60.0,
            solver: BackendSolveOptions::default(),
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<()> {
        let non_negative = |name: &str, v: f64| -> Result<()> {
            ensure!(!v.is_nan() && v >= 0.0, "{} must be non-negative, got {}", name, v);
            Ok(())
        };
        let positive = |name: &str, v: f64| -> Result<()> {
            ensure!(v.is_finite() && v > 0.0, "{} must be positive, got {}", name, v);
            Ok(())
        };

        non_negative("weight_penalize_scale", self.weight_penalize_scale)?;
        non_negative("lambda_penalize_scale", self.lambda_penalize_scale)?;
        non_negative("rotation_penalize_scale", self.rotation_penalize_scale)?;
        ensure!(
            self.lambda_penalize_scale.is_finite() && self.rotation_penalize_scale.is_finite(),
            "lambda and rotation penalty scales must be finite"
        );
        positive("rotation_tolerance_deg", self.rotation_tolerance_deg)?;
        positive("initial_distance_from_mean", self.initial_distance_from_mean)?;
        ensure!(
            self.initial_height_above_mean.is_finite(),
            "initial_height_above_mean must be finite"
        );
        ensure!(self.max_tries_until_abort > 0, "max_tries_until_abort must be at least 1");
        positive("max_rms_reprojection_error_px", self.max_rms_reprojection_error_px)?;
        positive("max_rotation_deviation_deg", self.max_rotation_deviation_deg)?;
        match self.robust_loss {
            RobustLoss::None => {}
            RobustLoss::Huber { scale } | RobustLoss::Cauchy { scale } => positive("robust loss scale", scale)?,
        }
        ensure!(self.solver.max_iters > 0, "solver max_iters must be at least 1");
        Ok(())
    }

    pub fn weight_adaptation_enabled(&self) -> bool {
        self.weight_penalize_scale.is_finite() && self.weight_penalize_scale < WEIGHT_ADAPTATION_LIMIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_disable_weights() {
        let config = EstimatorConfig::default();
        config.validate().unwrap();
        assert!(!config.weight_adaptation_enabled());
        assert_eq!(config.max_tries_until_abort, 15);
        assert_eq!(config.robust_loss, RobustLoss::Huber { scale: 10.0 });
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = EstimatorConfig::default();
        config.lambda_penalize_scale = -1.0;
        assert!(config.validate().is_err());

        let mut config = EstimatorConfig::default();
        config.rotation_tolerance_deg = 0.0;
        assert!(config.validate().is_err());

        let mut config = EstimatorConfig::default();
        config.max_tries_until_abort = 0;
        assert!(config.validate().is_err());

        let mut config = EstimatorConfig::default();
        config.weight_penalize_scale = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn weight_adaptation_needs_a_moderate_finite_scale() {
        let mut config = EstimatorConfig::default();
        config.weight_penalize_scale = f64::INFINITY;
        config.validate().unwrap();
        assert!(!config.weight_adaptation_enabled());

        config.weight_penalize_scale = WEIGHT_ADAPTATION_LIMIT;
        assert!(!config.weight_adaptation_enabled());

        config.weight_penalize_scale = 4.0;
        assert!(config.weight_adaptation_enabled());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: EstimatorConfig =
            serde_json::from_str(r#"{"max_tries_until_abort": 3, "robust_loss": {"kind": "cauchy", "scale": 2.0}}"#)
                .unwrap();
        assert_eq!(config.max_tries_until_abort, 3);
        assert_eq!(config.robust_loss, RobustLoss::Cauchy { scale: 2.0 });
        assert_eq!(config.rotation_penalize_scale, 50.0);
        assert_eq!(config.solver, BackendSolveOptions::default());
    }
}
