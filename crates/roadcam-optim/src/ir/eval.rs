use anyhow::{anyhow, ensure, Result};
use nalgebra::{DVector, Vector3};
use roadcam_core::LandmarkId;
use std::collections::HashMap;

use super::{FactorKind, ProblemIR, ResidualBlock, ResidualFamily};
use crate::factors::{interval_residual, reprojection_residual_generic, target_value_residual};

/// Plain evaluation of one residual block.
#[derive(Debug, Clone)]
pub struct BlockEvaluation {
    pub family: ResidualFamily,
    /// Scaled residual before any robust loss.
    pub residual: DVector<f64>,
    pub landmark: Option<LandmarkId>,
    /// Unweighted pixel distance for reprojection blocks.
    pub pixel_error: Option<f64>,
    pub behind_camera: bool,
}

/// Evaluation of every residual block at one set of parameter values.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub blocks: Vec<BlockEvaluation>,
}

impl Evaluation {
    /// Sum of squared residual components of one family.
    pub fn family_loss(&self, family: ResidualFamily) -> f64 {
        self.blocks
            .iter()
            .filter(|b| b.family == family)
            .map(|b| b.residual.norm_squared())
            .sum()
    }

    pub fn total_loss(&self) -> f64 {
        self.blocks.iter().map(|b| b.residual.norm_squared()).sum()
    }

    /// Landmarks whose reprojection rendered behind the camera.
    pub fn behind_camera(&self) -> Vec<LandmarkId> {
        self.blocks
            .iter()
            .filter(|b| b.behind_camera)
            .filter_map(|b| b.landmark)
            .collect()
    }

    pub fn pixel_errors(&self) -> Vec<(LandmarkId, f64)> {
        self.blocks
            .iter()
            .filter_map(|b| Some((b.landmark?, b.pixel_error?)))
            .collect()
    }

    /// Root mean square of the unweighted pixel errors, `None` without observations.
    pub fn rms_pixel_error(&self) -> Option<f64> {
        let errors: Vec<f64> = self.blocks.iter().filter_map(|b| b.pixel_error).collect();
        if errors.is_empty() {
            return None;
        }
        let mean_sq = errors.iter().map(|e| e * e).sum::<f64>() / errors.len() as f64;
        Some(mean_sq.sqrt())
    }
}

impl ProblemIR {
    /// Evaluate every residual block at `values` (keyed by block name).
    pub fn evaluate(&self, values: &HashMap<String, DVector<f64>>) -> Result<Evaluation> {
        let mut blocks = Vec::with_capacity(self.residuals.len());
        for residual in &self.residuals {
            blocks.push(self.evaluate_block(residual, values)?);
        }
        Ok(Evaluation { blocks })
    }

    fn evaluate_block(
        &self,
        residual: &ResidualBlock,
        values: &HashMap<String, DVector<f64>>,
    ) -> Result<BlockEvaluation> {
        let mut params = Vec::with_capacity(residual.params.len());
        for id in &residual.params {
            let block = self
                .params
                .get(id.0)
                .ok_or_else(|| anyhow!("residual references missing param {:?}", id))?;
            let value = values
                .get(&block.name)
                .ok_or_else(|| anyhow!("no value for parameter {}", block.name))?;
            ensure!(
                value.len() == block.dim,
                "value dimension mismatch for {}: expected {}, got {}",
                block.name,
                block.dim,
                value.len()
            );
            params.push(value);
        }

        let evaluation = match &residual.factor {
            FactorKind::Reprojection { observation } => {
                ensure!(params.len() == 5, "reprojection factor requires 5 params");
                let t = Vector3::new(params[0][0], params[0][1], params[0][2]);
                let r = Vector3::new(params[1][0], params[1][1], params[1][2]);
                let (lambda, mu, weight) = (params[2][0], params[3][0], params[4][0]);

                let out = reprojection_residual_generic(&t, &r, lambda, mu, weight, observation, &self.intrinsics);
                let raw = reprojection_residual_generic(&t, &r, lambda, mu, 1.0, observation, &self.intrinsics);
                let pixel_error = (raw.residual[0].powi(2) + raw.residual[1].powi(2)).sqrt();
                BlockEvaluation {
                    family: residual.family,
                    residual: DVector::from_row_slice(out.residual.as_slice()),
                    landmark: Some(observation.landmark),
                    pixel_error: Some(pixel_error),
                    behind_camera: out.behind_camera,
                }
            }
            FactorKind::TargetValue { index, target, scale } => BlockEvaluation {
                family: residual.family,
                residual: DVector::from_element(1, target_value_residual(params[0][*index], *target, *scale)),
                landmark: None,
                pixel_error: None,
                behind_camera: false,
            },
            FactorKind::Interval {
                index,
                lower,
                upper,
                scale,
            } => BlockEvaluation {
                family: residual.family,
                residual: DVector::from_element(1, interval_residual(params[0][*index], *lower, *upper, *scale)),
                landmark: None,
                pixel_error: None,
                behind_camera: false,
            },
        };
        Ok(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::LandmarkObservation;
    use crate::ir::{FixedMask, RobustLoss};
    use roadcam_core::synthetic;
    use std::sync::Arc;

    fn problem() -> (ProblemIR, HashMap<String, DVector<f64>>) {
        let mut ir = ProblemIR::new(Arc::new(synthetic::traffic_intrinsics().unwrap()));
        let t = ir.add_param_block("translation", 3, FixedMask::all_free());
        let r = ir.add_param_block("rotation", 3, FixedMask::all_free());
        let l = ir.add_param_block("lambda/0", 1, FixedMask::all_fixed(1));
        let m = ir.add_param_block("mu/0", 1, FixedMask::all_fixed(1));
        let w = ir.add_param_block("weight/0", 1, FixedMask::all_fixed(1));
        ir.add_residual_block(ResidualBlock::new(
            vec![t, r, l, m, w],
            FactorKind::Reprojection {
                observation: LandmarkObservation {
                    landmark: LandmarkId(7),
                    origin: [-4.0, 15.0, 3.0],
                    axis_a: [0.0; 3],
                    axis_b: [0.0; 3],
                    expected_pixel: [771.0, 700.0],
                    max_lambda: 0.0,
                },
            },
            ResidualFamily::Correspondence,
            RobustLoss::Huber { scale: 10.0 },
        ));
        ir.add_residual_block(ResidualBlock::new(
            vec![r],
            FactorKind::Interval {
                index: 0,
                lower: 60.0,
                upper: 80.0,
                scale: 2.0,
            },
            ResidualFamily::Rotation,
            RobustLoss::None,
        ));
        ir.add_residual_block(ResidualBlock::new(
            vec![w],
            FactorKind::TargetValue {
                index: 0,
                target: 1.0,
                scale: 3.0,
            },
            ResidualFamily::Weight,
            RobustLoss::None,
        ));

        let values = HashMap::from([
            ("translation".to_string(), DVector::from_row_slice(&[0.0, -10.0, 5.0])),
            ("rotation".to_string(), DVector::from_row_slice(&[90.0, 0.0, 0.0])),
            ("lambda/0".to_string(), DVector::from_element(1, 0.0)),
            ("mu/0".to_string(), DVector::from_element(1, 0.0)),
            ("weight/0".to_string(), DVector::from_element(1, 2.0)),
        ]);
        (ir, values)
    }

    #[test]
    fn family_losses_use_scaled_residuals() {
        let (ir, values) = problem();
        let eval = ir.evaluate(&values).unwrap();

        // Rendered at (768, 696): offsets (3, 4), weight 2.
        assert!((eval.family_loss(ResidualFamily::Correspondence) - 100.0).abs() < 1e-6);
        assert!((eval.family_loss(ResidualFamily::Rotation) - 400.0).abs() < 1e-9);
        assert!((eval.family_loss(ResidualFamily::Weight) - 9.0).abs() < 1e-12);
        assert_eq!(eval.family_loss(ResidualFamily::Lambda), 0.0);
        assert!((eval.total_loss() - 509.0).abs() < 1e-6);

        assert_eq!(eval.pixel_errors().len(), 1);
        assert!((eval.rms_pixel_error().unwrap() - 5.0).abs() < 1e-6);
        assert!(eval.behind_camera().is_empty());
    }

    #[test]
    fn missing_values_are_reported() {
        let (ir, mut values) = problem();
        values.remove("mu/0");
        assert!(ir.evaluate(&values).is_err());
    }
}
