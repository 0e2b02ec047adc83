//! Translate the landmark store and a starting pose into a [`ProblemIR`].

use anyhow::{anyhow, ensure, Result};
use nalgebra::DVector;
use roadcam_core::{CameraPose, GroupId, Intrinsics, LandmarkId, LandmarkStore};
use std::collections::HashMap;
use std::sync::Arc;

use super::EstimatorConfig;
use crate::factors::LandmarkObservation;
use crate::ir::{FactorKind, FixedMask, ProblemIR, ResidualBlock, ResidualFamily, RobustLoss};

pub(crate) const TRANSLATION: &str = "translation";
pub(crate) const ROTATION: &str = "rotation";

pub(crate) fn lambda_name(id: LandmarkId) -> String {
    format!("lambda/{id}")
}

pub(crate) fn mu_name(id: LandmarkId) -> String {
    format!("mu/{id}")
}

pub(crate) fn weight_name(id: GroupId) -> String {
    format!("weight/{id}")
}

/// IR plus the initial values and the blocks to read back after solving.
#[derive(Debug, Clone)]
pub(crate) struct PoseProblem {
    pub ir: ProblemIR,
    pub initial: HashMap<String, DVector<f64>>,
    pub observed: Vec<LandmarkId>,
    pub weighted_groups: Vec<GroupId>,
}

/// Build the estimation problem.
///
/// Parameter blocks: `translation`, `rotation`, `lambda/<id>` and `mu/<id>` per
/// observed landmark, `weight/<group>` (starting at 1) per group with observations. Residuals:
/// one reprojection block per observed landmark, a soft bound (or pin) on every
/// `lambda` and `mu`, a pin toward 1 per free weight, and a penalty-free window
/// around the guessed rotation.
pub(crate) fn build_problem(
    store: &LandmarkStore,
    intrinsics: &Arc<Intrinsics>,
    guess: &CameraPose,
    config: &EstimatorConfig,
) -> Result<PoseProblem> {
    ensure!(store.observed_count() > 0, "no landmark carries an expected pixel");

    let mut ir = ProblemIR::new(Arc::clone(intrinsics));
    let mut initial = HashMap::new();

    let translation = ir.add_param_block(TRANSLATION, 3, FixedMask::all_free());
    initial.insert(TRANSLATION.to_string(), DVector::from_column_slice(guess.translation.as_slice()));
    let rotation = ir.add_param_block(ROTATION, 3, FixedMask::all_free());
    initial.insert(ROTATION.to_string(), DVector::from_column_slice(guess.rotation.as_slice()));

    let adapt_weights = config.weight_adaptation_enabled();
    let mut weight_ids = HashMap::new();
    let mut weighted_groups = Vec::new();
    for (group_id, group) in store.groups() {
        let observed = group
            .landmarks
            .iter()
            .filter_map(|id| store.landmark(*id))
            .any(|l| l.has_expected_pixel());
        if !observed {
            continue;
        }
        let name = weight_name(group_id);
        let fixed = if adapt_weights {
            FixedMask::all_free()
        } else {
            FixedMask::all_fixed(1)
        };
        let id = ir.add_param_block(name.clone(), 1, fixed);
        initial.insert(name, DVector::from_element(1, 1.0));
        if adapt_weights {
            ir.add_residual_block(ResidualBlock::new(
                vec![id],
                FactorKind::TargetValue {
                    index: 0,
                    target: 1.0,
                    scale: config.weight_penalize_scale,
                },
                ResidualFamily::Weight,
                RobustLoss::None,
            ));
        }
        weight_ids.insert(group_id, id);
        weighted_groups.push(group_id);
    }

    let mut observed = Vec::new();
    for (group_id, landmark_id, landmark) in store.observed() {
        let group = store
            .group(group_id)
            .ok_or_else(|| anyhow!("landmark {} has no group", landmark_id))?;
        let weight = *weight_ids
            .get(&group_id)
            .ok_or_else(|| anyhow!("group {} has no weight block", group_id))?;
        let pixel = landmark
            .expected_pixel()
            .ok_or_else(|| anyhow!("landmark {} lost its expected pixel", landmark_id))?;

        let free_a = landmark.is_free_along_a();
        let free_b = landmark.is_free_along_b();
        let fixed_if = |fixed: bool| if fixed { FixedMask::all_fixed(1) } else { FixedMask::all_free() };

        let lambda = ir.add_param_block(lambda_name(landmark_id), 1, fixed_if(!free_a));
        initial.insert(lambda_name(landmark_id), DVector::from_element(1, landmark.lambda()));
        let mu = ir.add_param_block(mu_name(landmark_id), 1, fixed_if(!free_b));
        initial.insert(mu_name(landmark_id), DVector::from_element(1, landmark.mu()));

        let max_lambda = if group.height > 0.0 { group.height } else { 0.0 };
        let observation = LandmarkObservation {
            landmark: landmark_id,
            origin: (*landmark.origin()).into(),
            axis_a: (*landmark.axis_a()).into(),
            axis_b: (*landmark.axis_b()).into(),
            expected_pixel: (*pixel).into(),
            max_lambda,
        };
        ir.add_residual_block(ResidualBlock::new(
            vec![translation, rotation, lambda, mu, weight],
            FactorKind::Reprojection { observation },
            ResidualFamily::Correspondence,
            config.robust_loss,
        ));

        let scale = config.lambda_penalize_scale;
        let lambda_factor = if free_a && group.height > 0.0 {
            FactorKind::Interval {
                index: 0,
                lower: 0.0,
                upper: group.height,
                scale,
            }
        } else {
            FactorKind::TargetValue {
                index: 0,
                target: landmark.lambda(),
                scale,
            }
        };
        ir.add_residual_block(ResidualBlock::new(
            vec![lambda],
            lambda_factor,
            ResidualFamily::Lambda,
            RobustLoss::None,
        ));

        let mu_factor = if free_b && group.radius > 0.0 {
            FactorKind::Interval {
                index: 0,
                lower: -group.radius,
                upper: group.radius,
                scale,
            }
        } else {
            FactorKind::TargetValue {
                index: 0,
                target: landmark.mu(),
                scale,
            }
        };
        ir.add_residual_block(ResidualBlock::new(
            vec![mu],
            mu_factor,
            ResidualFamily::Lambda,
            RobustLoss::None,
        ));

        observed.push(landmark_id);
    }

    let tolerance = config.rotation_tolerance_deg;
    for (index, angle) in guess.rotation.iter().enumerate() {
        ir.add_residual_block(ResidualBlock::new(
            vec![rotation],
            FactorKind::Interval {
                index,
                lower: angle - tolerance,
                upper: angle + tolerance,
                scale: config.rotation_penalize_scale,
            },
            ResidualFamily::Rotation,
            RobustLoss::None,
        ));
    }

    ir.validate()?;
    Ok(PoseProblem {
        ir,
        initial,
        observed,
        weighted_groups,
    })
}
