use anyhow::{ensure, Result};
use roadcam_core::Intrinsics;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::factors::LandmarkObservation;

/// Identifier for a parameter block in the IR.
///
/// Stable within a `ProblemIR` instance; residual blocks reference their
/// parameters through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(pub usize);

/// Fixed parameter mask for a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedMask {
    fixed_indices: HashSet<usize>,
}

impl FixedMask {
    pub fn all_free() -> Self {
        Self {
            fixed_indices: HashSet::new(),
        }
    }

    pub fn all_fixed(dim: usize) -> Self {
        Self {
            fixed_indices: (0..dim).collect(),
        }
    }

    pub fn is_fixed(&self, idx: usize) -> bool {
        self.fixed_indices.contains(&idx)
    }

    pub fn is_all_fixed(&self, dim: usize) -> bool {
        self.fixed_indices.len() == dim
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.fixed_indices.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.fixed_indices.is_empty()
    }
}

/// Robust loss applied to a residual block.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RobustLoss {
    #[default]
    None,
    Huber {
        scale: f64,
    },
    Cauchy {
        scale: f64,
    },
}

/// Which part of the objective a residual block belongs to.
///
/// Losses are reported per family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualFamily {
    Correspondence,
    Weight,
    Lambda,
    Rotation,
}

impl ResidualFamily {
    pub const ALL: [ResidualFamily; 4] = [
        ResidualFamily::Correspondence,
        ResidualFamily::Weight,
        ResidualFamily::Lambda,
        ResidualFamily::Rotation,
    ];
}

/// Backend-agnostic factor kinds.
///
/// Each kind implies its parameter layout and residual dimension.
#[derive(Debug, Clone, PartialEq)]
pub enum FactorKind {
    /// Parameters: `[translation(3), rotation(3), lambda(1), mu(1), weight(1)]`.
    Reprojection { observation: LandmarkObservation },
    /// `(p[index] - target) * scale` on a single parameter block.
    TargetValue {
        index: usize,
        target: f64,
        scale: f64,
    },
    /// Distance of `p[index]` outside `[lower, upper]`, times `scale`.
    Interval {
        index: usize,
        lower: f64,
        upper: f64,
        scale: f64,
    },
}

impl FactorKind {
    pub fn residual_dim(&self) -> usize {
        match self {
            FactorKind::Reprojection { .. } => 3,
            FactorKind::TargetValue { .. } => 1,
            FactorKind::Interval { .. } => 1,
        }
    }
}

/// Parameter block definition in the IR.
#[derive(Debug, Clone)]
pub struct ParamBlock {
    pub id: ParamId,
    pub name: String,
    pub dim: usize,
    pub fixed: FixedMask,
}

/// Residual block definition in the IR.
///
/// The order of `params` must match the factor's expected parameter order.
#[derive(Debug, Clone)]
pub struct ResidualBlock {
    pub params: Vec<ParamId>,
    pub loss: RobustLoss,
    pub factor: FactorKind,
    pub family: ResidualFamily,
    pub residual_dim: usize,
}

impl ResidualBlock {
    pub fn new(params: Vec<ParamId>, factor: FactorKind, family: ResidualFamily, loss: RobustLoss) -> Self {
        Self {
            params,
            loss,
            residual_dim: factor.residual_dim(),
            factor,
            family,
        }
    }
}

/// Backend-agnostic optimization problem representation.
#[derive(Debug, Clone)]
pub struct ProblemIR {
    pub params: Vec<ParamBlock>,
    pub residuals: Vec<ResidualBlock>,
    /// Camera model shared by every reprojection block.
    pub intrinsics: Arc<Intrinsics>,
}

impl ProblemIR {
    pub fn new(intrinsics: Arc<Intrinsics>) -> Self {
        Self {
            params: Vec::new(),
            residuals: Vec::new(),
            intrinsics,
        }
    }

    /// Adds a parameter block and returns its `ParamId`.
    pub fn add_param_block(&mut self, name: impl Into<String>, dim: usize, fixed: FixedMask) -> ParamId {
        let id = ParamId(self.params.len());
        self.params.push(ParamBlock {
            id,
            name: name.into(),
            dim,
            fixed,
        });
        id
    }

    pub fn add_residual_block(&mut self, residual: ResidualBlock) {
        self.residuals.push(residual);
    }

    pub fn param_by_name(&self, name: &str) -> Option<ParamId> {
        self.params.iter().find(|p| p.name == name).map(|p| p.id)
    }

    pub fn residuals_in(&self, family: ResidualFamily) -> impl Iterator<Item = &ResidualBlock> {
        self.residuals.iter().filter(move |r| r.family == family)
    }

    /// Validates internal consistency and factor expectations.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for (idx, param) in self.params.iter().enumerate() {
            ensure!(
                param.id.0 == idx,
                "param id mismatch: expected {}, got {:?}",
                idx,
                param.id
            );
            ensure!(param.dim > 0, "param {} has zero dimension", param.name);
            ensure!(names.insert(param.name.as_str()), "duplicate param name {}", param.name);
            for fixed_idx in param.fixed.iter() {
                ensure!(
                    fixed_idx < param.dim,
                    "param {} fixed index {} out of range",
                    param.name,
                    fixed_idx
                );
            }
        }

        for (r_idx, residual) in self.residuals.iter().enumerate() {
            ensure!(
                residual.residual_dim == residual.factor.residual_dim(),
                "residual {} dim {} does not match factor expectation {}",
                r_idx,
                residual.residual_dim,
                residual.factor.residual_dim()
            );
            for param in &residual.params {
                ensure!(
                    param.0 < self.params.len(),
                    "residual {} references missing param {:?}",
                    r_idx,
                    param
                );
            }
            match residual.loss {
                RobustLoss::None => {}
                RobustLoss::Huber { scale } | RobustLoss::Cauchy { scale } => {
                    ensure!(
                        scale.is_finite() && scale > 0.0,
                        "residual {} robust loss scale must be positive, got {}",
                        r_idx,
                        scale
                    );
                }
            }

            match &residual.factor {
                FactorKind::Reprojection { observation } => {
                    ensure!(
                        residual.params.len() == 5,
                        "reprojection factor requires 5 params [translation, rotation, lambda, mu, weight]"
                    );
                    let dims: Vec<usize> = residual.params.iter().map(|p| self.params[p.0].dim).collect();
                    ensure!(
                        dims == [3, 3, 1, 1, 1],
                        "reprojection factor expects dims [3, 3, 1, 1, 1], got {:?}",
                        dims
                    );
                    ensure!(
                        observation.expected_pixel.iter().all(|v| v.is_finite()),
                        "residual {} has a non-finite expected pixel",
                        r_idx
                    );
                }
                FactorKind::TargetValue { index, target, scale } => {
                    ensure!(residual.params.len() == 1, "target value factor requires 1 param");
                    let block = &self.params[residual.params[0].0];
                    ensure!(
                        *index < block.dim,
                        "target value index {} out of range for {}",
                        index,
                        block.name
                    );
                    ensure!(target.is_finite(), "target value for {} is not finite", block.name);
                    ensure!(
                        scale.is_finite() && *scale >= 0.0,
                        "target value scale for {} must be finite and non-negative, got {}",
                        block.name,
                        scale
                    );
                }
                FactorKind::Interval {
                    index,
                    lower,
                    upper,
                    scale,
                } => {
                    ensure!(residual.params.len() == 1, "interval factor requires 1 param");
                    let block = &self.params[residual.params[0].0];
                    ensure!(
                        *index < block.dim,
                        "interval index {} out of range for {}",
                        index,
                        block.name
                    );
                    ensure!(
                        lower <= upper,
                        "interval for {} has lower {} > upper {}",
                        block.name,
                        lower,
                        upper
                    );
                    ensure!(
                        scale.is_finite() && *scale >= 0.0,
                        "interval scale for {} must be finite and non-negative, got {}",
                        block.name,
                        scale
                    );
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roadcam_core::{synthetic, LandmarkId};

    fn ir() -> ProblemIR {
        ProblemIR::new(Arc::new(synthetic::traffic_intrinsics().unwrap()))
    }

    fn observation() -> LandmarkObservation {
        LandmarkObservation {
            landmark: LandmarkId(0),
            origin: [0.0, 0.0, 5.0],
            axis_a: [0.0; 3],
            axis_b: [0.0; 3],
            expected_pixel: [960.0, 600.0],
            max_lambda: 0.0,
        }
    }

    #[test]
    fn valid_problem_passes() {
        let mut ir = ir();
        let t = ir.add_param_block("translation", 3, FixedMask::all_free());
        let r = ir.add_param_block("rotation", 3, FixedMask::all_free());
        let l = ir.add_param_block("lambda/0", 1, FixedMask::all_fixed(1));
        let m = ir.add_param_block("mu/0", 1, FixedMask::all_fixed(1));
        let w = ir.add_param_block("weight/0", 1, FixedMask::all_fixed(1));
        ir.add_residual_block(ResidualBlock::new(
            vec![t, r, l, m, w],
            FactorKind::Reprojection {
                observation: observation(),
            },
            ResidualFamily::Correspondence,
            RobustLoss::Huber { scale: 10.0 },
        ));
        ir.add_residual_block(ResidualBlock::new(
            vec![r],
            FactorKind::Interval {
                index: 2,
                lower: -30.0,
                upper: 30.0,
                scale: 50.0,
            },
            ResidualFamily::Rotation,
            RobustLoss::None,
        ));
        ir.validate().unwrap();
        assert_eq!(ir.param_by_name("mu/0"), Some(m));
        assert_eq!(ir.residuals_in(ResidualFamily::Rotation).count(), 1);
    }

    #[test]
    fn wrong_layout_is_rejected() {
        let mut ir = ir();
        let t = ir.add_param_block("translation", 3, FixedMask::all_free());
        ir.add_residual_block(ResidualBlock::new(
            vec![t],
            FactorKind::Reprojection {
                observation: observation(),
            },
            ResidualFamily::Correspondence,
            RobustLoss::None,
        ));
        assert!(ir.validate().is_err());
    }

    #[test]
    fn bad_interval_and_duplicate_names_are_rejected() {
        let mut ir = ir();
        let r = ir.add_param_block("rotation", 3, FixedMask::all_free());
        ir.add_residual_block(ResidualBlock::new(
            vec![r],
            FactorKind::Interval {
                index: 3,
                lower: 0.0,
                upper: 1.0,
                scale: 1.0,
            },
            ResidualFamily::Rotation,
            RobustLoss::None,
        ));
        assert!(ir.validate().is_err());

        let mut dup = self::ir();
        dup.add_param_block("rotation", 3, FixedMask::all_free());
        dup.add_param_block("rotation", 3, FixedMask::all_free());
        assert!(dup.validate().is_err());
    }
}
