use roadcam_core::LandmarkId;
use serde::{Deserialize, Serialize};

use crate::ir::{Evaluation, ResidualFamily};

/// Sum of squared residuals per residual family, before robust losses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Losses {
    pub correspondence: f64,
    pub weight: f64,
    pub lambda: f64,
    pub rotation: f64,
    pub total: f64,
}

impl Losses {
    pub fn from_evaluation(evaluation: &Evaluation) -> Self {
        let correspondence = evaluation.family_loss(ResidualFamily::Correspondence);
        let weight = evaluation.family_loss(ResidualFamily::Weight);
        let lambda = evaluation.family_loss(ResidualFamily::Lambda);
        let rotation = evaluation.family_loss(ResidualFamily::Rotation);
        Self {
            correspondence,
            weight,
            lambda,
            rotation,
            total: correspondence + weight + lambda + rotation,
        }
    }

    pub fn family(&self, family: ResidualFamily) -> f64 {
        match family {
            ResidualFamily::Correspondence => self.correspondence,
            ResidualFamily::Weight => self.weight,
            ResidualFamily::Lambda => self.lambda,
            ResidualFamily::Rotation => self.rotation,
        }
    }
}

impl std::fmt::Display for Losses {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "correspondences {:.6}, weights {:.6}, lambdas {:.6}, rotations {:.6}, total {:.6}",
            self.correspondence, self.weight, self.lambda, self.rotation, self.total
        )
    }
}

/// Reprojection diagnostics of one observed landmark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandmarkDiagnostics {
    pub landmark: LandmarkId,
    /// Unweighted pixel distance between observation and rendering.
    pub pixel_error: f64,
    pub behind_camera: bool,
}

pub(crate) fn landmark_diagnostics(evaluation: &Evaluation) -> Vec<LandmarkDiagnostics> {
    evaluation
        .blocks
        .iter()
        .filter_map(|b| {
            Some(LandmarkDiagnostics {
                landmark: b.landmark?,
                pixel_error: b.pixel_error?,
                behind_camera: b.behind_camera,
            })
        })
        .collect()
}
