use serde::{Deserialize, Serialize};

use super::ParametricLandmark;
use crate::{Real, Vec3};

/// A physical object (pole, sign, lane marking) made of parametric landmarks.
///
/// `height` bounds how far a landmark may slide along its first axis and
/// `radius` bounds the second; both are zero when unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkGroup {
    pub id: String,
    #[serde(default)]
    pub points: Vec<ParametricLandmark>,
    #[serde(default)]
    pub height: Real,
    #[serde(default)]
    pub radius: Real,
}

impl LandmarkGroup {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_height(mut self, height: Real) -> Self {
        self.height = height;
        self
    }

    pub fn with_radius(mut self, radius: Real) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_point(mut self, point: ParametricLandmark) -> Self {
        self.add(point);
        self
    }

    pub fn add(&mut self, point: ParametricLandmark) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// `1 / N` for `N` points so every group contributes equally, `0` when empty.
    ///
    /// Descriptive only. The pose estimator's per-group weights are separate
    /// solver parameters that start at 1 and scale the pixel residuals.
    pub fn weight(&self) -> Real {
        group_weight(self.points.len())
    }

    /// Mean of the current landmark positions, `None` for an empty group.
    pub fn mean(&self) -> Option<Vec3> {
        if self.points.is_empty() {
            return None;
        }
        let sum = self.points.iter().fold(Vec3::zeros(), |acc, p| acc + p.position());
        Some(sum / self.points.len() as Real)
    }

    pub fn observed_count(&self) -> usize {
        self.points.iter().filter(|p| p.has_expected_pixel()).count()
    }
}

pub(crate) fn group_weight(count: usize) -> Real {
    if count == 0 {
        0.0
    } else {
        1.0 / count as Real
    }
}
