use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Real, Vec2, Vec3};

/// Reasons a landmark cannot take part in an estimation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LandmarkError {
    #[error("landmark has a non-finite {field}")]
    NonFinite { field: &'static str },
    /// `axis_b` spans a freedom although `axis_a` is zero.
    #[error("degenerate axes: axis_a is zero while axis_b is not")]
    DegenerateAxis,
}

/// A world point that may slide along one or two fixed axes.
///
/// The position is `origin + lambda * axis_a + mu * axis_b`. Axes are unit
/// length or exactly zero; a zero axis means the point has no freedom along it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LandmarkRecord", into = "LandmarkRecord")]
pub struct ParametricLandmark {
    origin: Vec3,
    axis_a: Vec3,
    axis_b: Vec3,
    lambda: Real,
    mu: Real,
    /// Reserved for an angular parametrization around `axis_a`.
    angle: Real,
    expected_pixel: Option<Vec2>,
}

impl ParametricLandmark {
    pub fn new(origin: Vec3, axis_a: Vec3, axis_b: Vec3, lambda: Real, mu: Real) -> Self {
        Self {
            origin,
            axis_a: stable_normalize(&axis_a),
            axis_b: stable_normalize(&axis_b),
            lambda,
            mu,
            angle: 0.0,
            expected_pixel: None,
        }
    }

    /// A point on a generalized cylinder: `axis_a` runs along the object
    /// (e.g. a pole), `axis_b` spans its cross-section.
    pub fn on_cylinder(origin: Vec3, axis_a: Vec3, axis_b: Vec3, lambda: Real, mu: Real) -> Self {
        Self::new(origin, axis_a, axis_b, lambda, mu)
    }

    /// A point on the line through `origin` with direction `heading`.
    pub fn on_line(origin: Vec3, heading: Vec3, lambda: Real) -> Self {
        Self::new(origin, heading, Vec3::zeros(), lambda, 0.0)
    }

    /// A fixed world point without any freedom.
    pub fn on_point(position: Vec3) -> Self {
        Self::new(position, Vec3::zeros(), Vec3::zeros(), 0.0, 0.0)
    }

    pub fn with_expected_pixel(mut self, pixel: Vec2) -> Self {
        self.expected_pixel = Some(pixel);
        self
    }

    pub fn with_angle(mut self, angle: Real) -> Self {
        self.angle = angle;
        self
    }

    pub fn set_expected_pixel(&mut self, pixel: Vec2) {
        self.expected_pixel = Some(pixel);
    }

    pub fn clear_expected_pixel(&mut self) {
        self.expected_pixel = None;
    }

    /// Current world position.
    pub fn position(&self) -> Vec3 {
        self.origin + self.axis_a * self.lambda + self.axis_b * self.mu
    }

    pub fn origin(&self) -> &Vec3 {
        &self.origin
    }

    pub fn axis_a(&self) -> &Vec3 {
        &self.axis_a
    }

    pub fn axis_b(&self) -> &Vec3 {
        &self.axis_b
    }

    pub fn lambda(&self) -> Real {
        self.lambda
    }

    pub fn mu(&self) -> Real {
        self.mu
    }

    pub fn angle(&self) -> Real {
        self.angle
    }

    pub fn expected_pixel(&self) -> Option<&Vec2> {
        self.expected_pixel.as_ref()
    }

    /// Whether the landmark takes part in reprojection as an observation.
    pub fn has_expected_pixel(&self) -> bool {
        self.expected_pixel.is_some()
    }

    pub fn is_free_along_a(&self) -> bool {
        self.axis_a != Vec3::zeros()
    }

    pub fn is_free_along_b(&self) -> bool {
        self.axis_b != Vec3::zeros()
    }

    /// Overwrite the free parameters, e.g. with solver output.
    pub fn set_parameters(&mut self, lambda: Real, mu: Real) {
        self.lambda = lambda;
        self.mu = mu;
    }

    pub fn validate(&self) -> Result<(), LandmarkError> {
        let finite = |v: &Vec3| v.iter().all(|x| x.is_finite());
        if !finite(&self.origin) {
            return Err(LandmarkError::NonFinite { field: "origin" });
        }
        if !finite(&self.axis_a) || !finite(&self.axis_b) {
            return Err(LandmarkError::NonFinite { field: "axis" });
        }
        if !self.lambda.is_finite() || !self.mu.is_finite() {
            return Err(LandmarkError::NonFinite { field: "parameter" });
        }
        if let Some(pixel) = &self.expected_pixel {
            if !pixel.iter().all(|x| x.is_finite()) {
                return Err(LandmarkError::NonFinite { field: "expected pixel" });
            }
        }
        if !self.is_free_along_a() && self.is_free_along_b() {
            return Err(LandmarkError::DegenerateAxis);
        }
        Ok(())
    }
}

/// Normalize, keeping an exactly-zero (or vanishing) vector at zero.
fn stable_normalize(v: &Vec3) -> Vec3 {
    if !v.iter().all(|x| x.is_finite()) {
        return *v;
    }
    let scale = v.amax();
    if scale == 0.0 {
        return Vec3::zeros();
    }
    let scaled = v / scale;
    scaled / scaled.norm()
}

fn zero_axis() -> Vec3 {
    Vec3::zeros()
}

/// Serialized form of [`ParametricLandmark`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandmarkRecord {
    pub origin: Vec3,
    #[serde(default = "zero_axis")]
    pub axis_a: Vec3,
    #[serde(default = "zero_axis")]
    pub axis_b: Vec3,
    #[serde(default)]
    pub lambda: Real,
    #[serde(default)]
    pub mu: Real,
    #[serde(default)]
    pub angle: Real,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_pixel: Option<Vec2>,
}

impl TryFrom<LandmarkRecord> for ParametricLandmark {
    type Error = LandmarkError;

    fn try_from(record: LandmarkRecord) -> Result<Self, Self::Error> {
        let mut landmark = Self::new(record.origin, record.axis_a, record.axis_b, record.lambda, record.mu)
            .with_angle(record.angle);
        landmark.expected_pixel = record.expected_pixel;
        landmark.validate()?;
        Ok(landmark)
    }
}

impl From<ParametricLandmark> for LandmarkRecord {
    fn from(landmark: ParametricLandmark) -> Self {
        Self {
            origin: landmark.origin,
            axis_a: landmark.axis_a,
            axis_b: landmark.axis_b,
            lambda: landmark.lambda,
            mu: landmark.mu,
            angle: landmark.angle,
            expected_pixel: landmark.expected_pixel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axes_are_normalized() {
        let p = ParametricLandmark::on_cylinder(
            Vec3::zeros(),
            Vec3::new(0.0, 0.0, 7.0),
            Vec3::new(3.0, 4.0, 0.0),
            1.0,
            0.5,
        );
        assert!((p.axis_a().norm() - 1.0).abs() < 1e-12);
        assert!((p.axis_b() - Vec3::new(0.6, 0.8, 0.0)).norm() < 1e-12);
        assert!((p.position() - Vec3::new(0.3, 0.4, 1.0)).norm() < 1e-12);
    }

    #[test]
    fn line_position_ignores_mu() {
        let mut p = ParametricLandmark::on_line(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 2.0, 0.0), 4.0);
        assert!(!p.is_free_along_b());
        for mu in [-100.0, 0.0, 3.5, 1e6] {
            p.set_parameters(4.0, mu);
            assert_eq!(p.position(), Vec3::new(1.0, 6.0, 3.0));
        }
    }

    #[test]
    fn tiny_axes_normalize_without_underflow() {
        let p = ParametricLandmark::on_line(Vec3::zeros(), Vec3::new(1e-200, 0.0, 0.0), 1.0);
        assert_eq!(*p.axis_a(), Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn fixed_point_has_no_freedom() {
        let p = ParametricLandmark::on_point(Vec3::new(-4.0, 15.0, 3.0)).with_expected_pixel(Vec2::new(10.0, 20.0));
        assert!(!p.is_free_along_a());
        assert!(!p.is_free_along_b());
        assert!(p.has_expected_pixel());
        assert_eq!(p.position(), Vec3::new(-4.0, 15.0, 3.0));
        assert!(p.validate().is_ok());
    }

    #[test]
    fn validation_rejects_bad_input() {
        let degenerate = ParametricLandmark::new(Vec3::zeros(), Vec3::zeros(), Vec3::x(), 0.0, 1.0);
        assert_eq!(degenerate.validate(), Err(LandmarkError::DegenerateAxis));

        let nan = ParametricLandmark::on_point(Vec3::new(f64::NAN, 0.0, 0.0));
        assert!(matches!(nan.validate(), Err(LandmarkError::NonFinite { .. })));

        let mut pixel = ParametricLandmark::on_point(Vec3::zeros());
        pixel.set_expected_pixel(Vec2::new(f64::INFINITY, 0.0));
        assert!(pixel.validate().is_err());
    }

    #[test]
    fn json_record_is_validated() {
        let json = r#"{"origin":[0.0,0.0,5.0],"axis_a":[0.0,0.0,2.0],"expected_pixel":[960.0,600.0]}"#;
        let p: ParametricLandmark = serde_json::from_str(json).unwrap();
        assert_eq!(*p.axis_a(), Vec3::z());
        assert_eq!(p.expected_pixel(), Some(&Vec2::new(960.0, 600.0)));

        let bad = r#"{"origin":[0.0,0.0,5.0],"axis_b":[1.0,0.0,0.0]}"#;
        assert!(serde_json::from_str::<ParametricLandmark>(bad).is_err());
    }
}
