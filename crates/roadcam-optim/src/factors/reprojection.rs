//! Reprojection residual for parametric landmarks.

use nalgebra::{RealField, SVector, Vector3};
use roadcam_core::{lit, render, Intrinsics, LandmarkId, Real, Vec3};

use super::scalar::interval_excess;

/// Constants of one observed landmark captured in a residual block.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkObservation {
    pub landmark: LandmarkId,
    pub origin: [f64; 3],
    pub axis_a: [f64; 3],
    pub axis_b: [f64; 3],
    pub expected_pixel: [f64; 2],
    /// Upper bound for `lambda`; `0` disables the bound penalty.
    pub max_lambda: f64,
}

/// Residual vector and the behind-camera flag of the rendered landmark.
#[derive(Debug, Clone, PartialEq)]
pub struct ReprojectionOutput<T> {
    /// `[du * weight, dv * weight, lambda excess]`.
    pub residual: SVector<T, 3>,
    pub behind_camera: bool,
}

/// Evaluate the reprojection residual with plain floats.
pub fn reprojection_residual(
    translation: &Vec3,
    rotation_deg: &Vec3,
    lambda: Real,
    mu: Real,
    weight: Real,
    observation: &LandmarkObservation,
    intrinsics: &Intrinsics,
) -> ReprojectionOutput<Real> {
    reprojection_residual_generic(
        translation,
        rotation_deg,
        lambda,
        mu,
        weight,
        observation,
        intrinsics,
    )
}

/// Generic reprojection residual used by solver backends.
///
/// The landmark position is `origin + lambda * axis_a + mu * axis_b`. The first
/// two components are `expected - rendered` scaled by `weight`; the third is the
/// distance `lambda` lies outside `[0, max_lambda]` (zero when `max_lambda` is
/// not positive). A point behind the camera still yields finite residuals.
pub(crate) fn reprojection_residual_generic<T: RealField>(
    translation: &Vector3<T>,
    rotation_deg: &Vector3<T>,
    lambda: T,
    mu: T,
    weight: T,
    observation: &LandmarkObservation,
    intrinsics: &Intrinsics,
) -> ReprojectionOutput<T> {
    let vec = |v: [f64; 3]| Vector3::new(lit::<T>(v[0]), lit::<T>(v[1]), lit::<T>(v[2]));
    let point = vec(observation.origin)
        + vec(observation.axis_a) * lambda.clone()
        + vec(observation.axis_b) * mu;

    let rendered = render(translation, rotation_deg, intrinsics, &point);

    let du = (lit::<T>(observation.expected_pixel[0]) - rendered.pixel.x.clone()) * weight.clone();
    let dv = (lit::<T>(observation.expected_pixel[1]) - rendered.pixel.y.clone()) * weight;
    let excess = if observation.max_lambda > 0.0 {
        interval_excess(lambda, 0.0, observation.max_lambda)
    } else {
        T::zero()
    };

    ReprojectionOutput {
        residual: SVector::<T, 3>::new(du, dv, excess),
        behind_camera: rendered.behind_camera,
    }
}
