//! Geometric initial guesses.

use roadcam_core::{look_at_rotation, CameraPose, Vec3};

use super::EstimatorConfig;

/// Rotation of a horizontal camera looking along world +Y.
pub const LOOK_ALONG_Y: [f64; 3] = [90.0, 0.0, 0.0];

/// Rotation that aims a camera at `translation` toward `target`.
///
/// Falls back to `fallback` when both points coincide.
pub fn aim_at(translation: &Vec3, target: &Vec3, fallback: &Vec3) -> Vec3 {
    look_at_rotation(translation, target).unwrap_or(*fallback)
}

/// Translation guess: behind the landmark mean along world -Y, raised above it.
pub fn heuristic_translation(mean: &Vec3, config: &EstimatorConfig) -> Vec3 {
    mean + Vec3::new(
        0.0,
        -config.initial_distance_from_mean,
        config.initial_height_above_mean,
    )
}

/// Combine optional user guesses with the geometric heuristic.
///
/// A missing translation is placed by [`heuristic_translation`]; a missing
/// rotation aims the camera at the landmark mean.
pub fn initial_guess(
    mean: &Vec3,
    translation: Option<Vec3>,
    rotation: Option<Vec3>,
    config: &EstimatorConfig,
) -> CameraPose {
    let translation = translation.unwrap_or_else(|| heuristic_translation(mean, config));
    let rotation = rotation.unwrap_or_else(|| aim_at(&translation, mean, &Vec3::from(LOOK_ALONG_Y)));
    CameraPose::new(translation, rotation)
}
