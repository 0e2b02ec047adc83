//! Bounded retry policy and the validity predicate of a solve attempt.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::{FRAC_PI_2, PI};
use roadcam_core::{wrap_degrees, CameraPose, Vec3};

use super::guess::aim_at;
use super::{EstimationFailure, EstimatorConfig};
use crate::backend::Termination;
use crate::ir::Evaluation;

/// Produces the starting pose of every attempt.
///
/// - attempt 0: the base guess,
/// - attempt 1: the base translation, re-aimed at the landmark mean,
/// - attempts 2 to 5: the camera moved toward the mean along the base guess's
///   heading, at distances shrinking geometrically from the base distance to
///   twice the landmark spread, looking at the mean,
/// - later attempts: a camera at a random distance in that range, in the
///   mean-to-furthest-landmark direction turned by a random yaw, looking at a
///   random point between the mean and the furthest landmark.
///
/// Every perturbed camera keeps the base guess's elevation angle above the
/// mean, so a closer camera is also lower.
/// Number of attempts walking the camera toward the mean before random placement.
const DISTANCE_LEVELS: usize = 4;
/// Closest horizontal distance of a perturbed camera from the landmark mean.
const MIN_DISTANCE: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base: CameraPose,
    mean: Vec3,
    furthest: Vec3,
    fallback_distance: f64,
    max_tries: usize,
    rng: StdRng,
}

impl RetryPolicy {
    pub fn new(base: CameraPose, mean: Vec3, furthest: Vec3, config: &EstimatorConfig) -> Self {
        Self {
            base,
            mean,
            furthest,
            fallback_distance: config.initial_distance_from_mean,
            max_tries: config.max_tries_until_abort,
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    pub fn max_tries(&self) -> usize {
        self.max_tries
    }

    /// Starting pose for `attempt`, `None` once the budget is spent.
    pub fn guess(&mut self, attempt: usize) -> Option<CameraPose> {
        if attempt >= self.max_tries {
            return None;
        }
        let pose = match attempt {
            0 => self.base,
            1 => CameraPose::new(
                self.base.translation,
                aim_at(&self.base.translation, &self.mean, &self.base.rotation),
            ),
            _ => self.perturbed(attempt - 2),
        };
        Some(pose)
    }

    /// Horizontal distances `(near, far)` perturbed cameras are placed at.
    fn distance_range(&self) -> (f64, f64) {
        let mut far = (self.base.translation - self.mean).xy().norm();
        if far <= f64::EPSILON {
            far = self.fallback_distance;
        }
        let spread = (self.furthest - self.mean).norm();
        let near = (2.0 * spread).max(MIN_DISTANCE).min(far);
        (near, far)
    }

    fn perturbed(&mut self, index: usize) -> CameraPose {
        let offset = self.base.translation - self.mean;
        let (near, far) = self.distance_range();
        let elevation = offset.z / far;
        let heading_of = |v: nalgebra::Vector2<f64>, fallback: f64| {
            if v.norm() > f64::EPSILON {
                v.y.atan2(v.x)
            } else {
                fallback
            }
        };

        let (fraction, direction, target) = if index < DISTANCE_LEVELS {
            let fraction = (index + 1) as f64 / DISTANCE_LEVELS as f64;
            (fraction, heading_of(offset.xy(), -FRAC_PI_2), self.mean)
        } else {
            let fraction: f64 = self.rng.random_range(0.0..=1.0);
            let yaw = self.rng.random_range(-PI..PI);
            let s: f64 = self.rng.random_range(0.0..=1.0);
            let heading = heading_of((self.furthest - self.mean).xy(), -FRAC_PI_2);
            (fraction, heading + yaw, self.mean + (self.furthest - self.mean) * s)
        };
        let distance = far * (near / far).powf(fraction);

        let translation = self.mean
            + Vec3::new(
                distance * direction.cos(),
                distance * direction.sin(),
                elevation * distance,
            );
        let rotation = aim_at(&translation, &target, &self.base.rotation);
        CameraPose::new(translation, rotation)
    }
}

/// Largest per-axis rotation difference in degrees, compared modulo 360.
pub fn rotation_deviation(rotation: &Vec3, reference: &Vec3) -> f64 {
    (rotation - reference)
        .iter()
        .map(|d| wrap_degrees(*d).abs())
        .fold(0.0, f64::max)
}

/// Decide whether a solved pose is acceptable.
///
/// `guess` is the starting pose of the attempt that produced `pose` and
/// `termination` tells why the solver stopped. A solve that ran out of budget
/// or broke down numerically is rejected even when its pixel error looks fine.
pub fn check_attempt(
    pose: &CameraPose,
    guess: &CameraPose,
    termination: Termination,
    evaluation: &Evaluation,
    config: &EstimatorConfig,
) -> Result<(), EstimationFailure> {
    if !termination.is_converged() {
        return Err(EstimationFailure::NotConverged { termination });
    }
    if !pose.is_finite() || !evaluation.total_loss().is_finite() {
        return Err(EstimationFailure::NonFinite);
    }

    let behind = evaluation.behind_camera();
    if !behind.is_empty() {
        return Err(EstimationFailure::BehindCamera { count: behind.len() });
    }

    let rms = evaluation.rms_pixel_error().ok_or(EstimationFailure::NoObservations)?;
    if rms > config.max_rms_reprojection_error_px {
        return Err(EstimationFailure::ReprojectionError {
            rms,
            limit: config.max_rms_reprojection_error_px,
        });
    }

    let deviation = rotation_deviation(&pose.rotation, &guess.rotation);
    if deviation > config.max_rotation_deviation_deg {
        return Err(EstimationFailure::RotationDeviation {
            deviation,
            limit: config.max_rotation_deviation_deg,
        });
    }
    Ok(())
}
