use nalgebra::{RealField, Vector2, Vector3, Vector4};
use serde::{Deserialize, Serialize};

use super::Intrinsics;
use crate::math::{euler_rotation, lit};
use crate::Vec3;

/// Homogeneous `w` at or below this value marks a point behind the camera.
pub const BEHIND_CAMERA_EPSILON: f64 = 1e-9;

/// Output of [`render`]: a pixel and whether the point lies behind the camera.
///
/// A pixel flagged `behind_camera` is still finite but geometrically
/// meaningless; callers decide how to penalize it.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered<T> {
    pub pixel: Vector2<T>,
    pub behind_camera: bool,
}

/// Camera position in world space and Euler angles (degrees) of its camera-to-world rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub translation: Vec3,
    pub rotation: Vec3,
}

impl CameraPose {
    pub fn new(translation: Vec3, rotation: Vec3) -> Self {
        Self { translation, rotation }
    }

    pub fn render(&self, intrinsics: &Intrinsics, point_world: &Vec3) -> Rendered<f64> {
        render(&self.translation, &self.rotation, intrinsics, point_world)
    }

    pub fn is_finite(&self) -> bool {
        self.translation.iter().chain(self.rotation.iter()).all(|v| v.is_finite())
    }
}

/// Move a world point into camera space: `p_c = Rᵀ (p_w - t)`.
pub fn world_to_camera<T: RealField>(
    translation: &Vector3<T>,
    rotation_deg: &Vector3<T>,
    point_world: &Vector3<T>,
) -> Vector3<T> {
    euler_rotation(rotation_deg).transpose() * (point_world - translation)
}

/// Render a world point to a pixel for a camera pose.
///
/// `translation` is the camera position in world space and `rotation_deg` the
/// Euler angles of the camera-to-world rotation. Generic over the scalar so the
/// same mapping serves plain evaluation, overlays and autodiff residuals.
pub fn render<T: RealField>(
    translation: &Vector3<T>,
    rotation_deg: &Vector3<T>,
    intrinsics: &Intrinsics,
    point_world: &Vector3<T>,
) -> Rendered<T> {
    let pc = world_to_camera(translation, rotation_deg, point_world);
    let homogeneous = Vector4::new(pc.x.clone(), pc.y.clone(), pc.z.clone(), T::one());

    let projection = intrinsics.perspective().projection().map(lit::<T>);
    let clip = projection * homogeneous;

    let eps = lit::<T>(BEHIND_CAMERA_EPSILON);
    let w = clip.w.clone();
    let behind_camera = w <= eps;

    // Sign-preserving clamp so the divide stays finite at the camera plane.
    let w = if w.clone().abs() < eps {
        if w >= T::zero() {
            eps
        } else {
            -eps
        }
    } else {
        w
    };

    let ndc_x = clip.x.clone() / w.clone();
    let ndc_y = clip.y.clone() / w;

    let size = intrinsics.image_size();
    let half = lit::<T>(0.5);
    let u = (ndc_x + T::one()) * half.clone() * lit::<T>(size.x);
    let v = (T::one() - ndc_y) * half * lit::<T>(size.y);

    Rendered {
        pixel: Vector2::new(u, v),
        behind_camera,
    }
}
