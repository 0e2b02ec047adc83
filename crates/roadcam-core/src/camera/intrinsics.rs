use serde::{Deserialize, Serialize};

use super::{CameraError, Perspective};
use crate::{Mat34, Real, Vec2};

/// Fixed camera intrinsics: the perspective model plus the image size in pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "IntrinsicsParams", into = "IntrinsicsParams")]
pub struct Intrinsics {
    perspective: Perspective,
    image_width: Real,
    image_height: Real,
}

/// Serialized form of [`Intrinsics`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicsParams {
    pub sensor_width: Real,
    pub aspect_ratio: Real,
    pub focal_length: Real,
    #[serde(default = "default_near")]
    pub near: Real,
    #[serde(default = "default_far")]
    pub far: Real,
    pub image_width: Real,
    pub image_height: Real,
}

fn default_near() -> Real {
    Perspective::DEFAULT_NEAR
}

fn default_far() -> Real {
    Perspective::DEFAULT_FAR
}

impl Intrinsics {
    pub fn new(perspective: Perspective, image_width: Real, image_height: Real) -> Result<Self, CameraError> {
        if !(image_width.is_finite() && image_height.is_finite() && image_width > 0.0 && image_height > 0.0) {
            return Err(CameraError::InvalidImageSize {
                width: image_width,
                height: image_height,
            });
        }
        Ok(Self {
            perspective,
            image_width,
            image_height,
        })
    }

    pub fn from_params(params: IntrinsicsParams) -> Result<Self, CameraError> {
        let perspective = Perspective::new(
            params.sensor_width,
            params.aspect_ratio,
            params.focal_length,
            params.near,
            params.far,
        )?;
        Self::new(perspective, params.image_width, params.image_height)
    }

    pub fn params(&self) -> IntrinsicsParams {
        IntrinsicsParams {
            sensor_width: self.perspective.sensor_width(),
            aspect_ratio: self.perspective.aspect_ratio(),
            focal_length: self.perspective.focal_length(),
            near: self.perspective.near(),
            far: self.perspective.far(),
            image_width: self.image_width,
            image_height: self.image_height,
        }
    }

    pub fn perspective(&self) -> &Perspective {
        &self.perspective
    }

    /// Mutable access for updating the field of view or the frustum planes.
    pub fn perspective_mut(&mut self) -> &mut Perspective {
        &mut self.perspective
    }

    pub fn image_size(&self) -> Vec2 {
        Vec2::new(self.image_width, self.image_height)
    }

    pub fn image_center(&self) -> Vec2 {
        self.image_size() * 0.5
    }

    /// Equivalent 3x4 pinhole matrix `[[fx, 0, cx, 0], [0, fy, cy, 0], [0, 0, 1, 0]]`.
    ///
    /// It acts on camera points in the OpenCV frame, `(x, -y, -z)` in terms of
    /// this crate's camera space (which looks down -Z with +Y up).
    pub fn pinhole_matrix(&self) -> Mat34 {
        let p = &self.perspective;
        let fx = self.image_width * p.focal_length() / p.sensor_width();
        let fy = self.image_height * p.focal_length() * p.aspect_ratio() / p.sensor_width();
        let c = self.image_center();
        #[rustfmt::skip]
        let k = Mat34::new(
            fx,  0.0, c.x, 0.0,
            0.0, fy,  c.y, 0.0,
            0.0, 0.0, 1.0, 0.0,
        );
        k
    }
}

impl TryFrom<IntrinsicsParams> for Intrinsics {
    type Error = CameraError;

    fn try_from(params: IntrinsicsParams) -> Result<Self, Self::Error> {
        Self::from_params(params)
    }
}

impl From<Intrinsics> for IntrinsicsParams {
    fn from(intrinsics: Intrinsics) -> Self {
        intrinsics.params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> IntrinsicsParams {
        IntrinsicsParams {
            sensor_width: 32.0,
            aspect_ratio: 1.6,
            focal_length: 20.0,
            near: 1.0,
            far: 1000.0,
            image_width: 1920.0,
            image_height: 1200.0,
        }
    }

    #[test]
    fn deserialization_validates() {
        let json = r#"{"sensor_width":32.0,"aspect_ratio":1.6,"focal_length":20.0,
            "image_width":1920.0,"image_height":1200.0}"#;
        let intrinsics: Intrinsics = serde_json::from_str(json).unwrap();
        assert_eq!(intrinsics.perspective().near(), Perspective::DEFAULT_NEAR);
        assert_eq!(intrinsics.perspective().far(), Perspective::DEFAULT_FAR);

        let bad = r#"{"sensor_width":32.0,"aspect_ratio":1.6,"focal_length":20.0,
            "near":5.0,"far":2.0,"image_width":1920.0,"image_height":1200.0}"#;
        assert!(serde_json::from_str::<Intrinsics>(bad).is_err());
    }

    #[test]
    fn params_survive_serialization() {
        let intrinsics = Intrinsics::from_params(params()).unwrap();
        let json = serde_json::to_string(&intrinsics).unwrap();
        let back: Intrinsics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.params(), params());
    }

    #[test]
    fn image_size_must_be_positive() {
        let perspective = Perspective::with_default_planes(32.0, 1.6, 20.0).unwrap();
        assert!(Intrinsics::new(perspective.clone(), 0.0, 1200.0).is_err());
        assert!(Intrinsics::new(perspective, 1920.0, f64::INFINITY).is_err());
    }

    #[test]
    fn pinhole_focal_lengths() {
        let k = Intrinsics::from_params(params()).unwrap().pinhole_matrix();
        assert!((k[(0, 0)] - 1200.0).abs() < 1e-9);
        assert!((k[(1, 1)] - 1200.0).abs() < 1e-9);
        assert_eq!(k[(0, 2)], 960.0);
        assert_eq!(k[(1, 2)], 600.0);
    }
}
