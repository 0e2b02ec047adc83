//! Pinhole camera model with a bounded view frustum.
//!
//! [`Perspective`] owns the sensor geometry and the cached
//! `projection = normalization · frustum` matrix. [`Intrinsics`] adds the image
//! size, and [`render`] maps a world point through a camera pose to a pixel.

mod intrinsics;
mod perspective;
mod render;

pub use intrinsics::*;
pub use perspective::*;
pub use render::*;

use thiserror::Error;

/// Errors raised when building or mutating the camera model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CameraError {
    /// Sensor width, aspect ratio and focal length must be positive and finite.
    #[error("invalid sensor geometry: width {sensor_width}, aspect {aspect_ratio}, focal {focal_length}")]
    InvalidSensor {
        sensor_width: f64,
        aspect_ratio: f64,
        focal_length: f64,
    },
    /// Frustum planes must satisfy `0 < near < far`.
    #[error("invalid frustum planes: near {near}, far {far}")]
    InvalidPlanes { near: f64, far: f64 },
    /// Image dimensions must be positive and finite.
    #[error("invalid image size {width}x{height}")]
    InvalidImageSize { width: f64, height: f64 },
}
