//! Core geometry for estimating the pose of a fixed traffic camera.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Vec3`, ...) and Euler helpers,
//! - the pinhole camera model with a bounded view frustum ([`Perspective`],
//!   [`Intrinsics`], [`render`]),
//! - parametric landmarks and their groups ([`ParametricLandmark`],
//!   [`LandmarkGroup`], [`LandmarkStore`]),
//! - deterministic synthetic scene helpers used by tests and examples.
//!
//! Rendering pipeline:
//! `pixel = viewport ∘ (normalization · frustum) ∘ world_to_camera(point)`

/// Pinhole camera model, frustum construction and world-to-pixel rendering.
pub mod camera;
/// Parametric landmarks, landmark groups and the landmark arena.
pub mod landmarks;
/// Linear algebra type aliases and helpers.
pub mod math;
/// Deterministic synthetic scenes.
pub mod synthetic;

pub use camera::*;
pub use landmarks::*;
pub use math::*;
