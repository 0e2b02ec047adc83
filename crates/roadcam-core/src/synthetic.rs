//! Deterministic synthetic scenes for tests and demos.
//!
//! Expected pixels are rendered from a known ground-truth pose, so an
//! estimator fed with these groups should recover that pose exactly.

use anyhow::{ensure, Result};

use crate::{CameraPose, Intrinsics, IntrinsicsParams, LandmarkGroup, ParametricLandmark, Real, Vec3};

/// 32 mm sensor, 20 mm lens, 1920x1200 image, planes at 1 m and 1000 m.
pub fn traffic_intrinsics() -> Result<Intrinsics> {
    Ok(Intrinsics::from_params(IntrinsicsParams {
        sensor_width: 32.0,
        aspect_ratio: 1920.0 / 1200.0,
        focal_length: 20.0,
        near: 1.0,
        far: 1000.0,
        image_width: 1920.0,
        image_height: 1200.0,
    })?)
}

/// Camera 10 m behind the origin at 5 m height, looking horizontally along +Y.
pub fn traffic_pose() -> CameraPose {
    CameraPose::new(Vec3::new(0.0, -10.0, 5.0), Vec3::new(90.0, 0.0, 0.0))
}

/// Set every landmark's expected pixel by rendering it through `pose`.
///
/// Fails if a landmark lies behind the camera.
pub fn observe_group(group: &mut LandmarkGroup, pose: &CameraPose, intrinsics: &Intrinsics) -> Result<()> {
    for (i, point) in group.points.iter_mut().enumerate() {
        let rendered = pose.render(intrinsics, &point.position());
        ensure!(
            !rendered.behind_camera,
            "landmark {} of group '{}' is behind the camera",
            i,
            group.id
        );
        point.set_expected_pixel(rendered.pixel);
    }
    Ok(())
}

/// A single group with fixed points, each observed from `pose`.
pub fn observed_points(id: &str, positions: &[Vec3], pose: &CameraPose, intrinsics: &Intrinsics) -> Result<LandmarkGroup> {
    let mut group = LandmarkGroup::new(id);
    for p in positions {
        group.add(ParametricLandmark::on_point(*p));
    }
    observe_group(&mut group, pose, intrinsics)?;
    Ok(group)
}

/// Poles on both sides of a straight road plus lane-marking points.
///
/// Poles stand at `x = ±road_half_width`, every `spacing` meters starting
/// 20 m ahead of the world origin. Each pole contributes its base as a fixed
/// point and its top as a point sliding along the pole (`lambda = height`).
pub fn pole_scene(
    pose: &CameraPose,
    intrinsics: &Intrinsics,
    poles_per_side: usize,
    spacing: Real,
    pole_height: Real,
    road_half_width: Real,
) -> Result<Vec<LandmarkGroup>> {
    let mut groups = Vec::with_capacity(2 * poles_per_side + 1);
    for i in 0..poles_per_side {
        let y = 20.0 + i as Real * spacing;
        for (side, x) in [("left", -road_half_width), ("right", road_half_width)] {
            let base = Vec3::new(x, y, 0.0);
            let mut group = LandmarkGroup::new(format!("pole-{side}-{i}"))
                .with_height(pole_height)
                .with_radius(0.15)
                .with_point(ParametricLandmark::on_point(base))
                .with_point(ParametricLandmark::on_cylinder(base, Vec3::z(), Vec3::x(), pole_height, 0.0));
            observe_group(&mut group, pose, intrinsics)?;
            groups.push(group);
        }
    }

    let mut lane = LandmarkGroup::new("lane-center");
    for i in 0..poles_per_side {
        let y = 25.0 + i as Real * spacing;
        lane.add(ParametricLandmark::on_line(Vec3::new(0.0, y, 0.0), Vec3::y(), 0.0));
    }
    if !lane.is_empty() {
        observe_group(&mut lane, pose, intrinsics)?;
        groups.push(lane);
    }
    Ok(groups)
}
