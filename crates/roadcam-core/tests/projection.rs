//! Integration tests for the camera projection model.
//!
//! Covers:
//! 1. Behind-camera detection for depths in front of and behind the camera
//! 2. Consistency between `render` and the equivalent pinhole matrix
//! 3. Mutating intrinsics changes rendered pixels

use roadcam_core::{
    look_at_rotation, render, synthetic, world_to_camera, CameraPose, Vec2, Vec3, Vec4,
};

#[test]
fn depth_sign_decides_behind_camera_flag() {
    let intrinsics = synthetic::traffic_intrinsics().unwrap();
    let pose = synthetic::traffic_pose();
    let near = intrinsics.perspective().near();

    // Camera looks along world +Y, so depth equals the Y offset.
    for depth in [near + 0.01, 3.0, 80.0, 900.0] {
        let p = pose.translation + Vec3::new(0.5, depth, -0.3);
        assert!(!pose.render(&intrinsics, &p).behind_camera, "depth {depth}");
    }
    for depth in [-0.5, -3.0, -80.0] {
        let p = pose.translation + Vec3::new(0.5, depth, -0.3);
        assert!(pose.render(&intrinsics, &p).behind_camera, "depth {depth}");
    }
}

#[test]
fn look_at_pose_centers_target() {
    let intrinsics = synthetic::traffic_intrinsics().unwrap();
    let eye = Vec3::new(12.0, -35.0, 9.0);
    let target = Vec3::new(-3.0, 40.0, 1.0);
    let rotation = look_at_rotation(&eye, &target).unwrap();

    let rendered = render(&eye, &rotation, &intrinsics, &target);
    assert!(!rendered.behind_camera);
    assert!(
        (rendered.pixel - intrinsics.image_center()).norm() < 1e-6,
        "target rendered at {:?}",
        rendered.pixel
    );
}

#[test]
fn pinhole_matrix_matches_render_across_scene() {
    let intrinsics = synthetic::traffic_intrinsics().unwrap();
    let pose = CameraPose::new(Vec3::new(-2.0, -25.0, 7.5), Vec3::new(84.0, -2.0, 6.0));
    let k = intrinsics.pinhole_matrix();

    for x in [-6.0, 0.0, 6.0] {
        for y in [10.0, 40.0, 120.0] {
            let p = Vec3::new(x, y, 0.0);
            let rendered = pose.render(&intrinsics, &p);
            let pc = world_to_camera(&pose.translation, &pose.rotation, &p);
            let h = k * Vec4::new(pc.x, -pc.y, -pc.z, 1.0);
            let pixel = Vec2::new(h.x / h.z, h.y / h.z);
            assert!((pixel - rendered.pixel).norm() < 1e-6, "point {p:?}");
        }
    }
}

#[test]
fn longer_focal_length_zooms_in() {
    let mut intrinsics = synthetic::traffic_intrinsics().unwrap();
    let pose = synthetic::traffic_pose();
    let p = Vec3::new(-4.0, 15.0, 3.0);
    let before = pose.render(&intrinsics, &p).pixel - intrinsics.image_center();

    intrinsics
        .perspective_mut()
        .set_field_of_view(32.0, 1.6, 40.0)
        .unwrap();
    let after = pose.render(&intrinsics, &p).pixel - intrinsics.image_center();
    assert!((after - before * 2.0).norm() < 1e-9, "{before:?} -> {after:?}");
}
