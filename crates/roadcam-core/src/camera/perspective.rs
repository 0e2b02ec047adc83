use super::CameraError;
use crate::{Mat4, Real, Vec2, Vec4};

/// Perspective transformation from camera space to normalized device coordinates.
///
/// The frustum and normalization matrices are derived from the sensor geometry
/// and the near/far plane distances. Every mutator validates its input and then
/// rebuilds all derived quantities once.
#[derive(Debug, Clone, PartialEq)]
pub struct Perspective {
    sensor_width: Real,
    aspect_ratio: Real,
    focal_length: Real,
    near: Real,
    far: Real,

    /// Horizontal and vertical field of view in radians.
    field_of_view: Vec2,
    /// Width and height of the image plane at the near plane distance.
    image_plane_size: Vec2,
    frustum: Mat4,
    normalization: Mat4,
    projection: Mat4,
}

impl Perspective {
    /// Default near plane distance in meters.
    pub const DEFAULT_NEAR: Real = 1.0;
    /// Default far plane distance in meters.
    pub const DEFAULT_FAR: Real = 1000.0;

    /// Build a perspective from physical camera parameters.
    ///
    /// `sensor_width` and `focal_length` share a unit (typically mm); `near` and
    /// `far` are world distances.
    pub fn new(
        sensor_width: Real,
        aspect_ratio: Real,
        focal_length: Real,
        near: Real,
        far: Real,
    ) -> Result<Self, CameraError> {
        check_sensor(sensor_width, aspect_ratio, focal_length)?;
        check_planes(near, far)?;

        let mut perspective = Self {
            sensor_width,
            aspect_ratio,
            focal_length,
            near,
            far,
            field_of_view: Vec2::zeros(),
            image_plane_size: Vec2::zeros(),
            frustum: Mat4::identity(),
            normalization: Mat4::identity(),
            projection: Mat4::identity(),
        };
        perspective.update_matrices();
        Ok(perspective)
    }

    /// Build a perspective with the default near/far planes.
    pub fn with_default_planes(
        sensor_width: Real,
        aspect_ratio: Real,
        focal_length: Real,
    ) -> Result<Self, CameraError> {
        Self::new(
            sensor_width,
            aspect_ratio,
            focal_length,
            Self::DEFAULT_NEAR,
            Self::DEFAULT_FAR,
        )
    }

    /// Replace the sensor geometry the field of view is derived from.
    pub fn set_field_of_view(
        &mut self,
        sensor_width: Real,
        aspect_ratio: Real,
        focal_length: Real,
    ) -> Result<(), CameraError> {
        check_sensor(sensor_width, aspect_ratio, focal_length)?;
        self.sensor_width = sensor_width;
        self.aspect_ratio = aspect_ratio;
        self.focal_length = focal_length;
        self.update_matrices();
        Ok(())
    }

    /// Replace both frustum plane distances.
    pub fn set_frustum_plane_distances(&mut self, near: Real, far: Real) -> Result<(), CameraError> {
        check_planes(near, far)?;
        self.near = near;
        self.far = far;
        self.update_matrices();
        Ok(())
    }

    /// Move the near plane and keep the far plane.
    pub fn set_near_plane_distance(&mut self, near: Real) -> Result<(), CameraError> {
        self.set_frustum_plane_distances(near, self.far)
    }

    fn update_matrices(&mut self) {
        let sensor_height = self.sensor_width / self.aspect_ratio;
        self.field_of_view = Vec2::new(
            2.0 * (self.sensor_width / (2.0 * self.focal_length)).atan(),
            2.0 * (sensor_height / (2.0 * self.focal_length)).atan(),
        );

        let (n, f) = (self.near, self.far);
        self.image_plane_size = Vec2::new(
            2.0 * n * (0.5 * self.field_of_view.x).tan(),
            2.0 * n * (0.5 * self.field_of_view.y).tan(),
        );

        #[rustfmt::skip]
        let frustum = Mat4::new(
            n,   0.0, 0.0,   0.0,
            0.0, n,   0.0,   0.0,
            0.0, 0.0, n + f, n * f,
            0.0, 0.0, -1.0,  0.0,
        );
        self.frustum = frustum;

        // Orthographic map of [-w/2, w/2] x [-h/2, h/2] x [-f, -n] onto [-1, 1]^3.
        let (w, h) = (self.image_plane_size.x, self.image_plane_size.y);
        #[rustfmt::skip]
        let normalization = Mat4::new(
            2.0 / w, 0.0,     0.0,              0.0,
            0.0,     2.0 / h, 0.0,              0.0,
            0.0,     0.0,     -2.0 / (f - n),   -(f + n) / (f - n),
            0.0,     0.0,     0.0,              1.0,
        );
        self.normalization = normalization;

        self.projection = self.normalization * self.frustum;
    }

    /// Transform a homogeneous camera-space point into the frustum, `w` normalized to 1.
    ///
    /// Returns `None` when the homogeneous `w` vanishes (point on the camera plane).
    pub fn to_frustum(&self, point_camera: &Vec4) -> Option<Vec4> {
        dehomogenize(self.frustum * point_camera)
    }

    /// Project a homogeneous camera-space point to normalized device coordinates.
    ///
    /// Returns `None` when the homogeneous `w` vanishes (point on the camera plane).
    pub fn to_device(&self, point_camera: &Vec4) -> Option<Vec4> {
        dehomogenize(self.projection * point_camera)
    }

    pub fn sensor_width(&self) -> Real {
        self.sensor_width
    }

    pub fn aspect_ratio(&self) -> Real {
        self.aspect_ratio
    }

    pub fn focal_length(&self) -> Real {
        self.focal_length
    }

    pub fn near(&self) -> Real {
        self.near
    }

    pub fn far(&self) -> Real {
        self.far
    }

    /// Horizontal and vertical field of view in radians.
    pub fn field_of_view(&self) -> Vec2 {
        self.field_of_view
    }

    /// Image plane size at the near plane.
    pub fn image_plane_size(&self) -> Vec2 {
        self.image_plane_size
    }

    pub fn frustum(&self) -> &Mat4 {
        &self.frustum
    }

    pub fn normalization(&self) -> &Mat4 {
        &self.normalization
    }

    /// The composed `normalization · frustum` matrix.
    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }
}

impl std::fmt::Display for Perspective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Perspective(fov = [{:.3}, {:.3}] deg, planes = [{}, {}], image plane = [{:.4}, {:.4}])",
            self.field_of_view.x.to_degrees(),
            self.field_of_view.y.to_degrees(),
            self.near,
            self.far,
            self.image_plane_size.x,
            self.image_plane_size.y
        )
    }
}

fn dehomogenize(v: Vec4) -> Option<Vec4> {
    if v.w.abs() <= Real::EPSILON {
        return None;
    }
    Some(v / v.w)
}

fn check_sensor(sensor_width: Real, aspect_ratio: Real, focal_length: Real) -> Result<(), CameraError> {
    let positive = |v: Real| v.is_finite() && v > 0.0;
    if positive(sensor_width) && positive(aspect_ratio) && positive(focal_length) {
        Ok(())
    } else {
        Err(CameraError::InvalidSensor {
            sensor_width,
            aspect_ratio,
            focal_length,
        })
    }
}

fn check_planes(near: Real, far: Real) -> Result<(), CameraError> {
    if near.is_finite() && far.is_finite() && near > 0.0 && near < far {
        Ok(())
    } else {
        Err(CameraError::InvalidPlanes { near, far })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_perspective() -> Perspective {
        Perspective::new(32.0, 1920.0 / 1200.0, 20.0, 1.0, 1000.0).unwrap()
    }

    #[test]
    fn field_of_view_follows_sensor_geometry() {
        let p = test_perspective();
        let expected_x = 2.0 * (32.0_f64 / 40.0).atan();
        let expected_y = 2.0 * (20.0_f64 / 40.0).atan();
        assert!((p.field_of_view().x - expected_x).abs() < 1e-12);
        assert!((p.field_of_view().y - expected_y).abs() < 1e-12);
        assert!((p.image_plane_size().x - 1.6).abs() < 1e-12);
        assert!((p.image_plane_size().y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn near_and_far_planes_map_to_device_depth_bounds() {
        let p = test_perspective();
        let near = p.to_device(&Vec4::new(0.0, 0.0, -1.0, 1.0)).unwrap();
        let far = p.to_device(&Vec4::new(0.0, 0.0, -1000.0, 1.0)).unwrap();
        assert!((near.z + 1.0).abs() < 1e-9, "near depth {}", near.z);
        assert!((far.z - 1.0).abs() < 1e-9, "far depth {}", far.z);
    }

    #[test]
    fn image_plane_corner_maps_to_device_corner() {
        let p = test_perspective();
        let corner = Vec4::new(0.8, 0.5, -1.0, 1.0);
        let ndc = p.to_device(&corner).unwrap();
        assert!((ndc.x - 1.0).abs() < 1e-12);
        assert!((ndc.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn frustum_keeps_lateral_position_on_near_plane() {
        let p = test_perspective();
        let v = p.to_frustum(&Vec4::new(0.3, -0.2, -1.0, 1.0)).unwrap();
        assert!((v.x - 0.3).abs() < 1e-12);
        assert!((v.y + 0.2).abs() < 1e-12);
    }

    #[test]
    fn projection_is_recomputed_by_mutators() {
        let mut p = test_perspective();
        let before = *p.projection();

        p.set_field_of_view(32.0, 1.6, 40.0).unwrap();
        assert_ne!(before, *p.projection());
        assert!((p.projection() - p.normalization() * p.frustum()).norm() < 1e-12);

        p.set_frustum_plane_distances(2.0, 500.0).unwrap();
        assert_eq!(p.near(), 2.0);
        assert_eq!(p.far(), 500.0);
        assert!((p.projection() - p.normalization() * p.frustum()).norm() < 1e-12);

        p.set_near_plane_distance(0.5).unwrap();
        assert_eq!(p.far(), 500.0);
    }

    #[test]
    fn invalid_parameters_are_rejected_and_state_kept() {
        let mut p = test_perspective();
        assert!(Perspective::new(0.0, 1.6, 20.0, 1.0, 10.0).is_err());
        assert!(Perspective::new(32.0, 1.6, 20.0, 10.0, 1.0).is_err());
        assert!(p.set_frustum_plane_distances(-1.0, 10.0).is_err());
        assert!(p.set_field_of_view(32.0, f64::NAN, 20.0).is_err());
        assert_eq!(p, test_perspective());
    }

    #[test]
    fn point_on_camera_plane_has_no_device_coordinates() {
        let p = test_perspective();
        assert!(p.to_device(&Vec4::new(1.0, 1.0, 0.0, 1.0)).is_none());
    }
}
