use nalgebra::{
    Matrix3, Matrix3x4, Matrix4, Point3, RealField, Vector2, Vector3, Vector4,
};

pub type Real = f64;

pub type Vec2 = Vector2<Real>;
pub type Vec3 = Vector3<Real>;
pub type Vec4 = Vector4<Real>;
pub type Pt3 = Point3<Real>;
pub type Mat3 = Matrix3<Real>;
pub type Mat4 = Matrix4<Real>;
pub type Mat34 = Matrix3x4<Real>;

/// Lift an `f64` constant into a generic scalar (plain or dual).
#[inline]
pub fn lit<T: RealField>(value: f64) -> T {
    nalgebra::convert(value)
}

/// Rotation matrix for Euler angles given in degrees.
///
/// The angles `(α, β, γ)` rotate around the x, y and z axes and are composed as
/// `Rz(γ) · Ry(β) · Rx(α)`. The result maps camera space to world space.
pub fn euler_rotation<T: RealField>(rotation_deg: &Vector3<T>) -> Matrix3<T> {
    let to_rad = T::pi() / lit::<T>(180.0);
    let a = rotation_deg.x.clone() * to_rad.clone();
    let b = rotation_deg.y.clone() * to_rad.clone();
    let g = rotation_deg.z.clone() * to_rad;

    let (sa, ca) = (a.clone().sin(), a.cos());
    let (sb, cb) = (b.clone().sin(), b.cos());
    let (sg, cg) = (g.clone().sin(), g.cos());

    let zero = T::zero();
    let one = T::one();

    let rx = Matrix3::new(
        one.clone(),
        zero.clone(),
        zero.clone(),
        zero.clone(),
        ca.clone(),
        -sa.clone(),
        zero.clone(),
        sa,
        ca,
    );
    let ry = Matrix3::new(
        cb.clone(),
        zero.clone(),
        sb.clone(),
        zero.clone(),
        one.clone(),
        zero.clone(),
        -sb,
        zero.clone(),
        cb,
    );
    let rz = Matrix3::new(
        cg.clone(),
        -sg.clone(),
        zero.clone(),
        sg,
        cg,
        zero.clone(),
        zero.clone(),
        zero,
        one,
    );

    rz * ry * rx
}

/// Wrap an angle in degrees into `(-180, 180]`.
pub fn wrap_degrees(angle: Real) -> Real {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Euler angles (degrees) of an upright camera at `eye` looking at `target`.
///
/// The camera looks down its local -Z axis; the returned rotation has no roll
/// (`β = 0`) so the camera's up vector stays in the vertical plane. Returns
/// `None` when `eye` and `target` coincide.
pub fn look_at_rotation(eye: &Vec3, target: &Vec3) -> Option<Vec3> {
    let forward = target - eye;
    let norm = forward.norm();
    if !(norm > Real::EPSILON) {
        return None;
    }
    let f = forward / norm;

    // R · (0, 0, -1) = (-sinγ·sinα, cosγ·sinα, -cosα)
    let alpha = (-f.z).clamp(-1.0, 1.0).acos();
    let gamma = if alpha.sin() > 1e-12 {
        (-f.x).atan2(f.y)
    } else {
        0.0
    };
    Some(Vec3::new(alpha.to_degrees(), 0.0, gamma.to_degrees()))
}
