//! Scalar regularisation residuals.

use nalgebra::RealField;
use roadcam_core::lit;

/// `(value - target) * scale`.
pub fn target_value_residual<T: RealField>(value: T, target: f64, scale: f64) -> T {
    (value - lit::<T>(target)) * lit::<T>(scale)
}

/// Zero inside `[lower, upper]`, otherwise the signed distance to the nearer bound,
/// multiplied by `scale`.
pub fn interval_residual<T: RealField>(value: T, lower: f64, upper: f64, scale: f64) -> T {
    interval_excess(value, lower, upper) * lit::<T>(scale)
}

/// Signed distance of `value` past the violated bound of `[lower, upper]`.
pub(crate) fn interval_excess<T: RealField>(value: T, lower: f64, upper: f64) -> T {
    let lo = lit::<T>(lower);
    let hi = lit::<T>(upper);
    if value < lo {
        value - lo
    } else if value > hi {
        value - hi
    } else {
        T::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_is_zero_inside_and_on_bounds() {
        for v in [-2.0, -1.999, 0.0, 3.5, 4.0] {
            assert_eq!(interval_residual(v, -2.0, 4.0, 1.0), 0.0, "value {v}");
        }
    }

    #[test]
    fn interval_measures_distance_to_nearest_bound() {
        assert_eq!(interval_residual(-3.5, -2.0, 4.0, 1.0), -1.5);
        assert_eq!(interval_residual(6.0, -2.0, 4.0, 1.0), 2.0);
        assert_eq!(interval_residual(6.0, -2.0, 4.0, 50.0), 100.0);
    }

    #[test]
    fn degenerate_interval_acts_like_target() {
        assert_eq!(interval_residual(1.0, 1.0, 1.0, 2.0), 0.0);
        assert_eq!(interval_residual(3.0, 1.0, 1.0, 2.0), target_value_residual(3.0, 1.0, 2.0));
    }

    #[test]
    fn target_value_is_scaled_difference() {
        assert_eq!(target_value_residual(1.0, 1.0, 1e6), 0.0);
        assert_eq!(target_value_residual(0.5, 1.0, 2.0), -1.0);
    }
}
