//! Device → world frame rotation.
//!
//! A vector `a` is lifted to the pure quaternion `(0, a)` and conjugated by
//! the device rotation: `a_world = vec(q * (0, a) * conj(q))`. For a unit
//! `q` the conjugate is the inverse, so no division happens. nalgebra's
//! `Quaternion` multiplication is the Hamilton product; everything stays in
//! f64.

use crate::types::{Quat, UnitQuat, Vec3, DEVICE_FORWARD};

/// Horizontal heading vectors shorter than this are treated as undefined.
const MIN_HEADING_NORM: f64 = 1e-6;

/// Rotate a device-frame vector into the world frame.
pub fn device_to_world(a: &Vec3, q: &UnitQuat) -> Vec3 {
    let q = q.quaternion();
    let pure = Quat::from_imag(*a);
    (q * pure * q.conjugate()).imag()
}

/// Unit vector of the device forward axis projected on the world horizontal
/// plane, or `None` when the device points straight up or down.
pub fn horizontal_heading(q: &UnitQuat) -> Option<Vec3> {
    let forward = device_to_world(&DEVICE_FORWARD, q);
    let flat = Vec3::new(forward.x, forward.y, 0.0);
    let norm = flat.norm();
    if norm < MIN_HEADING_NORM {
        None
    } else {
        Some(flat / norm)
    }
}

/// Zero every component whose magnitude is below `deadzone`.
pub fn apply_deadzone(v: &Vec3, deadzone: f64) -> Vec3 {
    v.map(|c| if c.abs() < deadzone { 0.0 } else { c })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Quaternion, Vector3};
    use std::f64::consts::FRAC_PI_2;

    fn yaw(rad: f64) -> UnitQuat {
        UnitQuat::from_axis_angle(&Vector3::z_axis(), rad)
    }

    #[test]
    fn test_identity_leaves_vector_unchanged() {
        let v = Vec3::new(0.3, -1.7, 9.0);
        assert_eq!(device_to_world(&v, &UnitQuat::identity()), v);
    }

    #[test]
    fn test_zero_vector_stays_zero() {
        let q = UnitQuat::from_quaternion(Quaternion::new(0.3, -0.5, 0.7, 0.1));
        assert_relative_eq!(device_to_world(&Vec3::zeros(), &q), Vec3::zeros(), epsilon = 1e-15);
    }

    #[test]
    fn test_quarter_turn_about_z() {
        let out = device_to_world(&Vec3::new(1.0, 0.0, 0.0), &yaw(FRAC_PI_2));
        assert_relative_eq!(out, Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_matches_rotation_matrix() {
        let q = UnitQuat::from_quaternion(Quaternion::new(0.9, 0.1, -0.3, 0.25));
        let v = Vec3::new(0.4, -0.2, 1.1);
        let expected = q.to_rotation_matrix() * v;
        assert_relative_eq!(device_to_world(&v, &q), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_preserves_length() {
        let q = UnitQuat::from_quaternion(Quaternion::new(-0.2, 0.8, 0.4, -0.1));
        let v = Vec3::new(2.0, 3.0, -6.0);
        assert_relative_eq!(device_to_world(&v, &q).norm(), 7.0, epsilon = 1e-12);
    }

    #[test]
    fn test_heading_follows_yaw() {
        // forward (+Y) yawed -90° points east (+X)
        let h = horizontal_heading(&yaw(-FRAC_PI_2)).unwrap();
        assert_relative_eq!(h, Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-12);

        let level = horizontal_heading(&UnitQuat::identity()).unwrap();
        assert_relative_eq!(level, Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_heading_undefined_when_pointing_up() {
        // pitch forward axis onto +Z
        let q = UnitQuat::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2);
        assert!(horizontal_heading(&q).is_none());
    }

    #[test]
    fn test_deadzone_per_axis() {
        let v = apply_deadzone(&Vec3::new(0.05, -0.08, 0.2), 0.08);
        assert_eq!(v, Vec3::new(0.0, -0.08, 0.2));
    }
}
