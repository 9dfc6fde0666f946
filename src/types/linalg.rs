//! Linear algebra aliases for the dead-reckoning pipeline.
//!
//! Everything runs in f64. Android delivers f32 sensor values, but the
//! frame rotation cancels badly in single precision, so samples are widened
//! at the boundary and never narrowed again.

use nalgebra::{Quaternion, UnitQuaternion, Vector3};

// ===== Vector / rotation types =====
pub type Vec3 = Vector3<f64>;
pub type Quat = Quaternion<f64>;
pub type UnitQuat = UnitQuaternion<f64>;

// ===== Frame axes =====
// World frame is ENU as reported by the Android rotation vector.
/// Device forward axis (top edge of a phone held in portrait).
pub const DEVICE_FORWARD: Vec3 = Vec3::new(0.0, 1.0, 0.0);

/// Flatten a vector into the `(x, y, z)` tuple used in events.
pub fn vec3_to_tuple(v: &Vec3) -> (f64, f64, f64) {
    (v.x, v.y, v.z)
}

/// True when every component is finite.
pub fn is_finite_vec(v: &Vec3) -> bool {
    v.iter().all(|c| c.is_finite())
}
