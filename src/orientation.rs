//! Orientation tracker: latest device→world rotation from the rotation-vector stream.

use log::trace;
use nalgebra::Quaternion;

use crate::error::{TrackerError, TrackerResult};
use crate::types::UnitQuat;

/// Squared-norm floor below which a quaternion cannot be normalized.
const MIN_NORM_SQUARED: f64 = 1e-12;

#[derive(Clone, Debug)]
pub struct OrientationTracker {
    rotation: UnitQuat,
}

impl OrientationTracker {
    pub fn new() -> Self {
        Self { rotation: UnitQuat::identity() }
    }

    /// Accept a raw rotation-vector reading.
    ///
    /// Values are `(x, y, z[, w[, accuracy]])`. With only three components
    /// `w` is reconstructed as `sqrt(max(0, 1 - x² - y² - z²))`. Rejected
    /// readings leave the previous rotation in place.
    pub fn update(&mut self, values: &[f64], timestamp_ns: u64) -> TrackerResult<UnitQuat> {
        if values.len() < 3 {
            return Err(TrackerError::InvalidSample(format!(
                "orientation needs at least 3 components, got {}",
                values.len()
            )));
        }
        let (x, y, z) = (values[0], values[1], values[2]);
        let w = match values.get(3) {
            Some(&w) => w,
            None => (1.0 - x * x - y * y - z * z).max(0.0).sqrt(),
        };
        if ![x, y, z, w].iter().all(|c| c.is_finite()) {
            return Err(TrackerError::InvalidSample("non-finite orientation component".to_string()));
        }

        // nalgebra's constructor is (w, i, j, k)
        let q = Quaternion::new(w, x, y, z);
        if q.norm_squared() < MIN_NORM_SQUARED {
            return Err(TrackerError::InvalidSample("zero-norm orientation quaternion".to_string()));
        }

        self.rotation = UnitQuat::from_quaternion(q);
        trace!(target: "orientation", "q = {:?} @ {}", self.rotation.coords, timestamp_ns);
        Ok(self.rotation)
    }

    pub fn rotation(&self) -> UnitQuat {
        self.rotation
    }
}

impl Default for OrientationTracker {
    fn default() -> Self {
        Self::new()
    }
}
