pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// Rotation-vector reading: 3 or 4 (sometimes 5, trailing accuracy) floats.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrientationSample {
    pub values: Vec<f64>,
    pub timestamp_ns: u64,
}

impl OrientationSample {
    pub fn new(values: Vec<f64>, timestamp_ns: u64) -> Self {
        Self { values, timestamp_ns }
    }
}

/// Linear acceleration in device frame, m/s², gravity already removed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccelSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp_ns: u64,
}

impl AccelSample {
    pub fn new(x: f64, y: f64, z: f64, timestamp_ns: u64) -> Self {
        Self { x, y, z, timestamp_ns }
    }

    pub fn vector(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn magnitude(&self) -> f64 {
        self.vector().norm()
    }
}

/// One record of the merged, time-ordered sensor stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorSample {
    Orientation(OrientationSample),
    Accel(AccelSample),
}

impl SensorSample {
    pub fn timestamp_ns(&self) -> u64 {
        match self {
            SensorSample::Orientation(s) => s.timestamp_ns,
            SensorSample::Accel(s) => s.timestamp_ns,
        }
    }
}
