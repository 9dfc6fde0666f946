use crate::types::Vec3;

/// Exponential low-pass filter on device-frame linear acceleration.
///
/// `filtered = alpha * filtered + (1 - alpha) * raw`, starting from zero.
/// Runs on every accel sample whether or not integration is active, so it is
/// already settled when the estimator starts.
#[derive(Clone, Debug)]
pub struct AccelLowPass {
    alpha: f64,
    output: Vec3,
    samples: u64,
}

impl AccelLowPass {
    pub fn new(alpha: f64) -> Self {
        Self { alpha, output: Vec3::zeros(), samples: 0 }
    }

    pub fn update(&mut self, raw: &Vec3) -> Vec3 {
        self.output = self.output * self.alpha + raw * (1.0 - self.alpha);
        self.samples += 1;
        self.output
    }

    /// Current filtered value.
    pub fn output(&self) -> Vec3 {
        self.output
    }

    /// Number of samples folded in so far.
    pub fn len(&self) -> u64 {
        self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }
}
