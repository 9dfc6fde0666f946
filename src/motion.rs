// motion.rs — Stationary detection and accelerometer bias learning
//
// The classifier is a run-length counter over low-magnitude samples: one
// quiet sample is not enough to call the device at rest, one loud sample is
// enough to call it moving. The bias estimator only learns while at rest.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::types::Vec3;

// ─── Motion classifier ───────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionState {
    Moving,
    Stationary,
}

#[derive(Clone, Debug)]
pub struct MotionClassifier {
    threshold: f64,
    required_count: u32,
    counter: u32,
    state: MotionState,
}

impl MotionClassifier {
    pub fn new(threshold: f64, required_count: u32) -> Self {
        Self { threshold, required_count, counter: 0, state: MotionState::Moving }
    }

    /// Feed one acceleration magnitude and return the resulting state.
    ///
    /// Stationary once more than `required_count` consecutive samples sat
    /// below the threshold. Any sample at or above it resets to Moving.
    pub fn update(&mut self, magnitude: f64) -> MotionState {
        let previous = self.state;
        if magnitude < self.threshold {
            self.counter = self.counter.saturating_add(1);
            if self.counter > self.required_count {
                self.state = MotionState::Stationary;
            }
        } else {
            self.counter = 0;
            self.state = MotionState::Moving;
        }
        if previous != self.state {
            debug!(target: "motion", "{:?} -> {:?} (|a| = {:.4})", previous, self.state, magnitude);
        }
        self.state
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn is_stationary(&self) -> bool {
        self.state == MotionState::Stationary
    }

    pub fn reset(&mut self) {
        self.counter = 0;
        self.state = MotionState::Moving;
    }
}

// ─── Bias estimator ──────────────────────────────────────────────────────────

/// Per-axis EMA of device-frame acceleration observed while stationary.
#[derive(Clone, Debug)]
pub struct BiasEstimator {
    learning_rate: f64,
    bias: Vec3,
    updates: u64,
}

impl BiasEstimator {
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate, bias: Vec3::zeros(), updates: 0 }
    }

    /// `bias = bias * (1 - rate) + filtered * rate`. Call only while stationary.
    pub fn learn(&mut self, filtered: &Vec3) -> Vec3 {
        self.bias = self.bias * (1.0 - self.learning_rate) + filtered * self.learning_rate;
        self.updates += 1;
        self.bias
    }

    /// Device-frame acceleration with the learned bias removed.
    pub fn correct(&self, filtered: &Vec3) -> Vec3 {
        filtered - self.bias
    }

    pub fn bias(&self) -> Vec3 {
        self.bias
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn reset(&mut self) {
        self.bias = Vec3::zeros();
        self.updates = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_needs_more_than_required_count_quiet_samples() {
        let mut classifier = MotionClassifier::new(0.2, 5);
        for _ in 0..5 {
            assert_eq!(classifier.update(0.05), MotionState::Moving);
        }
        assert_eq!(classifier.update(0.05), MotionState::Stationary);
        assert_eq!(classifier.counter(), 6);
    }

    #[test]
    fn test_single_loud_sample_resets_immediately() {
        let mut classifier = MotionClassifier::new(0.2, 2);
        for _ in 0..10 {
            classifier.update(0.0);
        }
        assert!(classifier.is_stationary());

        // at threshold counts as loud
        assert_eq!(classifier.update(0.2), MotionState::Moving);
        assert_eq!(classifier.counter(), 0);

        // hysteresis starts over
        assert_eq!(classifier.update(0.0), MotionState::Moving);
        assert_eq!(classifier.update(0.0), MotionState::Moving);
        assert_eq!(classifier.update(0.0), MotionState::Stationary);
    }

    #[test]
    fn test_classifier_reset() {
        let mut classifier = MotionClassifier::new(1.0, 1);
        classifier.update(0.0);
        classifier.update(0.0);
        assert!(classifier.is_stationary());
        classifier.reset();
        assert_eq!(classifier.state(), MotionState::Moving);
        assert_eq!(classifier.counter(), 0);
    }

    #[test]
    fn test_bias_ema() {
        let mut bias = BiasEstimator::new(0.5);
        bias.learn(&Vec3::new(0.2, 0.0, -0.4));
        let b = bias.learn(&Vec3::new(0.2, 0.0, -0.4));
        assert_relative_eq!(b, Vec3::new(0.15, 0.0, -0.3), epsilon = 1e-12);
        assert_eq!(bias.updates(), 2);

        let corrected = bias.correct(&Vec3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(corrected, Vec3::new(0.85, 1.0, 1.3), epsilon = 1e-12);
    }

    #[test]
    fn test_slow_rate_tracks_drift_not_motion() {
        let mut bias = BiasEstimator::new(0.001);
        for _ in 0..10 {
            bias.learn(&Vec3::new(5.0, 0.0, 0.0));
        }
        // ten samples at 0.1% barely move the estimate
        assert!(bias.bias().x < 0.06);
        bias.reset();
        assert_eq!(bias.bias(), Vec3::zeros());
    }
}
