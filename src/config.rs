// config.rs — Tunables for the dead-reckoning estimators
//
// The screens this engine replaces each hard-coded their own constants.
// They live here as one table with defaults; a JSON file (and the CLI)
// override any subset of them.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{TrackerError, TrackerResult};

// ─── Strategy selection ──────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    /// Double integration of world-frame acceleration.
    DoubleIntegration,
    /// Step detection with a fixed stride along the device heading.
    Stride,
}

/// Where a threshold is applied relative to the frame rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyFrame {
    /// On the device-frame vector, before rotation.
    Device,
    /// On the world-frame vector, after bias correction and rotation.
    World,
}

// ─── Double integration ──────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    // ── Low-pass filter on raw accel ──
    pub lowpass_alpha: f64,

    // ── Stationary detection ──
    pub stationary_threshold: f64,
    pub stationary_required_count: u32,
    pub stationary_frame: ApplyFrame,

    // ── Drift suppression ──
    pub accel_deadzone: f64,
    pub deadzone_frame: ApplyFrame,
    pub velocity_damping: f64,
    pub bias_learning_rate: f64,
    pub position_epsilon: Option<f64>,

    // ── Timestep gating ──
    pub dt_max: f64,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            lowpass_alpha: 0.4,
            stationary_threshold: 0.2,
            stationary_required_count: 5,
            stationary_frame: ApplyFrame::Device,
            accel_deadzone: 0.08,
            deadzone_frame: ApplyFrame::World,
            velocity_damping: 0.998,
            bias_learning_rate: 0.001,
            position_epsilon: None,
            dt_max: 0.5,
        }
    }
}

// ─── Stride model ────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrideConfig {
    pub stride_length_m: f64,
    pub step_threshold: f64,
    pub step_hysteresis: f64,
    pub min_step_interval_s: f64,
    pub max_step_interval_s: f64,
}

impl Default for StrideConfig {
    fn default() -> Self {
        Self {
            stride_length_m: 0.7,
            step_threshold: 1.2,
            step_hysteresis: 0.4,
            min_step_interval_s: 0.25, // ~4 steps/sec
            max_step_interval_s: 2.0,
        }
    }
}

// ─── Top level ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub kind: EstimatorKind,
    pub path_capacity: usize,
    pub integration: IntegrationConfig,
    pub stride: StrideConfig,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            kind: EstimatorKind::DoubleIntegration,
            path_capacity: 4000,
            integration: IntegrationConfig::default(),
            stride: StrideConfig::default(),
        }
    }
}

impl EstimatorConfig {
    /// Load a (partial) config from JSON; absent fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> TrackerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TrackerResult<()> {
        let i = &self.integration;
        check(
            (0.0..1.0).contains(&i.lowpass_alpha),
            format!("lowpass_alpha must be in [0, 1), got {}", i.lowpass_alpha),
        )?;
        check(
            i.stationary_threshold >= 0.0,
            format!("stationary_threshold must be >= 0, got {}", i.stationary_threshold),
        )?;
        check(i.stationary_required_count >= 1, "stationary_required_count must be >= 1".to_string())?;
        check(
            i.accel_deadzone >= 0.0,
            format!("accel_deadzone must be >= 0, got {}", i.accel_deadzone),
        )?;
        check(
            i.velocity_damping > 0.0 && i.velocity_damping <= 1.0,
            format!("velocity_damping must be in (0, 1], got {}", i.velocity_damping),
        )?;
        check(
            (0.0..=1.0).contains(&i.bias_learning_rate),
            format!("bias_learning_rate must be in [0, 1], got {}", i.bias_learning_rate),
        )?;
        check(
            i.dt_max.is_finite() && i.dt_max > 0.0,
            format!("dt_max must be a positive finite number of seconds, got {}", i.dt_max),
        )?;
        if let Some(eps) = i.position_epsilon {
            check(eps >= 0.0, format!("position_epsilon must be >= 0, got {}", eps))?;
        }
        check(self.path_capacity >= 1, "path_capacity must be >= 1".to_string())?;

        let s = &self.stride;
        check(
            s.stride_length_m > 0.0,
            format!("stride_length_m must be > 0, got {}", s.stride_length_m),
        )?;
        check(
            s.step_hysteresis >= 0.0 && s.step_hysteresis < s.step_threshold,
            "step_hysteresis must be in [0, step_threshold)".to_string(),
        )?;
        check(
            s.min_step_interval_s >= 0.0 && s.min_step_interval_s < s.max_step_interval_s,
            "min_step_interval_s must be in [0, max_step_interval_s)".to_string(),
        )?;
        Ok(())
    }
}

fn check(ok: bool, msg: String) -> TrackerResult<()> {
    if ok {
        Ok(())
    } else {
        Err(TrackerError::InvalidConfig(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(EstimatorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_unit_damping_and_zero_deadzone_are_legal() {
        let mut config = EstimatorConfig::default();
        config.integration.velocity_damping = 1.0;
        config.integration.accel_deadzone = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = EstimatorConfig::default();
        config.integration.lowpass_alpha = 1.0;
        assert!(matches!(config.validate(), Err(TrackerError::InvalidConfig(_))));

        let mut config = EstimatorConfig::default();
        config.integration.dt_max = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = EstimatorConfig::default();
        config.path_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = EstimatorConfig::default();
        config.integration.stationary_required_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "kind": "stride",
            "integration": { "lowpass_alpha": 0.6, "deadzone_frame": "device" }
        }"#;
        let config: EstimatorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kind, EstimatorKind::Stride);
        assert_eq!(config.integration.lowpass_alpha, 0.6);
        assert_eq!(config.integration.deadzone_frame, ApplyFrame::Device);
        assert_eq!(config.integration.dt_max, 0.5);
        assert_eq!(config.path_capacity, 4000);
        assert_eq!(config.stride, StrideConfig::default());
    }

    #[test]
    fn test_from_json_file() {
        let path = std::env::temp_dir().join(format!("dr_config_{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "path_capacity": 2000 }"#).unwrap();
        let config = EstimatorConfig::from_json_file(&path).unwrap();
        assert_eq!(config.path_capacity, 2000);
        let _ = std::fs::remove_file(&path);
    }
}
