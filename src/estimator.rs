// estimator.rs — The capability every position estimator provides
//
// Two strategies exist: double integration of world-frame acceleration and
// step detection with a fixed stride. They share the sample types, the
// lifecycle (start/stop/reset), the event vocabulary and the snapshot, and
// nothing else. Which one runs is a configuration choice.

use log::{debug, warn};
use serde::Serialize;

use crate::config::{EstimatorConfig, EstimatorKind};
use crate::error::TrackerResult;
use crate::integrator::{Integrator, IntegratorPhase, KinematicState};
use crate::motion::MotionState;
use crate::orientation::OrientationTracker;
use crate::path::PathSnapshot;
use crate::stride::StrideEstimator;
use crate::types::{is_finite_vec, AccelSample, OrientationSample, UnitQuat, Vec3};

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DiscardReason {
    NonPositiveDt,
    DtTooLarge,
    NonFiniteDt,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TrackerEvent {
    InvalidSample { timestamp_ns: u64, reason: String },
    ClockSeeded { timestamp_ns: u64 },
    SampleDiscarded { timestamp_ns: u64, dt: f64, reason: DiscardReason },
    StepRolledBack { timestamp_ns: u64 },
    MotionChanged { timestamp_ns: u64, state: MotionState },
    StepDetected { timestamp_ns: u64, heading: (f64, f64), position: (f64, f64, f64) },
    StepSkipped { timestamp_ns: u64 },
}

impl TrackerEvent {
    /// Report the event on the `log` facade.
    pub fn log(&self) {
        match self {
            TrackerEvent::InvalidSample { timestamp_ns, reason } => {
                warn!(target: "estimator", "invalid sample @ {}: {}", timestamp_ns, reason)
            }
            TrackerEvent::StepRolledBack { timestamp_ns } => {
                warn!(target: "estimator", "non-finite state @ {}, step rolled back", timestamp_ns)
            }
            TrackerEvent::SampleDiscarded { timestamp_ns, dt, reason } => {
                debug!(target: "estimator", "discarded @ {}: dt = {:.4}s ({:?})", timestamp_ns, dt, reason)
            }
            other => debug!(target: "estimator", "{:?}", other),
        }
    }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// Everything a presentation layer reads, copied out of the writer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EstimatorSnapshot {
    pub kind: EstimatorKind,
    pub phase: IntegratorPhase,
    pub kinematics: KinematicState,
    pub motion: MotionState,
    pub bias: Vec3,
    pub orientation: UnitQuat,
    pub filtered_accel: Vec3,
    pub last_timestamp_ns: Option<u64>,
    pub steps_integrated: u64,
    pub steps_detected: u64,
    pub path: PathSnapshot,
}

// ─── Capability ──────────────────────────────────────────────────────────────

pub trait MotionEstimator: Send {
    fn kind(&self) -> EstimatorKind;

    /// Orientation samples are accepted in every phase.
    fn feed_orientation(&mut self, sample: &OrientationSample) -> Vec<TrackerEvent>;

    /// Acceleration samples always reach the filter; they only move the
    /// position while started.
    fn feed_accel(&mut self, sample: &AccelSample) -> Vec<TrackerEvent>;

    fn start(&mut self);

    /// Stop integrating. Position, velocity, bias and path are kept.
    fn stop(&mut self);

    /// Zero the kinematic state, bias, motion counter and path and unset the
    /// clock. Does not change whether the estimator is running.
    fn reset(&mut self);

    fn phase(&self) -> IntegratorPhase;

    fn snapshot(&self) -> EstimatorSnapshot;
}

pub fn build_estimator(config: &EstimatorConfig) -> TrackerResult<Box<dyn MotionEstimator>> {
    config.validate()?;
    Ok(match config.kind {
        EstimatorKind::DoubleIntegration => Box::new(Integrator::new(config)),
        EstimatorKind::Stride => Box::new(StrideEstimator::new(config)),
    })
}

// ─── Shared sample handling ──────────────────────────────────────────────────

pub(crate) fn apply_orientation(
    tracker: &mut OrientationTracker,
    sample: &OrientationSample,
) -> Vec<TrackerEvent> {
    match tracker.update(&sample.values, sample.timestamp_ns) {
        Ok(_) => Vec::new(),
        Err(e) => vec![TrackerEvent::InvalidSample {
            timestamp_ns: sample.timestamp_ns,
            reason: e.to_string(),
        }],
    }
}

/// Raw device-frame vector of an accel sample, rejecting NaN/inf before it
/// can reach the low-pass filter.
pub(crate) fn checked_accel(sample: &AccelSample) -> Result<Vec3, TrackerEvent> {
    let raw = sample.vector();
    if is_finite_vec(&raw) {
        Ok(raw)
    } else {
        Err(TrackerEvent::InvalidSample {
            timestamp_ns: sample.timestamp_ns,
            reason: "non-finite acceleration component".to_string(),
        })
    }
}
