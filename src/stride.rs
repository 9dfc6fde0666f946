//! Step-and-heading dead reckoning.
//!
//! Instead of integrating acceleration twice, every detected step moves the
//! position by a fixed stride along the horizontal projection of the device
//! forward axis. Drift then grows with the step count rather than with time.
//!
//! Steps are rising crossings of the filtered acceleration magnitude through
//! `step_threshold`. A crossing only re-arms once the magnitude falls below
//! `step_threshold - step_hysteresis`, and crossings closer than
//! `min_step_interval_s` to the previous step are ignored.

use log::debug;

use crate::config::{EstimatorConfig, EstimatorKind, StrideConfig};
use crate::estimator::{apply_orientation, checked_accel, EstimatorSnapshot, MotionEstimator, TrackerEvent};
use crate::integrator::{tick_event, IntegratorPhase, KinematicState, RunGate, Tick};
use crate::motion::MotionState;
use crate::orientation::OrientationTracker;
use crate::path::PathBuffer;
use crate::smoothing::AccelLowPass;
use crate::transforms::horizontal_heading;
use crate::types::{vec3_to_tuple, AccelSample, OrientationSample, Vec3};

const NANOS_PER_SEC: f64 = 1e9;

fn seconds_between(earlier_ns: u64, later_ns: u64) -> f64 {
    (i128::from(later_ns) - i128::from(earlier_ns)) as f64 / NANOS_PER_SEC
}

pub struct StrideEstimator {
    config: StrideConfig,
    dt_max: f64,
    orientation: OrientationTracker,
    lowpass: AccelLowPass,
    gate: RunGate,
    state: KinematicState,
    path: PathBuffer,
    armed: bool,
    last_step_ns: Option<u64>,
    steps_integrated: u64,
    steps_detected: u64,
}

impl StrideEstimator {
    pub fn new(config: &EstimatorConfig) -> Self {
        Self {
            config: config.stride.clone(),
            dt_max: config.integration.dt_max,
            orientation: OrientationTracker::new(),
            lowpass: AccelLowPass::new(config.integration.lowpass_alpha),
            gate: RunGate::new(),
            state: KinematicState::default(),
            path: PathBuffer::new(config.path_capacity),
            armed: true,
            last_step_ns: None,
            steps_integrated: 0,
            steps_detected: 0,
        }
    }

    pub fn state(&self) -> KinematicState {
        self.state
    }

    pub fn steps_detected(&self) -> u64 {
        self.steps_detected
    }

    /// Walking while the last step is recent enough to carry a velocity.
    fn motion(&self) -> MotionState {
        if self.state.velocity == Vec3::zeros() {
            MotionState::Stationary
        } else {
            MotionState::Moving
        }
    }

    fn detect(&mut self, magnitude: f64, timestamp_ns: u64, events: &mut Vec<TrackerEvent>) {
        // timestamps restarting below the last step count as no previous step
        let since_last = self
            .last_step_ns
            .map(|last| seconds_between(last, timestamp_ns))
            .filter(|elapsed| *elapsed > 0.0);

        if let Some(elapsed) = since_last {
            if elapsed > self.config.max_step_interval_s && self.state.velocity != Vec3::zeros() {
                self.state.velocity = Vec3::zeros();
                events.push(TrackerEvent::MotionChanged { timestamp_ns, state: MotionState::Stationary });
            }
        }

        if !self.armed {
            if magnitude < self.config.step_threshold - self.config.step_hysteresis {
                self.armed = true;
            }
            return;
        }
        if magnitude < self.config.step_threshold {
            return;
        }

        // rising crossing; consumed whether or not it counts
        self.armed = false;
        if matches!(since_last, Some(elapsed) if elapsed < self.config.min_step_interval_s) {
            debug!(target: "stride", "crossing @ {} inside min step interval", timestamp_ns);
            return;
        }

        let Some(heading) = horizontal_heading(&self.orientation.rotation()) else {
            events.push(TrackerEvent::StepSkipped { timestamp_ns });
            return;
        };

        let was_moving = self.motion() == MotionState::Moving;
        let displacement = heading * self.config.stride_length_m;
        self.state.position += displacement;
        self.state.velocity = match since_last {
            Some(elapsed) if elapsed <= self.config.max_step_interval_s => displacement / elapsed,
            _ => Vec3::zeros(),
        };
        self.path.push(self.state.position);
        self.last_step_ns = Some(timestamp_ns);
        self.steps_detected += 1;

        events.push(TrackerEvent::StepDetected {
            timestamp_ns,
            heading: (heading.x, heading.y),
            position: vec3_to_tuple(&self.state.position),
        });
        if !was_moving && self.motion() == MotionState::Moving {
            events.push(TrackerEvent::MotionChanged { timestamp_ns, state: MotionState::Moving });
        }
    }
}

impl MotionEstimator for StrideEstimator {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Stride
    }

    fn feed_orientation(&mut self, sample: &OrientationSample) -> Vec<TrackerEvent> {
        apply_orientation(&mut self.orientation, sample)
    }

    fn feed_accel(&mut self, sample: &AccelSample) -> Vec<TrackerEvent> {
        let raw = match checked_accel(sample) {
            Ok(raw) => raw,
            Err(event) => return vec![event],
        };
        let filtered = self.lowpass.update(&raw);

        let mut events = Vec::new();
        match self.gate.tick(sample.timestamp_ns, self.dt_max) {
            None => {}
            Some(Tick::Step(_)) => {
                self.steps_integrated += 1;
                self.detect(filtered.norm(), sample.timestamp_ns, &mut events);
            }
            Some(tick) => events.extend(tick_event(tick, sample.timestamp_ns)),
        }
        events
    }

    fn start(&mut self) {
        self.gate.start();
    }

    fn stop(&mut self) {
        self.gate.stop();
    }

    fn reset(&mut self) {
        self.state = KinematicState::default();
        self.path.clear();
        self.gate.reset();
        self.armed = true;
        self.last_step_ns = None;
        self.steps_integrated = 0;
        self.steps_detected = 0;
    }

    fn phase(&self) -> IntegratorPhase {
        self.gate.phase
    }

    fn snapshot(&self) -> EstimatorSnapshot {
        EstimatorSnapshot {
            kind: self.kind(),
            phase: self.gate.phase,
            kinematics: self.state,
            motion: self.motion(),
            bias: Vec3::zeros(),
            orientation: self.orientation.rotation(),
            filtered_accel: self.lowpass.output(),
            last_timestamp_ns: self.gate.clock.last_ns(),
            steps_integrated: self.steps_integrated,
            steps_detected: self.steps_detected,
            path: self.path.snapshot(),
        }
    }
}
