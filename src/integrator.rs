// integrator.rs — Double-integration dead reckoning
//
// Per accel sample, in order:
//   low-pass → (started?) clock → motion classifier → stationary: zero
//   velocity + learn bias / moving: bias-correct → rotate → deadzone →
//   Euler step with damping → path.
// Orientation samples only replace the current rotation.
//
// Every mutation of the kinematic state is computed into locals first and
// committed only if it is finite.

use serde::{Deserialize, Serialize};

use crate::config::{ApplyFrame, EstimatorConfig, EstimatorKind, IntegrationConfig};
use crate::estimator::{
    apply_orientation, checked_accel, DiscardReason, EstimatorSnapshot, MotionEstimator, TrackerEvent,
};
use crate::motion::{BiasEstimator, MotionClassifier, MotionState};
use crate::orientation::OrientationTracker;
use crate::path::PathBuffer;
use crate::smoothing::AccelLowPass;
use crate::transforms::{apply_deadzone, device_to_world};
use crate::types::{is_finite_vec, AccelSample, OrientationSample, Vec3};

const NANOS_PER_SEC: f64 = 1e9;

// ─── Kinematic state ─────────────────────────────────────────────────────────

/// World-frame velocity (m/s) and position (m).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KinematicState {
    pub position: Vec3,
    pub velocity: Vec3,
}

impl KinematicState {
    pub fn is_finite(&self) -> bool {
        is_finite_vec(&self.position) && is_finite_vec(&self.velocity)
    }
}

// ─── Phase ───────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegratorPhase {
    /// Not started: samples only warm the filter.
    Idle,
    /// Started, clock unset: the next valid sample only seeds the clock.
    Seeding,
    Integrating,
}

// ─── Clock ───────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Tick {
    Seeded,
    Step(f64),
    Discarded { dt: f64, reason: DiscardReason },
}

/// Last accepted sample time. `None` means not yet seeded.
#[derive(Clone, Copy, Debug, Default)]
pub struct IntegrationClock {
    last_ns: Option<u64>,
}

impl IntegrationClock {
    /// Move the clock to `timestamp_ns` and classify the gap.
    ///
    /// The clock always ends at the new timestamp, so a rejected gap reseeds
    /// it rather than poisoning the next step.
    pub fn advance(&mut self, timestamp_ns: u64, dt_max: f64) -> Tick {
        let previous = self.last_ns.replace(timestamp_ns);
        let Some(last) = previous else {
            return Tick::Seeded;
        };
        let dt = (i128::from(timestamp_ns) - i128::from(last)) as f64 / NANOS_PER_SEC;
        if !dt.is_finite() {
            Tick::Discarded { dt, reason: DiscardReason::NonFiniteDt }
        } else if dt <= 0.0 {
            Tick::Discarded { dt, reason: DiscardReason::NonPositiveDt }
        } else if dt > dt_max {
            Tick::Discarded { dt, reason: DiscardReason::DtTooLarge }
        } else {
            Tick::Step(dt)
        }
    }

    pub fn last_ns(&self) -> Option<u64> {
        self.last_ns
    }

    pub fn unset(&mut self) {
        self.last_ns = None;
    }
}

/// Shared start/stop/reset bookkeeping for both estimators.
#[derive(Clone, Debug)]
pub(crate) struct RunGate {
    pub phase: IntegratorPhase,
    pub clock: IntegrationClock,
}

impl RunGate {
    pub fn new() -> Self {
        Self { phase: IntegratorPhase::Idle, clock: IntegrationClock::default() }
    }

    pub fn start(&mut self) {
        if self.phase == IntegratorPhase::Idle {
            self.clock.unset();
            self.phase = IntegratorPhase::Seeding;
        }
    }

    pub fn stop(&mut self) {
        self.phase = IntegratorPhase::Idle;
    }

    pub fn reset(&mut self) {
        self.clock.unset();
        if self.phase != IntegratorPhase::Idle {
            self.phase = IntegratorPhase::Seeding;
        }
    }

    /// Advance the clock for a started estimator. `None` while Idle.
    pub fn tick(&mut self, timestamp_ns: u64, dt_max: f64) -> Option<Tick> {
        if self.phase == IntegratorPhase::Idle {
            return None;
        }
        let tick = self.clock.advance(timestamp_ns, dt_max);
        if tick == Tick::Seeded {
            self.phase = IntegratorPhase::Integrating;
        }
        Some(tick)
    }
}

/// Turn a non-step tick into its event.
pub(crate) fn tick_event(tick: Tick, timestamp_ns: u64) -> Option<TrackerEvent> {
    match tick {
        Tick::Seeded => Some(TrackerEvent::ClockSeeded { timestamp_ns }),
        Tick::Discarded { dt, reason } => Some(TrackerEvent::SampleDiscarded { timestamp_ns, dt, reason }),
        Tick::Step(_) => None,
    }
}

// ─── Integrator ──────────────────────────────────────────────────────────────

pub struct Integrator {
    config: IntegrationConfig,
    orientation: OrientationTracker,
    lowpass: AccelLowPass,
    classifier: MotionClassifier,
    bias: BiasEstimator,
    gate: RunGate,
    state: KinematicState,
    path: PathBuffer,
    steps_integrated: u64,
}

impl Integrator {
    pub fn new(config: &EstimatorConfig) -> Self {
        let c = config.integration.clone();
        Self {
            orientation: OrientationTracker::new(),
            lowpass: AccelLowPass::new(c.lowpass_alpha),
            classifier: MotionClassifier::new(c.stationary_threshold, c.stationary_required_count),
            bias: BiasEstimator::new(c.bias_learning_rate),
            gate: RunGate::new(),
            state: KinematicState::default(),
            path: PathBuffer::new(config.path_capacity),
            steps_integrated: 0,
            config: c,
        }
    }

    pub fn state(&self) -> KinematicState {
        self.state
    }

    fn step(&mut self, filtered: Vec3, dt: f64, timestamp_ns: u64, events: &mut Vec<TrackerEvent>) {
        let q = self.orientation.rotation();

        let magnitude = match self.config.stationary_frame {
            ApplyFrame::Device => filtered.norm(),
            ApplyFrame::World => device_to_world(&self.bias.correct(&filtered), &q).norm(),
        };
        // committed together with the kinematics
        let mut classifier = self.classifier.clone();
        let motion = classifier.update(magnitude);

        let mut next = self.state;
        match motion {
            MotionState::Stationary => {
                next.velocity = Vec3::zeros();
            }
            MotionState::Moving => {
                let mut corrected = self.bias.correct(&filtered);
                if self.config.deadzone_frame == ApplyFrame::Device {
                    corrected = apply_deadzone(&corrected, self.config.accel_deadzone);
                }
                let mut world = device_to_world(&corrected, &q);
                if self.config.deadzone_frame == ApplyFrame::World {
                    world = apply_deadzone(&world, self.config.accel_deadzone);
                }
                next.velocity = (next.velocity + world * dt) * self.config.velocity_damping;
            }
        }
        next.position += next.velocity * dt;
        if let Some(eps) = self.config.position_epsilon {
            next.position = apply_deadzone(&next.position, eps);
        }

        if !next.is_finite() {
            events.push(TrackerEvent::StepRolledBack { timestamp_ns });
            return;
        }

        if motion != self.classifier.state() {
            events.push(TrackerEvent::MotionChanged { timestamp_ns, state: motion });
        }
        if motion == MotionState::Stationary {
            self.bias.learn(&filtered);
        }
        self.classifier = classifier;
        self.state = next;
        self.path.push(next.position);
        self.steps_integrated += 1;
    }
}

impl MotionEstimator for Integrator {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::DoubleIntegration
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
        match self.gate.tick(sample.timestamp_ns, self.config.dt_max) {
            None => {}
            Some(Tick::Step(dt)) => self.step(filtered, dt, sample.timestamp_ns, &mut events),
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
        self.bias.reset();
        self.classifier.reset();
        self.path.clear();
        self.gate.reset();
        self.steps_integrated = 0;
    }

    fn phase(&self) -> IntegratorPhase {
        self.gate.phase
    }

    fn snapshot(&self) -> EstimatorSnapshot {
        EstimatorSnapshot {
            kind: self.kind(),
            phase: self.gate.phase,
            kinematics: self.state,
            motion: self.classifier.state(),
            bias: self.bias.bias(),
            orientation: self.orientation.rotation(),
            filtered_accel: self.lowpass.output(),
            last_timestamp_ns: self.gate.clock.last_ns(),
            steps_integrated: self.steps_integrated,
            steps_detected: 0,
            path: self.path.snapshot(),
        }
    }
}
