// engine.rs — Single-writer estimator task
//
// One tokio task owns the estimator. Sensor callbacks and controls reach it
// only through a bounded command queue, so samples and start/stop/reset are
// applied in one total order. Readers never touch the writer: they clone the
// latest `Arc<EstimatorSnapshot>` out of a watch channel.
//
// Control commands carry a oneshot ack sent after the command is applied and
// the resulting snapshot published.

use std::sync::Arc;

use log::{debug, info};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::EstimatorConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::estimator::{build_estimator, EstimatorSnapshot, MotionEstimator, TrackerEvent};
use crate::types::{AccelSample, OrientationSample, SensorSample};

const COMMAND_QUEUE_DEPTH: usize = 500;
const EVENT_BUFFER: usize = 256;

#[derive(Debug)]
pub enum Command {
    Orientation(OrientationSample),
    Accel(AccelSample),
    Start(oneshot::Sender<()>),
    Stop(oneshot::Sender<()>),
    Reset(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

impl From<SensorSample> for Command {
    fn from(sample: SensorSample) -> Self {
        match sample {
            SensorSample::Orientation(s) => Command::Orientation(s),
            SensorSample::Accel(s) => Command::Accel(s),
        }
    }
}

pub struct Engine;

impl Engine {
    /// Build the configured estimator and spawn its writer task.
    pub fn spawn(config: EstimatorConfig) -> TrackerResult<(EngineHandle, JoinHandle<()>)> {
        let estimator = build_estimator(&config)?;
        let (commands, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (snapshot_tx, snapshots) = watch::channel(Arc::new(estimator.snapshot()));
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        info!(target: "engine", "spawning {:?} estimator", config.kind);
        let task = tokio::spawn(run(estimator, rx, snapshot_tx, events.clone()));
        Ok((EngineHandle { commands, snapshots, events }, task))
    }
}

async fn run(
    mut estimator: Box<dyn MotionEstimator>,
    mut rx: mpsc::Receiver<Command>,
    snapshots: watch::Sender<Arc<EstimatorSnapshot>>,
    events: broadcast::Sender<TrackerEvent>,
) {
    let mut processed = 0u64;
    while let Some(command) = rx.recv().await {
        let mut ack = None;
        let mut shutdown = false;
        let emitted = match command {
            Command::Orientation(sample) => estimator.feed_orientation(&sample),
            Command::Accel(sample) => estimator.feed_accel(&sample),
            Command::Start(tx) => {
                estimator.start();
                info!(target: "engine", "start -> {:?}", estimator.phase());
                ack = Some(tx);
                Vec::new()
            }
            Command::Stop(tx) => {
                estimator.stop();
                info!(target: "engine", "stop");
                ack = Some(tx);
                Vec::new()
            }
            Command::Reset(tx) => {
                estimator.reset();
                info!(target: "engine", "reset -> {:?}", estimator.phase());
                ack = Some(tx);
                Vec::new()
            }
            Command::Shutdown(tx) => {
                ack = Some(tx);
                shutdown = true;
                Vec::new()
            }
        };

        for event in emitted {
            event.log();
            // no subscribers is fine
            let _ = events.send(event);
        }
        snapshots.send_replace(Arc::new(estimator.snapshot()));
        if let Some(tx) = ack {
            let _ = tx.send(());
        }
        processed += 1;
        if shutdown {
            break;
        }
    }
    debug!(target: "engine", "writer exiting after {} commands", processed);
}

/// Cloneable front end to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Arc<EstimatorSnapshot>>,
    events: broadcast::Sender<TrackerEvent>,
}

impl EngineHandle {
    pub async fn push(&self, sample: SensorSample) -> TrackerResult<()> {
        self.send(sample.into()).await
    }

    pub async fn push_orientation(&self, sample: OrientationSample) -> TrackerResult<()> {
        self.send(Command::Orientation(sample)).await
    }

    pub async fn push_accel(&self, sample: AccelSample) -> TrackerResult<()> {
        self.send(Command::Accel(sample)).await
    }

    /// Begin (or resume) integration. Returns once applied.
    pub async fn start(&self) -> TrackerResult<()> {
        self.control(Command::Start).await
    }

    /// Every sample pushed after this returns is processed while stopped.
    pub async fn stop(&self) -> TrackerResult<()> {
        self.control(Command::Stop).await
    }

    pub async fn reset(&self) -> TrackerResult<()> {
        self.control(Command::Reset).await
    }

    /// Drain everything queued before this call, then stop the writer.
    pub async fn shutdown(&self) -> TrackerResult<()> {
        self.control(Command::Shutdown).await
    }

    /// Latest published state. Never blocks the writer.
    pub fn snapshot(&self) -> Arc<EstimatorSnapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    async fn send(&self, command: Command) -> TrackerResult<()> {
        self.commands.send(command).await.map_err(|_| TrackerError::EngineClosed)
    }

    async fn control(&self, make: fn(oneshot::Sender<()>) -> Command) -> TrackerResult<()> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await.map_err(|_| TrackerError::EngineClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrator::IntegratorPhase;
    use crate::types::Vec3;
    use approx::assert_relative_eq;

    const DT_NS: u64 = 100_000_000;

    fn plain_config() -> EstimatorConfig {
        let mut config = EstimatorConfig::default();
        config.integration.lowpass_alpha = 0.0;
        config.integration.accel_deadzone = 0.0;
        config.integration.velocity_damping = 1.0;
        config
    }

    #[tokio::test]
    async fn test_samples_then_shutdown_drains_queue() {
        let (handle, task) = Engine::spawn(plain_config()).unwrap();
        handle.start().await.unwrap();
        for i in 0..3 {
            handle.push_accel(AccelSample::new(1.0, 0.0, 0.0, i * DT_NS)).await.unwrap();
        }
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        let snap = handle.snapshot();
        assert_relative_eq!(snap.kinematics.velocity, Vec3::new(0.2, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(snap.kinematics.position, Vec3::new(0.03, 0.0, 0.0), epsilon = 1e-12);
        assert_eq!(snap.path.len(), 2);
    }

    #[tokio::test]
    async fn test_samples_after_stop_ack_processed_idle() {
        let (handle, task) = Engine::spawn(plain_config()).unwrap();
        handle.start().await.unwrap();
        handle.push_accel(AccelSample::new(1.0, 0.0, 0.0, 0)).await.unwrap();
        handle.push_accel(AccelSample::new(1.0, 0.0, 0.0, DT_NS)).await.unwrap();
        handle.stop().await.unwrap();
        let stopped = handle.snapshot();
        assert_eq!(stopped.phase, IntegratorPhase::Idle);

        for i in 2..10 {
            handle.push_accel(AccelSample::new(5.0, 5.0, 5.0, i * DT_NS)).await.unwrap();
        }
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        let after = handle.snapshot();
        assert_eq!(after.kinematics, stopped.kinematics);
        assert_eq!(after.path, stopped.path);
    }

    #[tokio::test]
    async fn test_reset_publishes_cleared_snapshot() {
        let (handle, _task) = Engine::spawn(plain_config()).unwrap();
        handle.start().await.unwrap();
        for i in 0..5 {
            handle.push_accel(AccelSample::new(1.0, 0.0, 0.0, i * DT_NS)).await.unwrap();
        }
        handle.reset().await.unwrap();
        let snap = handle.snapshot();
        assert_eq!(snap.kinematics.position, Vec3::zeros());
        assert!(snap.path.is_empty());
        assert_eq!(snap.phase, IntegratorPhase::Seeding);
    }

    #[tokio::test]
    async fn test_old_snapshot_survives_later_writes() {
        let (handle, _task) = Engine::spawn(plain_config()).unwrap();
        handle.start().await.unwrap();
        handle.push_accel(AccelSample::new(1.0, 0.0, 0.0, 0)).await.unwrap();
        handle.push_accel(AccelSample::new(1.0, 0.0, 0.0, DT_NS)).await.unwrap();
        handle.stop().await.unwrap();
        let held = handle.snapshot();
        let held_points = held.path.to_vec();

        handle.start().await.unwrap();
        for i in 20..30 {
            handle.push_accel(AccelSample::new(1.0, 0.0, 0.0, i * DT_NS)).await.unwrap();
        }
        handle.reset().await.unwrap();
        assert_eq!(held.path.to_vec(), held_points);
        assert_eq!(held.path.len(), 1);
    }

    #[tokio::test]
    async fn test_events_broadcast() {
        let (handle, _task) = Engine::spawn(plain_config()).unwrap();
        let mut events = handle.subscribe();
        handle.start().await.unwrap();
        handle.push_accel(AccelSample::new(1.0, 0.0, 0.0, 42)).await.unwrap();
        handle.push_orientation(OrientationSample::new(vec![0.0, 0.0], 43)).await.unwrap();

        assert_eq!(events.recv().await.unwrap(), TrackerEvent::ClockSeeded { timestamp_ns: 42 });
        assert!(matches!(
            events.recv().await.unwrap(),
            TrackerEvent::InvalidSample { timestamp_ns: 43, .. }
        ));
    }

    #[tokio::test]
    async fn test_closed_engine_reports_error() {
        let (handle, task) = Engine::spawn(plain_config()).unwrap();
        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(matches!(handle.start().await, Err(TrackerError::EngineClosed)));
        assert!(matches!(
            handle.push_accel(AccelSample::new(0.0, 0.0, 0.0, 0)).await,
            Err(TrackerError::EngineClosed)
        ));
    }

    #[test]
    fn test_spawn_rejects_invalid_config() {
        let mut config = plain_config();
        config.path_capacity = 0;
        // fails before touching the runtime
        assert!(matches!(Engine::spawn(config), Err(TrackerError::InvalidConfig(_))));
    }
}
