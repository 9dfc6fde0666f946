use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use serde::Serialize;

use dead_reckoning_rs::config::{EstimatorConfig, EstimatorKind};
use dead_reckoning_rs::engine::Engine;
use dead_reckoning_rs::estimator::EstimatorSnapshot;
use dead_reckoning_rs::sensors::{load_log, SensorSession};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum EstimatorArg {
    Integration,
    Stride,
}

impl From<EstimatorArg> for EstimatorKind {
    fn from(arg: EstimatorArg) -> Self {
        match arg {
            EstimatorArg::Integration => EstimatorKind::DoubleIntegration,
            EstimatorArg::Stride => EstimatorKind::Stride,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "dead_reckoning")]
#[command(about = "Replay a recorded sensor log through the dead-reckoning engine", long_about = None)]
struct Args {
    /// JSON-lines sensor log (optionally .gz)
    #[arg(long)]
    log: PathBuf,

    /// JSON config file; absent fields keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Position estimator
    #[arg(long, value_enum)]
    estimator: Option<EstimatorArg>,

    /// Output JSON path (default: dead_reckoning_<timestamp>.json)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Only replay the first N samples
    #[arg(long)]
    stop_after: Option<usize>,

    #[arg(long)]
    lowpass_alpha: Option<f64>,

    #[arg(long)]
    stationary_threshold: Option<f64>,

    #[arg(long)]
    stationary_count: Option<u32>,

    #[arg(long)]
    deadzone: Option<f64>,

    #[arg(long)]
    damping: Option<f64>,

    #[arg(long)]
    bias_rate: Option<f64>,

    #[arg(long)]
    position_epsilon: Option<f64>,

    /// Largest accepted gap between accel samples, seconds
    #[arg(long)]
    dt_max: Option<f64>,

    #[arg(long)]
    path_capacity: Option<usize>,

    /// Stride length in meters (stride estimator)
    #[arg(long)]
    stride_length: Option<f64>,
}

impl Args {
    fn build_config(&self) -> Result<EstimatorConfig> {
        let mut config = match &self.config {
            Some(path) => EstimatorConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => EstimatorConfig::default(),
        };
        if let Some(kind) = self.estimator {
            config.kind = kind.into();
        }
        let i = &mut config.integration;
        if let Some(v) = self.lowpass_alpha {
            i.lowpass_alpha = v;
        }
        if let Some(v) = self.stationary_threshold {
            i.stationary_threshold = v;
        }
        if let Some(v) = self.stationary_count {
            i.stationary_required_count = v;
        }
        if let Some(v) = self.deadzone {
            i.accel_deadzone = v;
        }
        if let Some(v) = self.damping {
            i.velocity_damping = v;
        }
        if let Some(v) = self.bias_rate {
            i.bias_learning_rate = v;
        }
        if self.position_epsilon.is_some() {
            i.position_epsilon = self.position_epsilon;
        }
        if let Some(v) = self.dt_max {
            i.dt_max = v;
        }
        if let Some(v) = self.path_capacity {
            config.path_capacity = v;
        }
        if let Some(v) = self.stride_length {
            config.stride.stride_length_m = v;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Serialize)]
struct ReplayOutput<'a> {
    generated_at: String,
    log: String,
    samples_forwarded: u64,
    config: &'a EstimatorConfig,
    snapshot: &'a EstimatorSnapshot,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = args.build_config()?;

    println!("[{}] Dead reckoning replay", ts_now());
    println!("  Log: {}", args.log.display());
    println!("  Estimator: {:?}", config.kind);

    let mut samples = load_log(&args.log).with_context(|| format!("reading {}", args.log.display()))?;
    if let Some(n) = args.stop_after {
        samples.truncate(n);
    }

    let (handle, task) = Engine::spawn(config.clone())?;
    handle.start().await?;

    let session = SensorSession::open(futures::stream::iter(samples), handle.clone());
    let forwarded = session.finished().await?;
    handle.shutdown().await?;
    task.await?;

    let snapshot = handle.snapshot();
    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("dead_reckoning_{}.json", ts_now_clean())));
    let output = ReplayOutput {
        generated_at: Utc::now().to_rfc3339(),
        log: args.log.display().to_string(),
        samples_forwarded: forwarded,
        config: &config,
        snapshot: snapshot.as_ref(),
    };
    std::fs::write(&output_path, serde_json::to_string_pretty(&output)?)?;

    let k = &snapshot.kinematics;
    println!("\n=== Final State ===");
    println!("Samples replayed: {}", forwarded);
    println!("Position: ({:.3}, {:.3}, {:.3}) m", k.position.x, k.position.y, k.position.z);
    println!("Velocity: ({:.3}, {:.3}, {:.3}) m/s", k.velocity.x, k.velocity.y, k.velocity.z);
    println!("Steps integrated: {}", snapshot.steps_integrated);
    if config.kind == EstimatorKind::Stride {
        println!("Steps detected: {}", snapshot.steps_detected);
    }
    println!("Path points: {}", snapshot.path.len());
    println!("[{}] Saved to {}", ts_now(), output_path.display());

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
