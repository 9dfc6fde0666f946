//! Inertial dead reckoning from a phone's rotation-vector and
//! linear-acceleration streams.
//!
//! Samples flow through [`engine::Engine`], a single writer task that owns a
//! [`estimator::MotionEstimator`]: either double integration of world-frame
//! acceleration ([`integrator::Integrator`]) or fixed-stride step counting
//! ([`stride::StrideEstimator`]).

pub mod config;
pub mod engine;
pub mod error;
pub mod estimator;
pub mod integrator;
pub mod motion;
pub mod orientation;
pub mod path;
pub mod sensors;
pub mod smoothing;
pub mod stride;
pub mod transforms;
pub mod types;

pub use config::{EstimatorConfig, EstimatorKind};
pub use engine::{Engine, EngineHandle};
pub use error::{TrackerError, TrackerResult};
pub use estimator::{EstimatorSnapshot, MotionEstimator, TrackerEvent};
pub use sensors::SensorSession;
