//! Forecasting library for short-horizon sequence prediction
//!
//! This crate provides the core functionality for:
//! - Loading and hot-swapping immutable model artifacts
//! - Validating prediction requests against the model's input window
//! - Batched sequence-to-sequence inference
//! - Prometheus metrics with cross-process aggregation
//! - Health reporting and structured logging

pub mod error;
pub mod health;
pub mod loader;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod service;
pub mod validator;

pub use error::{
    InferenceError, LoadError, ModelNotReady, ServiceError, StatusClass, ValidationError,
    ValidationReason,
};
pub use health::{HealthResponse, HealthStatus};
pub use loader::{LoadOutcome, LoaderStatus, ModelArtifact, ModelLoader, ModelState};
pub use models::*;
pub use observability::{MetricsRecorder, MetricsSnapshot, SnapshotStore, StructuredLogger};
pub use predictor::{Forecaster, PredictionEngine};
pub use service::{ForecastService, ServiceConfig};
pub use validator::RequestValidator;
