//! The request pipeline: validate, infer, record, respond
//!
//! [`ForecastService`] composes the loader, validator, engine and metrics
//! recorder into plain method calls, so the whole request cycle runs in
//! tests without an HTTP stack. The server crate only maps its results onto
//! status codes.

use crate::error::{InferenceError, ModelNotReady, ServiceError, StatusClass, ValidationError};
use crate::health::HealthResponse;
use crate::loader::{LoadOutcome, LoaderStatus, ModelLoader, ModelState};
use crate::models::{ForecastShape, ModelInfo, PredictionRequest, PredictionResponse};
use crate::observability::{MetricsRecorder, SnapshotStore, StructuredLogger, PREDICT_ENDPOINT};
use crate::predictor::{InferenceStats, PredictionEngine, DEFAULT_SLOW_INFERENCE};
use crate::validator::{RequestValidator, DEFAULT_MAX_BATCH_SIZE};
use serde_json::Value;
use std::io;
use std::time::{Duration, Instant};
use tracing::warn;

/// Deployment parameters of one serving process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub shape: ForecastShape,
    pub max_batch_size: usize,
    pub slow_inference: Duration,
    pub worker_id: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            shape: ForecastShape::default(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            slow_inference: DEFAULT_SLOW_INFERENCE,
            worker_id: format!("worker-{}", std::process::id()),
        }
    }
}

pub struct ForecastService {
    config: ServiceConfig,
    loader: ModelLoader,
    validator: RequestValidator,
    engine: PredictionEngine,
    metrics: MetricsRecorder,
    logger: StructuredLogger,
    snapshots: Option<SnapshotStore>,
}

impl ForecastService {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            loader: ModelLoader::new(config.shape),
            validator: RequestValidator::new(config.shape.input_steps, config.max_batch_size),
            engine: PredictionEngine::new(config.slow_inference),
            metrics: MetricsRecorder::new(),
            logger: StructuredLogger::new(config.worker_id.clone()),
            snapshots: None,
            config,
        }
    }

    /// Share metrics with other workers through `store`
    pub fn with_snapshot_store(mut self, store: SnapshotStore) -> Self {
        self.snapshots = Some(store);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn loader(&self) -> &ModelLoader {
        &self.loader
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    pub fn inference_stats(&self) -> InferenceStats {
        self.engine.stats()
    }

    /// Load (or reload) the artifact behind `reference`; blocks the caller
    pub fn load_model(&self, reference: &str) -> LoadOutcome {
        let outcome = self.loader.load(reference);
        self.metrics.observe_model_load(outcome.is_loaded());

        let active = self.loader.get_active().ok();
        self.metrics.set_model(active.as_ref().map(|a| a.version()));

        match &outcome {
            LoadOutcome::Loaded {
                version,
                duration_ms,
            } => self.logger.log_model_loaded(reference, version, *duration_ms),
            LoadOutcome::Failed { error } => self.logger.log_model_load_failed(
                reference,
                &error.to_string(),
                active.as_ref().map(|a| a.version()),
            ),
        }
        outcome
    }

    pub fn state(&self) -> ModelState {
        self.loader.state()
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse::from_state(self.loader.state())
    }

    pub fn info(&self) -> Result<ModelInfo, ModelNotReady> {
        Ok(self.loader.get_active()?.info())
    }

    pub fn status(&self) -> LoaderStatus {
        self.loader.status()
    }

    /// Run the full pipeline on a raw request body
    pub fn predict(&self, body: &[u8]) -> Result<PredictionResponse, ServiceError> {
        self.instrumented(|| self.validator.parse(body))
    }

    /// Run the full pipeline on an already-decoded JSON payload
    pub fn predict_json(&self, payload: &Value) -> Result<PredictionResponse, ServiceError> {
        self.instrumented(|| self.validator.validate(payload))
    }

    /// Run the full pipeline on typed sequences
    pub fn predict_sequences(
        &self,
        sequences: Vec<Vec<f64>>,
    ) -> Result<PredictionResponse, ServiceError> {
        self.instrumented(move || self.validator.validate_sequences(sequences))
    }

    fn instrumented<F>(&self, validate: F) -> Result<PredictionResponse, ServiceError>
    where
        F: FnOnce() -> Result<PredictionRequest, ValidationError>,
    {
        let start = Instant::now();
        let result = self.run(validate);
        let latency = start.elapsed();

        let status = match &result {
            Ok(_) => StatusClass::Success,
            Err(e) => e.status_class(),
        };
        self.metrics.observe(PREDICT_ENDPOINT, status, latency);

        match &result {
            Ok(response) => {
                self.metrics.observe_batch_size(response.predictions.len());
                self.logger.log_prediction_served(
                    response.predictions.len(),
                    &response.model_version,
                    latency.as_secs_f64() * 1000.0,
                    latency > self.config.slow_inference,
                );
            }
            Err(ServiceError::Validation(e)) => {
                self.metrics.observe_validation_failure(e.reason());
                self.logger.log_request_rejected(e.reason().as_str(), 400);
            }
            Err(ServiceError::NotReady(e)) => {
                self.logger.log_request_rejected(e.state.as_str(), 503);
            }
            Err(ServiceError::Inference(e)) => {
                self.logger.log_inference_failed(e.kind(), &e.to_string());
            }
        }
        result
    }

    fn run<F>(&self, validate: F) -> Result<PredictionResponse, ServiceError>
    where
        F: FnOnce() -> Result<PredictionRequest, ValidationError>,
    {
        // not-ready wins over validation so clients back off instead of fixing payloads
        self.loader.get_active()?;
        let request = validate()?;

        let artifact = self
            .loader
            .get_active()
            .map_err(|_| InferenceError::ModelUnavailable)?;
        Ok(self.engine.predict(&request, &artifact)?)
    }

    /// Write this worker's snapshot when a store is configured
    pub fn flush_metrics(&self) -> io::Result<()> {
        match &self.snapshots {
            Some(store) => store.write(&self.metrics.snapshot(&self.config.worker_id)),
            None => Ok(()),
        }
    }

    /// Exposition text: the aggregate of every worker when a store is
    /// configured, this process's recorder otherwise
    pub fn render_metrics(&self) -> String {
        let Some(store) = &self.snapshots else {
            return self.metrics.render();
        };
        let aggregated = self
            .flush_metrics()
            .and_then(|_| store.render_aggregate());
        match aggregated {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, dir = %store.dir().display(), "Metrics aggregation failed, serving local metrics");
                self.metrics.render()
            }
        }
    }
}
