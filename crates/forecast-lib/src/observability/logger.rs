//! Structured event logging with tracing

use tracing::{debug, error, info, warn};

/// Emits the service's named events with a consistent field set
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    worker_id: String,
}

impl StructuredLogger {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Log server start
    pub fn log_server_started(&self, addr: &str, model_uri: &str) {
        info!(
            event = "server_started",
            worker = %self.worker_id,
            addr = %addr,
            model_uri = %model_uri,
            "Forecast server listening"
        );
    }

    pub fn log_server_shutdown(&self) {
        info!(
            event = "server_shutdown",
            worker = %self.worker_id,
            "Forecast server stopped"
        );
    }

    /// Log a successful model artifact swap
    pub fn log_model_loaded(&self, reference: &str, version: &str, duration_ms: u64) {
        info!(
            event = "model_loaded",
            worker = %self.worker_id,
            reference = %reference,
            model_version = %version,
            duration_ms = duration_ms,
            "Model artifact loaded"
        );
    }

    /// Log a failed load; `serving` names the version still active, if any
    pub fn log_model_load_failed(&self, reference: &str, error: &str, serving: Option<&str>) {
        match serving {
            Some(version) => warn!(
                event = "model_load_failed",
                worker = %self.worker_id,
                reference = %reference,
                error = %error,
                serving_version = %version,
                "Model reload failed, keeping active artifact"
            ),
            None => error!(
                event = "model_load_failed",
                worker = %self.worker_id,
                reference = %reference,
                error = %error,
                "Model load failed, no artifact is serving"
            ),
        }
    }

    pub fn log_prediction_served(
        &self,
        batch_size: usize,
        model_version: &str,
        latency_ms: f64,
        slow: bool,
    ) {
        if slow {
            warn!(
                event = "prediction_served",
                worker = %self.worker_id,
                batch_size = batch_size,
                model_version = %model_version,
                latency_ms = latency_ms,
                "Slow prediction"
            );
        } else {
            debug!(
                event = "prediction_served",
                worker = %self.worker_id,
                batch_size = batch_size,
                model_version = %model_version,
                latency_ms = latency_ms,
                "Prediction served"
            );
        }
    }

    pub fn log_request_rejected(&self, reason: &str, status: u16) {
        debug!(
            event = "request_rejected",
            worker = %self.worker_id,
            reason = %reason,
            status = status,
            "Prediction request rejected"
        );
    }

    pub fn log_inference_failed(&self, kind: &str, error: &str) {
        error!(
            event = "inference_failed",
            worker = %self.worker_id,
            kind = %kind,
            error = %error,
            "Inference failed"
        );
    }
}
