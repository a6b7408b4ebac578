//! Per-process Prometheus metrics

use super::snapshot::MetricsSnapshot;
use crate::error::{StatusClass, ValidationReason};
use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{
    histogram_opts, opts, Encoder, GaugeVec, Histogram, HistogramVec, IntCounterVec, IntGauge,
    Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Buckets for sequences per prediction request
const BATCH_SIZE_BUCKETS: &[f64] = &[1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0, 512.0];

/// Endpoint label used for prediction requests
pub const PREDICT_ENDPOINT: &str = "/predict";

pub const REQUESTS_TOTAL: &str = "forecast_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "forecast_request_duration_seconds";
pub const VALIDATION_FAILURES_TOTAL: &str = "forecast_validation_failures_total";
pub const BATCH_SIZE: &str = "forecast_batch_size";
pub const MODEL_LOADS_TOTAL: &str = "forecast_model_loads_total";
pub const MODEL_READY: &str = "forecast_model_ready";
pub const MODEL_INFO: &str = "forecast_model_info";

struct RecorderInner {
    registry: Registry,
    requests_total: IntCounterVec,
    request_duration_seconds: HistogramVec,
    validation_failures_total: IntCounterVec,
    batch_size: Histogram,
    model_loads_total: IntCounterVec,
    model_ready: IntGauge,
    model_info: GaugeVec,
}

impl RecorderInner {
    fn new() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            opts!(REQUESTS_TOTAL, "Requests handled, by endpoint and status class"),
            &["endpoint", "status"],
        )
        .expect("Failed to create requests_total");

        let request_duration_seconds = HistogramVec::new(
            histogram_opts!(
                REQUEST_DURATION_SECONDS,
                "End-to-end request latency",
                LATENCY_BUCKETS.to_vec()
            ),
            &["endpoint"],
        )
        .expect("Failed to create request_duration_seconds");

        let validation_failures_total = IntCounterVec::new(
            opts!(VALIDATION_FAILURES_TOTAL, "Rejected prediction requests, by reason"),
            &["reason"],
        )
        .expect("Failed to create validation_failures_total");

        let batch_size = Histogram::with_opts(histogram_opts!(
            BATCH_SIZE,
            "Sequences per successful prediction request",
            BATCH_SIZE_BUCKETS.to_vec()
        ))
        .expect("Failed to create batch_size");

        let model_loads_total = IntCounterVec::new(
            opts!(MODEL_LOADS_TOTAL, "Model artifact load attempts, by outcome"),
            &["outcome"],
        )
        .expect("Failed to create model_loads_total");

        let model_ready = IntGauge::new(MODEL_READY, "1 when an artifact is serving")
            .expect("Failed to create model_ready");

        let model_info = GaugeVec::new(
            opts!(MODEL_INFO, "Information about the active model artifact"),
            &["version"],
        )
        .expect("Failed to create model_info");

        registry
            .register(Box::new(requests_total.clone()))
            .expect("Failed to register requests_total");
        registry
            .register(Box::new(request_duration_seconds.clone()))
            .expect("Failed to register request_duration_seconds");
        registry
            .register(Box::new(validation_failures_total.clone()))
            .expect("Failed to register validation_failures_total");
        registry
            .register(Box::new(batch_size.clone()))
            .expect("Failed to register batch_size");
        registry
            .register(Box::new(model_loads_total.clone()))
            .expect("Failed to register model_loads_total");
        registry
            .register(Box::new(model_ready.clone()))
            .expect("Failed to register model_ready");
        registry
            .register(Box::new(model_info.clone()))
            .expect("Failed to register model_info");

        // zero-valued series exist before the first request
        for class in StatusClass::ALL {
            requests_total.with_label_values(&[PREDICT_ENDPOINT, class.as_str()]);
        }
        request_duration_seconds.with_label_values(&[PREDICT_ENDPOINT]);
        for reason in ValidationReason::ALL {
            validation_failures_total.with_label_values(&[reason.as_str()]);
        }
        for outcome in ["success", "failure"] {
            model_loads_total.with_label_values(&[outcome]);
        }

        Self {
            registry,
            requests_total,
            request_duration_seconds,
            validation_failures_total,
            batch_size,
            model_loads_total,
            model_ready,
            model_info,
        }
    }
}

/// Records request outcomes for one process.
///
/// Every recorder owns its own registry; clones share it. Recorders in
/// different processes are combined through [`MetricsSnapshot`]s, never by
/// reading each other's memory.
#[derive(Clone)]
pub struct MetricsRecorder {
    inner: Arc<RecorderInner>,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RecorderInner::new()),
        }
    }

    /// Count one request and record its latency
    pub fn observe(&self, endpoint: &str, status: StatusClass, latency: Duration) {
        self.inner
            .requests_total
            .with_label_values(&[endpoint, status.as_str()])
            .inc();
        self.inner
            .request_duration_seconds
            .with_label_values(&[endpoint])
            .observe(latency.as_secs_f64());
    }

    pub fn observe_validation_failure(&self, reason: ValidationReason) {
        self.inner
            .validation_failures_total
            .with_label_values(&[reason.as_str()])
            .inc();
    }

    pub fn observe_batch_size(&self, sequences: usize) {
        self.inner.batch_size.observe(sequences as f64);
    }

    pub fn observe_model_load(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.inner
            .model_loads_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Publish the active model version, or mark the model as not serving
    pub fn set_model(&self, version: Option<&str>) {
        match version {
            Some(version) => {
                self.inner.model_info.with_label_values(&[version]).set(1.0);
                self.inner.model_ready.set(1);
            }
            None => self.inner.model_ready.set(0),
        }

        // the new series exists before the old ones go, so a scrape never sees none
        let stale: Vec<String> = self
            .inner
            .model_info
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .flat_map(|metric| metric.get_label())
            .map(|label| label.get_value().to_string())
            .filter(|value| Some(value.as_str()) != version)
            .collect();
        for value in stale {
            let _ = self.inner.model_info.remove_label_values(&[value.as_str()]);
        }
    }

    pub fn request_count(&self, endpoint: &str, status: StatusClass) -> u64 {
        self.inner
            .requests_total
            .with_label_values(&[endpoint, status.as_str()])
            .get()
    }

    pub fn validation_failure_count(&self, reason: ValidationReason) -> u64 {
        self.inner
            .validation_failures_total
            .with_label_values(&[reason.as_str()])
            .get()
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.inner.registry.gather()
    }

    /// Render all series in the Prometheus text exposition format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.gather(), &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Serializable copy of this recorder's current values
    pub fn snapshot(&self, worker: &str) -> MetricsSnapshot {
        MetricsSnapshot::from_families(worker, &self.gather())
    }
}
