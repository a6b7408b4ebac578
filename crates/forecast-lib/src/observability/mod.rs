//! Observability infrastructure for the forecasting service
//!
//! Provides:
//! - Per-process Prometheus metrics (request counts and latency, validation failures, model state)
//! - Snapshot files for summing metrics across worker processes
//! - Structured JSON logging with tracing

mod logger;
mod recorder;
mod snapshot;

pub use logger::StructuredLogger;
pub use recorder::{
    MetricsRecorder, BATCH_SIZE, MODEL_INFO, MODEL_LOADS_TOTAL, MODEL_READY, PREDICT_ENDPOINT,
    REQUESTS_TOTAL, REQUEST_DURATION_SECONDS, VALIDATION_FAILURES_TOTAL,
};
pub use snapshot::{
    aggregate, render_families, BucketSnapshot, FamilyKind, FamilySnapshot, HistogramSnapshot,
    MetricsSnapshot, SeriesSnapshot, SnapshotStore,
};
