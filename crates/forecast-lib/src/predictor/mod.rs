//! Batched sequence-to-sequence inference
//!
//! The engine stacks every sequence of a request into one `(N, input_steps, 1)`
//! tensor, runs a single forward pass, and splits the `(N, output_steps)`
//! result back into per-request rows in the original order.

mod dense;
mod onnx;

pub use dense::DenseForecaster;
pub use onnx::OnnxForecaster;

use crate::error::InferenceError;
use crate::loader::ModelArtifact;
use crate::models::{PredictionRequest, PredictionResponse};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tract_onnx::prelude::tract_ndarray::{Array2, Array3};
use tracing::{debug, warn};

/// Forward passes slower than this are logged at warn level
pub const DEFAULT_SLOW_INFERENCE: Duration = Duration::from_millis(50);

/// A loaded forecasting network
pub trait Forecaster: Send + Sync {
    /// Run one forward pass over a `(N, input_steps, 1)` batch, returning `(N, output_steps)`
    fn forward(&self, batch: Array3<f32>) -> anyhow::Result<Array2<f32>>;

    /// Short name of the backing implementation
    fn kind(&self) -> &'static str;
}

/// Runs validated requests against an artifact
pub struct PredictionEngine {
    slow_inference: Duration,
    inference_count: AtomicU64,
    slow_inference_count: AtomicU64,
    sequence_count: AtomicU64,
}

impl Default for PredictionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SLOW_INFERENCE)
    }
}

impl PredictionEngine {
    pub fn new(slow_inference: Duration) -> Self {
        Self {
            slow_inference,
            inference_count: AtomicU64::new(0),
            slow_inference_count: AtomicU64::new(0),
            sequence_count: AtomicU64::new(0),
        }
    }

    /// Forecast every sequence of `request` with one forward pass of `artifact`
    pub fn predict(
        &self,
        request: &PredictionRequest,
        artifact: &ModelArtifact,
    ) -> Result<PredictionResponse, InferenceError> {
        let shape = artifact.shape();
        if request.steps() != shape.input_steps {
            return Err(InferenceError::ShapeMismatch {
                expected: vec![request.len(), shape.input_steps, 1],
                actual: vec![request.len(), request.steps(), 1],
            });
        }

        let start = Instant::now();
        let batch = stack_batch(request)?;
        let output = artifact
            .forecaster()
            .forward(batch)
            .map_err(|e| InferenceError::Forward(format!("{e:#}")))?;
        let elapsed = start.elapsed();

        if output.dim() != (request.len(), shape.output_steps) {
            return Err(InferenceError::ShapeMismatch {
                expected: vec![request.len(), shape.output_steps],
                actual: output.shape().to_vec(),
            });
        }
        let predictions = unstack(&output)?;

        self.inference_count.fetch_add(1, Ordering::Relaxed);
        self.sequence_count
            .fetch_add(request.len() as u64, Ordering::Relaxed);
        if elapsed > self.slow_inference {
            self.slow_inference_count.fetch_add(1, Ordering::Relaxed);
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                batch = request.len(),
                "Inference exceeded {}ms target",
                self.slow_inference.as_millis()
            );
        } else {
            debug!(elapsed_us = elapsed.as_micros() as u64, batch = request.len(), "Inference completed");
        }

        Ok(PredictionResponse {
            predictions,
            model_version: artifact.version().to_string(),
        })
    }

    pub fn stats(&self) -> InferenceStats {
        InferenceStats {
            total_inferences: self.inference_count.load(Ordering::Relaxed),
            slow_inferences: self.slow_inference_count.load(Ordering::Relaxed),
            total_sequences: self.sequence_count.load(Ordering::Relaxed),
        }
    }
}

/// Inference statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceStats {
    pub total_inferences: u64,
    pub slow_inferences: u64,
    pub total_sequences: u64,
}

fn stack_batch(request: &PredictionRequest) -> Result<Array3<f32>, InferenceError> {
    let (n, steps) = (request.len(), request.steps());
    let data: Vec<f32> = request
        .sequences()
        .iter()
        .flat_map(|sequence| sequence.iter().map(|&v| v as f32))
        .collect();
    let len = data.len();

    Array3::from_shape_vec((n, steps, 1), data).map_err(|_| InferenceError::ShapeMismatch {
        expected: vec![n, steps, 1],
        actual: vec![len],
    })
}

fn unstack(output: &Array2<f32>) -> Result<Vec<Vec<f64>>, InferenceError> {
    output
        .outer_iter()
        .enumerate()
        .map(|(index, row)| {
            if row.iter().any(|v| !v.is_finite()) {
                return Err(InferenceError::NumericFault { index });
            }
            Ok(row.iter().map(|&v| f64::from(v)).collect())
        })
        .collect()
}
