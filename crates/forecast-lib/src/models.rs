//! Core data models for the forecasting service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed window geometry of a forecasting model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastShape {
    /// Length of the historical window consumed by the encoder
    pub input_steps: usize,
    /// Length of the forecast horizon emitted by the decoder
    pub output_steps: usize,
}

impl ForecastShape {
    pub fn new(input_steps: usize, output_steps: usize) -> Self {
        Self {
            input_steps,
            output_steps,
        }
    }
}

impl Default for ForecastShape {
    fn default() -> Self {
        Self::new(48, 24)
    }
}

/// A validated batch of input sequences.
///
/// Only [`RequestValidator`](crate::validator::RequestValidator) constructs
/// this type, so holders can rely on the batch being non-empty and every
/// sequence having the same length with finite values.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRequest {
    sequences: Vec<Vec<f64>>,
    steps: usize,
}

impl PredictionRequest {
    pub(crate) fn new(sequences: Vec<Vec<f64>>, steps: usize) -> Self {
        Self { sequences, steps }
    }

    pub fn sequences(&self) -> &[Vec<f64>] {
        &self.sequences
    }

    /// Number of sequences in the batch
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Length shared by every sequence
    pub fn steps(&self) -> usize {
        self.steps
    }
}

/// Forecast output, one sequence per input sequence in request order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predictions: Vec<Vec<f64>>,
    pub model_version: String,
}

/// Metadata of the active artifact as exposed on `/info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub input_steps: usize,
    pub output_steps: usize,
    pub version: String,
    pub loaded_at: DateTime<Utc>,
    pub name: String,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// JSON error body shared by every failing endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, detail: Option<Value>) -> Self {
        Self {
            error: error.into(),
            detail,
        }
    }
}
