//! Error taxonomy for the inference pipeline
//!
//! Every failure a request can hit is one of four kinds:
//! - [`ValidationError`]: the client sent a malformed batch (400)
//! - [`ModelNotReady`]: no artifact is active yet (503)
//! - [`InferenceError`]: the forward pass failed (500)
//! - [`LoadError`]: an artifact could not be loaded; surfaces as `ModelNotReady`

use crate::loader::ModelState;
use crate::models::ErrorBody;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Machine-readable validation failure reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationReason {
    InvalidJson,
    MissingField,
    InvalidType,
    EmptySequences,
    BatchTooLarge,
    LengthMismatch,
    NonNumeric,
    NonFinite,
}

impl ValidationReason {
    pub const ALL: [ValidationReason; 8] = [
        ValidationReason::InvalidJson,
        ValidationReason::MissingField,
        ValidationReason::InvalidType,
        ValidationReason::EmptySequences,
        ValidationReason::BatchTooLarge,
        ValidationReason::LengthMismatch,
        ValidationReason::NonNumeric,
        ValidationReason::NonFinite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationReason::InvalidJson => "invalid_json",
            ValidationReason::MissingField => "missing_field",
            ValidationReason::InvalidType => "invalid_type",
            ValidationReason::EmptySequences => "empty_sequences",
            ValidationReason::BatchTooLarge => "batch_too_large",
            ValidationReason::LengthMismatch => "length_mismatch",
            ValidationReason::NonNumeric => "non_numeric",
            ValidationReason::NonFinite => "non_finite",
        }
    }
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client fault: the request does not match the model's input contract
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("request body is not valid JSON")]
    InvalidJson,

    #[error("missing field `{field}`")]
    MissingField { field: &'static str },

    #[error("`{field}` has the wrong type")]
    InvalidType {
        field: &'static str,
        index: Option<usize>,
    },

    #[error("`sequences` must contain at least one sequence")]
    EmptySequences,

    #[error("batch of {received} sequences exceeds the maximum of {max}")]
    BatchTooLarge { max: usize, received: usize },

    #[error("sequence {index} has {received} values, expected {expected}")]
    LengthMismatch {
        index: usize,
        expected: usize,
        received: usize,
    },

    #[error("sequence {index} has a non-numeric value at position {position}")]
    NonNumeric { index: usize, position: usize },

    #[error("sequence {index} has a non-finite value at position {position}")]
    NonFinite { index: usize, position: usize },
}

impl ValidationError {
    pub fn reason(&self) -> ValidationReason {
        match self {
            ValidationError::InvalidJson => ValidationReason::InvalidJson,
            ValidationError::MissingField { .. } => ValidationReason::MissingField,
            ValidationError::InvalidType { .. } => ValidationReason::InvalidType,
            ValidationError::EmptySequences => ValidationReason::EmptySequences,
            ValidationError::BatchTooLarge { .. } => ValidationReason::BatchTooLarge,
            ValidationError::LengthMismatch { .. } => ValidationReason::LengthMismatch,
            ValidationError::NonNumeric { .. } => ValidationReason::NonNumeric,
            ValidationError::NonFinite { .. } => ValidationReason::NonFinite,
        }
    }

    /// Index of the offending sequence, when the failure is tied to one
    pub fn index(&self) -> Option<usize> {
        match self {
            ValidationError::InvalidType { index, .. } => *index,
            ValidationError::LengthMismatch { index, .. }
            | ValidationError::NonNumeric { index, .. }
            | ValidationError::NonFinite { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Client-safe detail object for the error body
    pub fn detail(&self) -> Option<Value> {
        match self {
            ValidationError::InvalidJson | ValidationError::EmptySequences => None,
            ValidationError::MissingField { field } => Some(json!({ "field": field })),
            ValidationError::InvalidType { field, index } => match index {
                Some(index) => Some(json!({ "field": field, "index": index })),
                None => Some(json!({ "field": field })),
            },
            ValidationError::BatchTooLarge { max, received } => {
                Some(json!({ "max": max, "received": received }))
            }
            ValidationError::LengthMismatch { index, .. } => Some(json!({ "index": index })),
            ValidationError::NonNumeric { index, position }
            | ValidationError::NonFinite { index, position } => {
                Some(json!({ "index": index, "position": position }))
            }
        }
    }
}

/// Transient server state: no artifact can serve the request right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("model not ready (state: {state})")]
pub struct ModelNotReady {
    pub state: ModelState,
}

/// Server fault during the forward pass
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    #[error("model became unavailable during the request")]
    ModelUnavailable,

    #[error("tensor shape {actual:?} does not match expected {expected:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("non-finite value in model output for sequence {index}")]
    NumericFault { index: usize },

    #[error("forward pass failed: {0}")]
    Forward(String),
}

impl InferenceError {
    pub fn kind(&self) -> &'static str {
        match self {
            InferenceError::ModelUnavailable => "model_unavailable",
            InferenceError::ShapeMismatch { .. } => "shape_mismatch",
            InferenceError::NumericFault { .. } => "numeric_fault",
            InferenceError::Forward(_) => "forward_failed",
        }
    }
}

/// Startup or reload fault while turning a reference into an artifact
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error("unsupported artifact reference: {0}")]
    UnsupportedReference(String),

    #[error("failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("failed to deserialize model: {0}")]
    Deserialize(String),
}

impl LoadError {
    pub fn kind(&self) -> &'static str {
        match self {
            LoadError::UnsupportedReference(_) => "unsupported_reference",
            LoadError::Io { .. } => "io",
            LoadError::Manifest(_) => "invalid_manifest",
            LoadError::ChecksumMismatch { .. } => "checksum_mismatch",
            LoadError::ShapeMismatch(_) => "shape_mismatch",
            LoadError::Deserialize(_) => "deserialize",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        LoadError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// HTTP status class used to key request metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusClass {
    #[serde(rename = "2xx")]
    Success,
    #[serde(rename = "4xx")]
    ClientError,
    #[serde(rename = "5xx")]
    ServerError,
}

impl StatusClass {
    pub const ALL: [StatusClass; 3] = [
        StatusClass::Success,
        StatusClass::ClientError,
        StatusClass::ServerError,
    ];

    pub fn from_code(code: u16) -> Self {
        match code {
            400..=499 => StatusClass::ClientError,
            500..=599 => StatusClass::ServerError,
            _ => StatusClass::Success,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusClass::Success => "2xx",
            StatusClass::ClientError => "4xx",
            StatusClass::ServerError => "5xx",
        }
    }
}

/// Any failure surfaced by [`ForecastService`](crate::service::ForecastService)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    NotReady(#[from] ModelNotReady),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl ServiceError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 400,
            ServiceError::NotReady(_) => 503,
            ServiceError::Inference(_) => 500,
        }
    }

    pub fn status_class(&self) -> StatusClass {
        StatusClass::from_code(self.status_code())
    }

    /// Client-facing body; never carries internal error messages
    pub fn body(&self) -> ErrorBody {
        match self {
            ServiceError::Validation(e) => ErrorBody::new(e.reason().as_str(), e.detail()),
            ServiceError::NotReady(e) => ErrorBody::new(
                "model_not_ready",
                Some(json!({ "state": e.state.as_str() })),
            ),
            ServiceError::Inference(e) => {
                ErrorBody::new("inference_error", Some(json!({ "kind": e.kind() })))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch_body_carries_index() {
        let err = ServiceError::from(ValidationError::LengthMismatch {
            index: 0,
            expected: 48,
            received: 47,
        });
        assert_eq!(err.status_code(), 400);

        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(body, json!({"error": "length_mismatch", "detail": {"index": 0}}));
    }

    #[test]
    fn test_empty_sequences_body_has_no_detail() {
        let body = serde_json::to_value(ServiceError::from(ValidationError::EmptySequences).body())
            .unwrap();
        assert_eq!(body, json!({"error": "empty_sequences"}));
    }

    #[test]
    fn test_inference_error_hides_internal_message() {
        let err = ServiceError::from(InferenceError::Forward("tract: shape (3,47,1) vs (3,48,1)".into()));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.status_class(), StatusClass::ServerError);

        let rendered = serde_json::to_string(&err.body()).unwrap();
        assert!(rendered.contains("forward_failed"));
        assert!(!rendered.contains("tract"));
    }

    #[test]
    fn test_not_ready_maps_to_503() {
        let err = ServiceError::from(ModelNotReady {
            state: ModelState::Loading,
        });
        assert_eq!(err.status_code(), 503);
        assert_eq!(err.body().error, "model_not_ready");
    }

    #[test]
    fn test_status_class_from_code() {
        assert_eq!(StatusClass::from_code(200), StatusClass::Success);
        assert_eq!(StatusClass::from_code(404), StatusClass::ClientError);
        assert_eq!(StatusClass::from_code(503), StatusClass::ServerError);
    }

    #[test]
    fn test_reason_codes_are_snake_case() {
        for reason in ValidationReason::ALL {
            let encoded = serde_json::to_value(reason).unwrap();
            assert_eq!(encoded, Value::String(reason.as_str().to_string()));
        }
    }
}
