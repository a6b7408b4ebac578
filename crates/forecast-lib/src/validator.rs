//! Request validation
//!
//! Turns a loosely-typed JSON payload into a [`PredictionRequest`] whose
//! shape matches the model's input window. Checks run in a fixed order and
//! stop at the first failure.
//!
//! JSON has no literal for NaN or infinity, and serde_json rejects a number
//! that overflows `f64` (e.g. `1e400`) while parsing. A raw body therefore
//! reports such values as `invalid_json`; `non_finite` is only produced for
//! typed input passed to [`RequestValidator::validate_sequences`].

use crate::error::ValidationError;
use crate::models::PredictionRequest;
use serde_json::Value;

/// Default upper bound on sequences per request
pub const DEFAULT_MAX_BATCH_SIZE: usize = 256;

/// Enforces the fixed input contract on incoming requests
#[derive(Debug, Clone, Copy)]
pub struct RequestValidator {
    input_steps: usize,
    max_batch_size: usize,
}

impl RequestValidator {
    pub fn new(input_steps: usize, max_batch_size: usize) -> Self {
        Self {
            input_steps,
            max_batch_size,
        }
    }

    pub fn input_steps(&self) -> usize {
        self.input_steps
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Validate a raw request body
    pub fn parse(&self, body: &[u8]) -> Result<PredictionRequest, ValidationError> {
        let payload: Value =
            serde_json::from_slice(body).map_err(|_| ValidationError::InvalidJson)?;
        self.validate(&payload)
    }

    /// Validate a decoded JSON payload of the form `{"sequences": [[..], ..]}`
    pub fn validate(&self, payload: &Value) -> Result<PredictionRequest, ValidationError> {
        let sequences = payload
            .as_object()
            .and_then(|object| object.get("sequences"))
            .ok_or(ValidationError::MissingField { field: "sequences" })?;

        let sequences = sequences.as_array().ok_or(ValidationError::InvalidType {
            field: "sequences",
            index: None,
        })?;

        self.check_batch_size(sequences.len())?;

        let mut parsed = Vec::with_capacity(sequences.len());
        for (index, sequence) in sequences.iter().enumerate() {
            let values = sequence.as_array().ok_or(ValidationError::InvalidType {
                field: "sequences",
                index: Some(index),
            })?;
            self.check_length(index, values.len())?;

            let row = values
                .iter()
                .enumerate()
                .map(|(position, value)| {
                    value
                        .as_f64()
                        .ok_or(ValidationError::NonNumeric { index, position })
                })
                .collect::<Result<Vec<f64>, _>>()?;
            parsed.push(row);
        }

        check_finite(&parsed)?;
        Ok(PredictionRequest::new(parsed, self.input_steps))
    }

    /// Validate sequences that already arrived typed, e.g. from an in-process caller
    pub fn validate_sequences(
        &self,
        sequences: Vec<Vec<f64>>,
    ) -> Result<PredictionRequest, ValidationError> {
        self.check_batch_size(sequences.len())?;
        for (index, sequence) in sequences.iter().enumerate() {
            self.check_length(index, sequence.len())?;
        }
        check_finite(&sequences)?;
        Ok(PredictionRequest::new(sequences, self.input_steps))
    }

    fn check_batch_size(&self, len: usize) -> Result<(), ValidationError> {
        if len == 0 {
            return Err(ValidationError::EmptySequences);
        }
        if len > self.max_batch_size {
            return Err(ValidationError::BatchTooLarge {
                max: self.max_batch_size,
                received: len,
            });
        }
        Ok(())
    }

    fn check_length(&self, index: usize, len: usize) -> Result<(), ValidationError> {
        if len != self.input_steps {
            return Err(ValidationError::LengthMismatch {
                index,
                expected: self.input_steps,
                received: len,
            });
        }
        Ok(())
    }
}

fn check_finite(sequences: &[Vec<f64>]) -> Result<(), ValidationError> {
    for (index, sequence) in sequences.iter().enumerate() {
        if let Some(position) = sequence.iter().position(|v| !v.is_finite()) {
            return Err(ValidationError::NonFinite { index, position });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationReason;
    use serde_json::json;

    fn validator() -> RequestValidator {
        RequestValidator::new(48, 4)
    }

    #[test]
    fn test_accepts_well_formed_batch() {
        let payload = json!({ "sequences": [vec![0.0; 48], vec![1.5; 48]] });
        let request = validator().validate(&payload).unwrap();

        assert_eq!(request.len(), 2);
        assert_eq!(request.steps(), 48);
        assert_eq!(request.sequences()[1][0], 1.5);
    }

    #[test]
    fn test_integer_values_are_numeric() {
        let payload = json!({ "sequences": [vec![3; 48]] });
        let request = validator().validate(&payload).unwrap();
        assert_eq!(request.sequences()[0][47], 3.0);
    }

    #[test]
    fn test_overflowing_literal_is_invalid_json() {
        let zeros = vec!["0"; 47].join(",");
        let body = format!(r#"{{"sequences":[[{},1e400]]}}"#, zeros);
        let err = validator().parse(body.as_bytes()).unwrap_err();
        assert_eq!(err, ValidationError::InvalidJson);
    }

    #[test]
    fn test_missing_sequences_field() {
        let err = validator().validate(&json!({ "data": [] })).unwrap_err();
        assert_eq!(err.reason(), ValidationReason::MissingField);

        let err = validator().validate(&json!([[1.0]])).unwrap_err();
        assert_eq!(err.reason(), ValidationReason::MissingField);
    }

    #[test]
    fn test_sequences_must_be_an_array() {
        let err = validator()
            .validate(&json!({ "sequences": "0.1,0.2" }))
            .unwrap_err();
        assert_eq!(err.reason(), ValidationReason::InvalidType);
        assert_eq!(err.index(), None);
    }

    #[test]
    fn test_empty_sequences() {
        let err = validator().validate(&json!({ "sequences": [] })).unwrap_err();
        assert_eq!(err, ValidationError::EmptySequences);
    }

    #[test]
    fn test_batch_too_large() {
        let payload = json!({ "sequences": vec![vec![0.0; 48]; 5] });
        let err = validator().validate(&payload).unwrap_err();
        assert_eq!(err, ValidationError::BatchTooLarge { max: 4, received: 5 });
    }

    #[test]
    fn test_length_mismatch_reports_first_offending_index() {
        let payload = json!({ "sequences": [vec![0.1; 48], vec![0.1; 47], vec![0.1; 49]] });
        let err = validator().validate(&payload).unwrap_err();

        assert_eq!(err.reason(), ValidationReason::LengthMismatch);
        assert_eq!(err.index(), Some(1));
    }

    #[test]
    fn test_nested_element_must_be_an_array() {
        let payload = json!({ "sequences": [vec![0.1; 48], 0.5] });
        let err = validator().validate(&payload).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidType {
                field: "sequences",
                index: Some(1)
            }
        );
    }

    #[test]
    fn test_non_numeric_value() {
        let mut row: Vec<Value> = vec![json!(0.0); 48];
        row[7] = json!("high");
        let payload = json!({ "sequences": [row] });

        let err = validator().validate(&payload).unwrap_err();
        assert_eq!(err, ValidationError::NonNumeric { index: 0, position: 7 });
    }

    #[test]
    fn test_null_is_non_numeric() {
        let mut row: Vec<Value> = vec![json!(0.0); 48];
        row[0] = Value::Null;
        let err = validator()
            .validate(&json!({ "sequences": [row] }))
            .unwrap_err();
        assert_eq!(err.reason(), ValidationReason::NonNumeric);
    }

    #[test]
    fn test_non_finite_values_rejected_on_typed_path() {
        let mut row = vec![0.0; 48];
        row[12] = f64::NAN;
        let err = validator()
            .validate_sequences(vec![vec![1.0; 48], row])
            .unwrap_err();
        assert_eq!(err, ValidationError::NonFinite { index: 1, position: 12 });

        let err = validator()
            .validate_sequences(vec![vec![f64::INFINITY; 48]])
            .unwrap_err();
        assert_eq!(err.reason(), ValidationReason::NonFinite);
    }

    #[test]
    fn test_length_checked_before_finiteness() {
        let err = validator()
            .validate_sequences(vec![vec![f64::NAN; 48], vec![0.0; 10]])
            .unwrap_err();
        assert_eq!(err.reason(), ValidationReason::LengthMismatch);
    }

    #[test]
    fn test_parse_rejects_malformed_body() {
        let err = validator().parse(b"{\"sequences\": [[").unwrap_err();
        assert_eq!(err, ValidationError::InvalidJson);
    }
}
