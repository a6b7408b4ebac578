//! Dense multi-horizon head stored as plain JSON weights
//!
//! Maps the flattened input window straight onto the forecast horizon:
//! `y = x · Wᵀ + b`, with `W` of shape `(output_steps, input_steps)`.

use super::Forecaster;
use crate::error::LoadError;
use crate::models::ForecastShape;
use anyhow::bail;
use serde::Deserialize;
use tract_onnx::prelude::tract_ndarray::{Array1, Array2, Array3};

#[derive(Deserialize)]
struct DenseWeightsFile {
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

pub struct DenseForecaster {
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl DenseForecaster {
    pub fn new(weights: Array2<f32>, bias: Array1<f32>) -> Result<Self, LoadError> {
        if bias.len() != weights.nrows() {
            return Err(LoadError::ShapeMismatch(format!(
                "bias has {} values but weights have {} rows",
                bias.len(),
                weights.nrows()
            )));
        }
        Ok(Self { weights, bias })
    }

    /// Naive forecaster that repeats the last observed value over the horizon
    pub fn persistence(shape: ForecastShape) -> Self {
        let last = shape.input_steps.saturating_sub(1);
        let weights = Array2::from_shape_fn((shape.output_steps, shape.input_steps), |(_, j)| {
            if j == last {
                1.0
            } else {
                0.0
            }
        });
        Self {
            weights,
            bias: Array1::zeros(shape.output_steps),
        }
    }

    /// Parse a `{"weights": [[..]], "bias": [..]}` document and check it against `shape`
    pub fn from_json(bytes: &[u8], shape: ForecastShape) -> Result<Self, LoadError> {
        let file: DenseWeightsFile = serde_json::from_slice(bytes)
            .map_err(|e| LoadError::Deserialize(format!("dense weights: {e}")))?;

        if file.weights.len() != shape.output_steps {
            return Err(LoadError::ShapeMismatch(format!(
                "weights have {} rows, manifest declares output_steps={}",
                file.weights.len(),
                shape.output_steps
            )));
        }
        if let Some(row) = file
            .weights
            .iter()
            .position(|row| row.len() != shape.input_steps)
        {
            return Err(LoadError::ShapeMismatch(format!(
                "weights row {} has {} columns, manifest declares input_steps={}",
                row,
                file.weights[row].len(),
                shape.input_steps
            )));
        }

        let flat: Vec<f32> = file.weights.into_iter().flatten().collect();
        let weights = Array2::from_shape_vec((shape.output_steps, shape.input_steps), flat)
            .map_err(|e| LoadError::Deserialize(e.to_string()))?;
        Self::new(weights, Array1::from(file.bias))
    }

    pub fn shape(&self) -> ForecastShape {
        ForecastShape::new(self.weights.ncols(), self.weights.nrows())
    }
}

impl Forecaster for DenseForecaster {
    fn forward(&self, batch: Array3<f32>) -> anyhow::Result<Array2<f32>> {
        let (n, steps, width) = batch.dim();
        if steps != self.weights.ncols() || width != 1 {
            bail!(
                "batch shape ({}, {}, {}) does not fit a window of {}",
                n,
                steps,
                width,
                self.weights.ncols()
            );
        }

        let flat = batch.into_shape_with_order((n, steps))?;
        Ok(flat.dot(&self.weights.t()) + &self.bias)
    }

    fn kind(&self) -> &'static str {
        "dense"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_repeats_last_value() {
        let model = DenseForecaster::persistence(ForecastShape::new(3, 2));
        let batch = Array3::from_shape_vec((2, 3, 1), vec![1.0, 2.0, 3.0, 7.0, 8.0, 9.0]).unwrap();

        let out = model.forward(batch).unwrap();
        assert_eq!(out, Array2::from_shape_vec((2, 2), vec![3.0, 3.0, 9.0, 9.0]).unwrap());
    }

    #[test]
    fn test_from_json_applies_bias() {
        let json = br#"{"weights": [[0.5, 0.5], [1.0, 0.0], [0.0, 0.0]], "bias": [0.0, 0.0, 10.0]}"#;
        let model = DenseForecaster::from_json(json, ForecastShape::new(2, 3)).unwrap();

        let batch = Array3::from_shape_vec((1, 2, 1), vec![2.0, 4.0]).unwrap();
        let out = model.forward(batch).unwrap();
        assert_eq!(out.row(0).to_vec(), vec![3.0, 2.0, 10.0]);
    }

    #[test]
    fn test_from_json_rejects_wrong_width() {
        let json = br#"{"weights": [[0.5, 0.5, 0.5]], "bias": [0.0]}"#;
        let err = DenseForecaster::from_json(json, ForecastShape::new(2, 1))
            .err()
            .unwrap();
        assert_eq!(err.kind(), "shape_mismatch");
    }

    #[test]
    fn test_from_json_rejects_wrong_horizon() {
        let json = br#"{"weights": [[0.5, 0.5]], "bias": [0.0]}"#;
        let err = DenseForecaster::from_json(json, ForecastShape::new(2, 4))
            .err()
            .unwrap();
        assert_eq!(err.kind(), "shape_mismatch");
    }

    #[test]
    fn test_bias_length_checked() {
        let json = br#"{"weights": [[0.5, 0.5]], "bias": [0.0, 1.0]}"#;
        assert!(DenseForecaster::from_json(json, ForecastShape::new(2, 1)).is_err());
    }

    #[test]
    fn test_forward_rejects_foreign_window() {
        let model = DenseForecaster::persistence(ForecastShape::new(3, 2));
        let batch = Array3::zeros((1, 4, 1));
        assert!(model.forward(batch).is_err());
    }
}
