//! ONNX inference using tract
//!
//! Loads an exported encoder/decoder graph with input `(N, input_steps, 1)`
//! and output `(N, output_steps)`. The batch dimension may be symbolic; it
//! is resolved from the concrete batch on every run.

use super::Forecaster;
use crate::error::LoadError;
use crate::models::ForecastShape;
use anyhow::{bail, Context};
use tract_onnx::prelude::*;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

pub struct OnnxForecaster {
    model: TractModel,
}

impl OnnxForecaster {
    /// Parse, check and optimize an ONNX model from bytes
    pub fn from_bytes(model_bytes: &[u8], shape: ForecastShape) -> Result<Self, LoadError> {
        let typed = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .and_then(|model| model.into_typed())
            .map_err(|e| LoadError::Deserialize(format!("{e:#}")))?;

        check_declared_shape(&typed, shape)?;

        let model = typed
            .into_optimized()
            .and_then(|model| model.into_runnable())
            .map_err(|e| LoadError::Deserialize(format!("{e:#}")))?;

        Ok(Self { model })
    }
}

/// Compare the graph's declared input/output widths with the manifest
fn check_declared_shape(model: &TypedModel, shape: ForecastShape) -> Result<(), LoadError> {
    let input = model
        .input_fact(0)
        .map_err(|e| LoadError::Deserialize(format!("{e:#}")))?;
    let output = model
        .output_fact(0)
        .map_err(|e| LoadError::Deserialize(format!("{e:#}")))?;

    let input_dims = concrete_dims(&input.shape);
    let output_dims = concrete_dims(&output.shape);

    let input_ok = input_dims.len() == 3
        && input_dims[1].map_or(true, |d| d == shape.input_steps)
        && input_dims[2].map_or(true, |d| d == 1);
    if !input_ok {
        return Err(LoadError::ShapeMismatch(format!(
            "model input {:?} does not accept (N, {}, 1)",
            input_dims, shape.input_steps
        )));
    }

    let output_ok = matches!(output_dims.len(), 2 | 3)
        && output_dims[1].map_or(true, |d| d == shape.output_steps)
        && output_dims.get(2).map_or(true, |d| d.map_or(true, |d| d == 1));
    if !output_ok {
        return Err(LoadError::ShapeMismatch(format!(
            "model output {:?} does not produce (N, {})",
            output_dims, shape.output_steps
        )));
    }

    Ok(())
}

/// Concrete dimension sizes, `None` for symbolic ones
fn concrete_dims(shape: &ShapeFact) -> Vec<Option<usize>> {
    shape
        .iter()
        .map(|dim| dim.to_i64().ok().and_then(|d| usize::try_from(d).ok()))
        .collect()
}

impl Forecaster for OnnxForecaster {
    fn forward(&self, batch: tract_ndarray::Array3<f32>) -> anyhow::Result<tract_ndarray::Array2<f32>> {
        let n = batch.dim().0;
        let input: Tensor = batch.into();

        let result = self.model.run(tvec!(input.into()))?;
        let output = result.first().context("No output from model")?;
        let values: Vec<f32> = output.to_array_view::<f32>()?.iter().copied().collect();

        if n == 0 || values.len() % n != 0 {
            bail!("model produced {} values for a batch of {}", values.len(), n);
        }
        let width = values.len() / n;
        Ok(tract_ndarray::Array2::from_shape_vec((n, width), values)?)
    }

    fn kind(&self) -> &'static str {
        "onnx"
    }
}
