//! Immutable in-memory model artifacts

use super::manifest::{resolve_reference, ArtifactFormat, ArtifactManifest};
use crate::error::LoadError;
use crate::models::{ForecastShape, ModelInfo};
use crate::predictor::{DenseForecaster, Forecaster, OnnxForecaster};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Descriptive metadata carried with an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub name: String,
    pub version: String,
    pub created_at: Option<DateTime<Utc>>,
    pub shape: ForecastShape,
    pub format: ArtifactFormat,
    pub checksum: Option<String>,
}

impl ArtifactMetadata {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        shape: ForecastShape,
        format: ArtifactFormat,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            created_at: None,
            shape,
            format,
            checksum: None,
        }
    }
}

/// A deserialized, ready-to-run forecasting model plus its metadata.
///
/// Never mutated after construction; shared between requests behind an `Arc`.
pub struct ModelArtifact {
    metadata: ArtifactMetadata,
    loaded_at: DateTime<Utc>,
    forecaster: Box<dyn Forecaster>,
}

impl ModelArtifact {
    pub fn new(metadata: ArtifactMetadata, forecaster: Box<dyn Forecaster>) -> Self {
        Self {
            metadata,
            loaded_at: Utc::now(),
            forecaster,
        }
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    pub fn shape(&self) -> ForecastShape {
        self.metadata.shape
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn forecaster(&self) -> &dyn Forecaster {
        self.forecaster.as_ref()
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            input_steps: self.metadata.shape.input_steps,
            output_steps: self.metadata.shape.output_steps,
            version: self.metadata.version.clone(),
            loaded_at: self.loaded_at,
            name: self.metadata.name.clone(),
            format: self.metadata.format.as_str().to_string(),
            created_at: self.metadata.created_at,
        }
    }
}

impl fmt::Debug for ModelArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelArtifact")
            .field("metadata", &self.metadata)
            .field("loaded_at", &self.loaded_at)
            .field("forecaster", &self.forecaster.kind())
            .finish()
    }
}

/// Resolve `reference`, read its manifest and weights, and build an artifact
/// whose geometry matches `expected`
pub fn load_artifact(reference: &str, expected: ForecastShape) -> Result<ModelArtifact, LoadError> {
    let manifest_path = resolve_reference(reference)?;
    let manifest = ArtifactManifest::read(&manifest_path)?;
    manifest.check_shape(expected)?;

    let (bytes, checksum) = manifest.read_weights(&manifest_path)?;
    let forecaster: Box<dyn Forecaster> = match manifest.format {
        ArtifactFormat::Onnx => Box::new(OnnxForecaster::from_bytes(&bytes, expected)?),
        ArtifactFormat::Dense => Box::new(DenseForecaster::from_json(&bytes, expected)?),
    };

    let metadata = ArtifactMetadata {
        name: manifest.name,
        version: manifest.version,
        created_at: manifest.created_at,
        shape: expected,
        format: manifest.format,
        checksum: Some(checksum),
    };
    Ok(ModelArtifact::new(metadata, forecaster))
}
