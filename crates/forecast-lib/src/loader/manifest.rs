//! Artifact manifests and reference resolution

use crate::error::LoadError;
use crate::models::ForecastShape;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// File name looked up when a reference points at a directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Serialization format of the weights file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Onnx,
    Dense,
}

impl ArtifactFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactFormat::Onnx => "onnx",
            ArtifactFormat::Dense => "dense",
        }
    }
}

/// Registry-supplied description of one immutable model artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    #[serde(default = "default_name")]
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub input_steps: usize,
    pub output_steps: usize,
    pub format: ArtifactFormat,
    /// Weights file, relative to the manifest's directory
    pub weights: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

fn default_name() -> String {
    "energy_forecasting_model".to_string()
}

impl ArtifactManifest {
    pub fn read(path: &Path) -> Result<Self, LoadError> {
        let raw = fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
        serde_json::from_str(&raw).map_err(|e| LoadError::Manifest(e.to_string()))
    }

    pub fn shape(&self) -> ForecastShape {
        ForecastShape::new(self.input_steps, self.output_steps)
    }

    /// The manifest must describe exactly the window the deployment serves
    pub fn check_shape(&self, expected: ForecastShape) -> Result<(), LoadError> {
        if self.input_steps == 0 || self.output_steps == 0 {
            return Err(LoadError::Manifest(
                "input_steps and output_steps must be positive".to_string(),
            ));
        }
        if self.shape() != expected {
            return Err(LoadError::ShapeMismatch(format!(
                "artifact declares {}->{} steps, deployment expects {}->{}",
                self.input_steps, self.output_steps, expected.input_steps, expected.output_steps
            )));
        }
        Ok(())
    }

    /// Read the weights file and verify its checksum when one is declared
    pub fn read_weights(&self, manifest_path: &Path) -> Result<(Vec<u8>, String), LoadError> {
        let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));
        let weights_path = base.join(&self.weights);
        let bytes = fs::read(&weights_path).map_err(|e| LoadError::io(&weights_path, e))?;

        let checksum = compute_checksum(&bytes);
        if let Some(expected) = &self.sha256 {
            if !expected.eq_ignore_ascii_case(&checksum) {
                return Err(LoadError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual: checksum,
                });
            }
        }
        Ok((bytes, checksum))
    }
}

/// Resolve a path or `file://` URI to the manifest file it designates
pub fn resolve_reference(reference: &str) -> Result<PathBuf, LoadError> {
    let path = if reference.contains("://") {
        let url =
            Url::parse(reference).map_err(|_| LoadError::UnsupportedReference(reference.into()))?;
        if url.scheme() != "file" {
            return Err(LoadError::UnsupportedReference(reference.into()));
        }
        url.to_file_path()
            .map_err(|_| LoadError::UnsupportedReference(reference.into()))?
    } else {
        PathBuf::from(reference)
    };

    if path.is_dir() {
        Ok(path.join(MANIFEST_FILE))
    } else {
        Ok(path)
    }
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest(input_steps: usize, output_steps: usize) -> ArtifactManifest {
        ArtifactManifest {
            name: default_name(),
            version: "1".into(),
            created_at: None,
            input_steps,
            output_steps,
            format: ArtifactFormat::Dense,
            weights: PathBuf::from("weights.json"),
            sha256: None,
        }
    }

    #[test]
    fn test_compute_checksum() {
        let checksum = compute_checksum(b"test model weights");
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, compute_checksum(b"test model weights"));
    }

    #[test]
    fn test_resolve_plain_path() {
        let path = resolve_reference("/models/energy/manifest.json").unwrap();
        assert_eq!(path, PathBuf::from("/models/energy/manifest.json"));
    }

    #[test]
    fn test_resolve_directory_appends_manifest() {
        let dir = TempDir::new().unwrap();
        let path = resolve_reference(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(path, dir.path().join(MANIFEST_FILE));
    }

    #[test]
    fn test_resolve_file_uri() {
        let path = resolve_reference("file:///models/energy/manifest.json").unwrap();
        assert_eq!(path, PathBuf::from("/models/energy/manifest.json"));
    }

    #[test]
    fn test_registry_uris_unsupported() {
        // no "://" separator, so this is just an odd relative path
        assert!(resolve_reference("models:/energy_forecasting_model/Production").is_ok());

        let err = resolve_reference("s3://bucket/model").unwrap_err();
        assert_eq!(err.kind(), "unsupported_reference");
    }

    #[test]
    fn test_check_shape() {
        let expected = ForecastShape::new(48, 24);
        assert!(manifest(48, 24).check_shape(expected).is_ok());
        assert_eq!(
            manifest(24, 24).check_shape(expected).unwrap_err().kind(),
            "shape_mismatch"
        );
        assert_eq!(
            manifest(0, 24).check_shape(expected).unwrap_err().kind(),
            "invalid_manifest"
        );
    }

    #[test]
    fn test_read_weights_verifies_checksum() {
        let dir = TempDir::new().unwrap();
        let manifest_path = dir.path().join(MANIFEST_FILE);
        fs::write(dir.path().join("weights.json"), b"payload").unwrap();

        let mut m = manifest(48, 24);
        m.sha256 = Some(compute_checksum(b"payload").to_uppercase());
        let (bytes, checksum) = m.read_weights(&manifest_path).unwrap();
        assert_eq!(bytes, b"payload");
        assert_eq!(checksum, compute_checksum(b"payload"));

        m.sha256 = Some(compute_checksum(b"other"));
        let err = m.read_weights(&manifest_path).unwrap_err();
        assert_eq!(err.kind(), "checksum_mismatch");
    }

    #[test]
    fn test_manifest_parse_defaults() {
        let raw = r#"{"version":"7","input_steps":48,"output_steps":24,"format":"onnx","weights":"model.onnx"}"#;
        let m: ArtifactManifest = serde_json::from_str(raw).unwrap();
        assert_eq!(m.name, "energy_forecasting_model");
        assert_eq!(m.format, ArtifactFormat::Onnx);
        assert!(m.created_at.is_none());
    }
}
