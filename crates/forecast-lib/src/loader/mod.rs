//! Model artifact lifecycle
//!
//! One [`ModelLoader`] per process owns the active artifact and its
//! [`ModelState`]. Loading happens outside the state lock; only the final
//! swap takes the write lock, so readers either see the previous artifact or
//! a not-ready signal, never a partially built one.

mod artifact;
mod manifest;

pub use artifact::{load_artifact, ArtifactMetadata, ModelArtifact};
pub use manifest::{
    compute_checksum, resolve_reference, ArtifactFormat, ArtifactManifest, MANIFEST_FILE,
};

use crate::error::{LoadError, ModelNotReady};
use crate::models::ForecastShape;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::{error, info, warn};

/// Serving readiness of the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelState {
    /// No load attempted yet
    Unloaded,
    /// A load is running and nothing is active
    Loading,
    /// An artifact is active
    Ready,
    /// The last load failed and nothing is active
    Failed,
}

impl ModelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelState::Unloaded => "unloaded",
            ModelState::Loading => "loading",
            ModelState::Ready => "ready",
            ModelState::Failed => "failed",
        }
    }
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one `load` call
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded { version: String, duration_ms: u64 },
    Failed { error: LoadError },
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded { .. })
    }
}

/// Point-in-time view of the loader
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoaderStatus {
    pub state: ModelState,
    pub reference: Option<String>,
    pub active_version: Option<String>,
    pub last_error: Option<String>,
    pub loads_completed: u64,
    pub loads_failed: u64,
}

struct LoaderInner {
    state: ModelState,
    active: Option<Arc<ModelArtifact>>,
    reference: Option<String>,
    last_error: Option<LoadError>,
    loads_completed: u64,
    loads_failed: u64,
}

/// Owns the process's single active artifact
pub struct ModelLoader {
    shape: ForecastShape,
    inner: RwLock<LoaderInner>,
    // serializes loads; readers never touch it
    load_gate: Mutex<()>,
}

impl ModelLoader {
    /// Create a loader that only accepts artifacts with the given geometry
    pub fn new(shape: ForecastShape) -> Self {
        Self {
            shape,
            inner: RwLock::new(LoaderInner {
                state: ModelState::Unloaded,
                active: None,
                reference: None,
                last_error: None,
                loads_completed: 0,
                loads_failed: 0,
            }),
            load_gate: Mutex::new(()),
        }
    }

    pub fn shape(&self) -> ForecastShape {
        self.shape
    }

    /// Load the artifact designated by `reference` and make it active.
    ///
    /// Never fails outright: the outcome is returned for logging and is
    /// also observable through [`state`](Self::state) and
    /// [`status`](Self::status). While an artifact is already active the
    /// state stays `Ready` and the old artifact keeps serving until the new
    /// one replaces it; a failed reload leaves it in place.
    pub fn load(&self, reference: &str) -> LoadOutcome {
        let _gate = self.load_gate.lock().unwrap_or_else(PoisonError::into_inner);

        {
            let mut inner = self.write();
            if inner.active.is_none() {
                inner.state = ModelState::Loading;
            }
            inner.reference = Some(reference.to_string());
        }
        info!(reference = %reference, "Loading model artifact");

        let start = Instant::now();
        let result = load_artifact(reference, self.shape);
        let duration_ms = start.elapsed().as_millis() as u64;

        let mut inner = self.write();
        match result {
            Ok(artifact) => {
                let version = artifact.version().to_string();
                let previous = inner
                    .active
                    .replace(Arc::new(artifact))
                    .map(|old| old.version().to_string());
                inner.state = ModelState::Ready;
                inner.last_error = None;
                inner.loads_completed += 1;

                info!(
                    version = %version,
                    previous = ?previous,
                    duration_ms = duration_ms,
                    "Model artifact active"
                );
                LoadOutcome::Loaded {
                    version,
                    duration_ms,
                }
            }
            Err(err) => {
                inner.last_error = Some(err.clone());
                inner.loads_failed += 1;
                match inner.active.as_ref() {
                    Some(active) => {
                        warn!(
                            reference = %reference,
                            error = %err,
                            kept_version = %active.version(),
                            "Model reload failed, keeping previous artifact"
                        );
                    }
                    None => {
                        inner.state = ModelState::Failed;
                        error!(reference = %reference, error = %err, "Model load failed");
                    }
                }
                LoadOutcome::Failed { error: err }
            }
        }
    }

    /// The active artifact, or the not-ready signal
    pub fn get_active(&self) -> Result<Arc<ModelArtifact>, ModelNotReady> {
        let inner = self.read();
        match (&inner.active, inner.state) {
            (Some(artifact), ModelState::Ready) => Ok(Arc::clone(artifact)),
            (_, state) => Err(ModelNotReady { state }),
        }
    }

    pub fn state(&self) -> ModelState {
        self.read().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ModelState::Ready
    }

    /// Cause of the most recent failed load, cleared by the next success
    pub fn last_error(&self) -> Option<LoadError> {
        self.read().last_error.clone()
    }

    pub fn status(&self) -> LoaderStatus {
        let inner = self.read();
        LoaderStatus {
            state: inner.state,
            reference: inner.reference.clone(),
            active_version: inner.active.as_ref().map(|a| a.version().to_string()),
            last_error: inner.last_error.as_ref().map(ToString::to_string),
            loads_completed: inner.loads_completed,
            loads_failed: inner.loads_failed,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, LoaderInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LoaderInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
