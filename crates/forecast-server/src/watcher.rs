//! Artifact hot reload
//!
//! Watches the directory holding the artifact manifest and re-runs the load
//! for the same reference when the manifest is written. Events arriving in
//! quick succession (editors and registries often write in several steps)
//! collapse into a single reload.

use anyhow::{Context, Result};
use forecast_lib::loader::{resolve_reference, MANIFEST_FILE};
use forecast_lib::{ForecastService, LoadOutcome};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Quiet period after the last filesystem event before reloading
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Reloads the active artifact when its manifest changes
pub struct ArtifactWatcher {
    service: Arc<ForecastService>,
    reference: String,
    debounce: Duration,
}

impl ArtifactWatcher {
    pub fn new(service: Arc<ForecastService>, reference: impl Into<String>) -> Self {
        Self {
            service,
            reference: reference.into(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching for manifest changes
    /// Returns a handle that stops watching when dropped
    pub fn start(self) -> Result<WatcherHandle> {
        let manifest = resolve_reference(&self.reference)
            .with_context(|| format!("Cannot watch artifact reference {}", self.reference))?;
        let dir = manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = manifest
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| MANIFEST_FILE.into());

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => warn!(error = %e, "Filesystem watch error"),
            },
            notify::Config::default(),
        )
        .context("Failed to create filesystem watcher")?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;
        info!(path = %manifest.display(), "Watching model artifact manifest");

        let task = tokio::spawn(self.run(rx, file_name));
        Ok(WatcherHandle {
            _watcher: watcher,
            task,
        })
    }

    async fn run(self, mut rx: mpsc::UnboundedReceiver<Event>, file_name: std::ffi::OsString) {
        let touches_manifest = |event: &Event| {
            matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                && event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(file_name.as_os_str()))
        };

        while let Some(event) = rx.recv().await {
            if !touches_manifest(&event) {
                continue;
            }

            // drain until the directory has been quiet for one debounce period
            loop {
                match tokio::time::timeout(self.debounce, rx.recv()).await {
                    Ok(Some(_)) => continue,
                    Ok(None) => return,
                    Err(_) => break,
                }
            }

            debug!(reference = %self.reference, "Manifest changed, reloading");
            let service = Arc::clone(&self.service);
            let reference = self.reference.clone();
            match tokio::task::spawn_blocking(move || service.load_model(&reference)).await {
                Ok(LoadOutcome::Loaded { version, .. }) => {
                    info!(version = %version, "Hot reload complete")
                }
                Ok(LoadOutcome::Failed { error }) => {
                    warn!(error = %error, kind = error.kind(), "Hot reload failed")
                }
                Err(e) => warn!(error = %e, "Reload task panicked"),
            }
        }
        debug!("Watcher channel closed");
    }
}

/// Handle to a running watcher
/// Stops watching when dropped
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
