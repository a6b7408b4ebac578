//! Forecast server - serves short-horizon forecasts over HTTP
//!
//! Starts listening immediately and loads the model artifact in the
//! background, so `/health` reports unhealthy (rather than refusing
//! connections) until the artifact is ready or when it fails to load.

use anyhow::{Context, Result};
use forecast_lib::{ForecastService, SnapshotStore};
use forecast_server::{
    api::{self, AppState},
    config::ServerConfig,
    watcher::ArtifactWatcher,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = ServerConfig::load()?;
    info!(
        worker_id = %config.worker_id,
        model_uri = %config.model_uri,
        input_steps = config.input_steps,
        output_steps = config.output_steps,
        "Forecast server configured"
    );

    let mut service = ForecastService::new(config.service_config());
    if let Some(dir) = &config.metrics_dir {
        let store = SnapshotStore::new(dir)
            .with_context(|| format!("Failed to open metrics directory {}", dir.display()))?;
        service = service.with_snapshot_store(store);
    }
    let service = Arc::new(service);

    let listener = TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr()))?;
    service
        .logger()
        .log_server_started(&config.bind_addr(), &config.model_uri);

    // Initial load; a failure leaves the process up and unhealthy
    let loader_service = Arc::clone(&service);
    let reference = config.model_uri.clone();
    let watch = config.watch_artifact;
    let initial_load = tokio::spawn(async move {
        let load_service = Arc::clone(&loader_service);
        let load_reference = reference.clone();
        if let Err(e) =
            tokio::task::spawn_blocking(move || load_service.load_model(&load_reference)).await
        {
            warn!(error = %e, "Initial model load task failed");
        }
        if !watch {
            return None;
        }
        match ArtifactWatcher::new(loader_service, reference).start() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Artifact watching disabled");
                None
            }
        }
    });

    let flush_handle = config
        .metrics_dir
        .is_some()
        .then(|| tokio::spawn(flush_metrics(Arc::clone(&service), config.metrics_flush_interval())));

    api::serve(listener, AppState::new(Arc::clone(&service)), shutdown_signal()).await?;

    if let Some(handle) = flush_handle {
        handle.abort();
    }
    // dropping the watcher handle stops it
    initial_load.abort();
    let _ = initial_load.await;
    if let Err(e) = service.flush_metrics() {
        warn!(error = %e, "Final metrics flush failed");
    }
    service.logger().log_server_shutdown();

    Ok(())
}

/// Periodically publish this worker's metrics snapshot
async fn flush_metrics(service: Arc<ForecastService>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let flushing = Arc::clone(&service);
        match tokio::task::spawn_blocking(move || flushing.flush_metrics()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Metrics flush failed"),
            Err(e) => warn!(error = %e, "Metrics flush task failed"),
        }
    }
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received"),
        _ = terminate => info!("SIGTERM received"),
    }
}
