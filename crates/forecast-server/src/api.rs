//! HTTP API: prediction, health, model info and Prometheus metrics

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use forecast_lib::{
    ForecastService, InferenceError, ModelInfo, PredictionResponse, ServiceError,
};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const AVAILABLE_ENDPOINTS: [&str; 4] = ["/health", "/info", "/predict", "/metrics"];

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ForecastService>,
}

impl AppState {
    pub fn new(service: Arc<ForecastService>) -> Self {
        Self { service }
    }
}

/// Maps pipeline failures onto status codes and JSON error bodies
pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.body())).into_response()
    }
}

/// Health check response - returns 200 if a model is serving, 503 otherwise
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.service.health();
    let status_code = if health.status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(health))
}

async fn info(State(state): State<AppState>) -> Result<Json<ModelInfo>, ApiError> {
    let info = state.service.info().map_err(ServiceError::from)?;
    Ok(Json(info))
}

/// Run the prediction pipeline off the async executor
async fn predict(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PredictionResponse>, ApiError> {
    let service = Arc::clone(&state.service);
    match tokio::task::spawn_blocking(move || service.predict(&body)).await {
        Ok(result) => Ok(Json(result?)),
        Err(e) => {
            error!(error = %e, "Prediction task failed");
            Err(ServiceError::from(InferenceError::Forward("prediction task failed".into())).into())
        }
    }
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let service = Arc::clone(&state.service);
    let body = match tokio::task::spawn_blocking(move || service.render_metrics()).await {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "Metrics task failed");
            state.service.metrics().render()
        }
    };

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "not_found",
            "available_endpoints": AVAILABLE_ENDPOINTS,
        })),
    )
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/predict", post(predict))
        .route("/metrics", get(metrics))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    info!(addr = %listener.local_addr()?, "Starting API server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
