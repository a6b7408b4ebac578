//! Integration tests for the forecast API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use forecast_lib::loader::{compute_checksum, MANIFEST_FILE};
use forecast_lib::{ForecastService, ServiceConfig, SnapshotStore};
use forecast_server::api::{create_router, AppState};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const INPUT_STEPS: usize = 48;
const OUTPUT_STEPS: usize = 24;

/// Persistence model: every horizon step repeats the last observed value
fn write_artifact(dir: &Path, version: &str) {
    let weights: Vec<Vec<f32>> = (0..OUTPUT_STEPS)
        .map(|_| {
            let mut row = vec![0.0; INPUT_STEPS];
            row[INPUT_STEPS - 1] = 1.0;
            row
        })
        .collect();
    let weights_bytes =
        serde_json::to_vec(&json!({ "weights": weights, "bias": vec![0.0; OUTPUT_STEPS] }))
            .unwrap();
    fs::write(dir.join("weights.json"), &weights_bytes).unwrap();

    let manifest = json!({
        "name": "energy_forecasting_model",
        "version": version,
        "created_at": "2026-02-23T12:00:00Z",
        "input_steps": INPUT_STEPS,
        "output_steps": OUTPUT_STEPS,
        "format": "dense",
        "weights": "weights.json",
        "sha256": compute_checksum(&weights_bytes),
    });
    fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec(&manifest).unwrap()).unwrap();
}

fn test_config() -> ServiceConfig {
    ServiceConfig {
        worker_id: "test-worker".to_string(),
        ..ServiceConfig::default()
    }
}

fn setup_test_app() -> (Router, Arc<ForecastService>) {
    let service = Arc::new(ForecastService::new(test_config()));
    let router = create_router(AppState::new(Arc::clone(&service)));
    (router, service)
}

fn setup_ready_app() -> (Router, Arc<ForecastService>, TempDir) {
    let dir = TempDir::new().unwrap();
    write_artifact(dir.path(), "1");
    let (router, service) = setup_test_app();
    assert!(service.load_model(dir.path().to_str().unwrap()).is_loaded());
    (router, service, dir)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn post_predict(app: &Router, body: impl Into<Body>) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/predict")
                .header("content-type", "application/json")
                .body(body.into())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn predict_body(sequences: Value) -> String {
    json!({ "sequences": sequences }).to_string()
}

fn counter_line(text: &str, prefix: &str) -> Option<String> {
    text.lines()
        .find(|line| line.starts_with(prefix))
        .map(str::to_string)
}

#[tokio::test]
async fn test_health_unhealthy_before_load() {
    let (app, _service) = setup_test_app();

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health, json!({ "status": "unhealthy" }));
}

#[tokio::test]
async fn test_health_healthy_after_load() {
    let (app, _service, _dir) = setup_ready_app();

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health, json!({ "status": "healthy" }));
}

#[tokio::test]
async fn test_predict_returns_503_before_load() {
    let (app, _service) = setup_test_app();

    let (status, body) = post_predict(&app, predict_body(json!([vec![0.0; 48]]))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "model_not_ready");
    assert_eq!(body["detail"]["state"], "unloaded");
}

#[tokio::test]
async fn test_info_returns_503_before_load() {
    let (app, _service) = setup_test_app();
    let (status, _) = get(&app, "/info").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_predict_single_sequence() {
    let (app, _service, _dir) = setup_ready_app();

    let (status, body) = post_predict(&app, predict_body(json!([vec![0.0; 48]]))).await;
    assert_eq!(status, StatusCode::OK);

    let predictions = body["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 1);
    let first = predictions[0].as_array().unwrap();
    assert_eq!(first.len(), OUTPUT_STEPS);
    assert!(first.iter().all(|v| v.as_f64().unwrap().is_finite()));
    assert_eq!(body["model_version"], "1");
}

#[tokio::test]
async fn test_predict_length_mismatch() {
    let (app, _service, _dir) = setup_ready_app();

    let (status, body) = post_predict(&app, predict_body(json!([vec![0.1; 47]]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "length_mismatch", "detail": { "index": 0 } }));
}

#[tokio::test]
async fn test_predict_length_mismatch_reports_offending_index() {
    let (app, _service, _dir) = setup_ready_app();

    let sequences = json!([vec![0.0; 48], vec![0.0; 48], vec![0.0; 50]]);
    let (status, body) = post_predict(&app, predict_body(sequences)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"]["index"], 2);
}

#[tokio::test]
async fn test_predict_empty_sequences() {
    let (app, _service, _dir) = setup_ready_app();

    let (status, body) = post_predict(&app, predict_body(json!([]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "empty_sequences" }));
}

#[tokio::test]
async fn test_predict_rejects_malformed_payloads() {
    let (app, _service, _dir) = setup_ready_app();

    let (status, body) = post_predict(&app, "not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_json");

    let (_, body) = post_predict(&app, json!({ "series": [] }).to_string()).await;
    assert_eq!(body["error"], "missing_field");

    let mut sequence = vec![json!(0.0); 48];
    sequence[5] = json!("x");
    let (_, body) = post_predict(&app, predict_body(json!([sequence]))).await;
    assert_eq!(body["error"], "non_numeric");
}

#[tokio::test]
async fn test_info_returns_artifact_metadata() {
    let (app, _service, _dir) = setup_ready_app();

    let (status, body) = get(&app, "/info").await;
    assert_eq!(status, StatusCode::OK);
    let info: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(info["input_steps"], 48);
    assert_eq!(info["output_steps"], 24);
    assert_eq!(info["version"], "1");
    assert_eq!(info["format"], "dense");
    assert!(info["loaded_at"].is_string());

    let (_, again) = get(&app, "/info").await;
    assert_eq!(body, again);
}

#[tokio::test]
async fn test_metrics_before_traffic() {
    let (app, _service) = setup_test_app();

    let (status, body) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains(r#"forecast_requests_total{endpoint="/predict",status="2xx"} 0"#));
}

#[tokio::test]
async fn test_metrics_count_successes_and_validation_failures() {
    let (app, _service, _dir) = setup_ready_app();

    for _ in 0..5 {
        let (status, _) = post_predict(&app, predict_body(json!([vec![1.0; 48]]))).await;
        assert_eq!(status, StatusCode::OK);
    }
    for _ in 0..3 {
        let (status, _) = post_predict(&app, predict_body(json!([]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (_, body) = get(&app, "/metrics").await;
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains(r#"forecast_requests_total{endpoint="/predict",status="2xx"} 5"#));
    assert!(text.contains(r#"forecast_requests_total{endpoint="/predict",status="4xx"} 3"#));
    assert!(text.contains(r#"forecast_validation_failures_total{reason="empty_sequences"} 3"#));
}

#[tokio::test]
async fn test_probes_do_not_change_counters() {
    let (app, _service, _dir) = setup_ready_app();
    post_predict(&app, predict_body(json!([vec![1.0; 48]]))).await;

    let (_, first) = get(&app, "/metrics").await;
    get(&app, "/health").await;
    get(&app, "/info").await;
    let (_, second) = get(&app, "/metrics").await;

    let prefix = r#"forecast_requests_total{endpoint="/predict",status="2xx"}"#;
    let first = String::from_utf8(first).unwrap();
    let second = String::from_utf8(second).unwrap();
    assert_eq!(counter_line(&first, prefix), counter_line(&second, prefix));
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_concurrent_predictions_preserve_order() {
    let (app, _service, _dir) = setup_ready_app();

    let tasks: Vec<_> = (0..100)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                // three sequences per request, each ending in a distinct value
                let sequences: Vec<Vec<f64>> = (0..3)
                    .map(|j| vec![(i * 10 + j) as f64; INPUT_STEPS])
                    .collect();
                let (status, body) = post_predict(&app, predict_body(json!(sequences))).await;
                (i, status, body)
            })
        })
        .collect();

    for task in tasks {
        let (i, status, body) = task.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        let predictions = body["predictions"].as_array().unwrap();
        assert_eq!(predictions.len(), 3);
        for (j, prediction) in predictions.iter().enumerate() {
            let values = prediction.as_array().unwrap();
            assert_eq!(values.len(), OUTPUT_STEPS);
            let expected = (i * 10 + j) as f64;
            assert!(values.iter().all(|v| v.as_f64().unwrap() == expected));
        }
    }

    let (_, body) = get(&app, "/metrics").await;
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains(r#"forecast_requests_total{endpoint="/predict",status="2xx"} 100"#));
}

#[tokio::test]
async fn test_failed_reload_keeps_serving() {
    let (app, service, dir) = setup_ready_app();

    fs::write(dir.path().join("weights.json"), b"corrupted").unwrap();
    let outcome = service.load_model(dir.path().to_str().unwrap());
    assert!(!outcome.is_loaded());

    let (status, _) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = post_predict(&app, predict_body(json!([vec![2.0; 48]]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_version"], "1");
}

#[tokio::test]
async fn test_reload_swaps_version() {
    let (app, service, dir) = setup_ready_app();

    write_artifact(dir.path(), "2");
    assert!(service.load_model(dir.path().to_str().unwrap()).is_loaded());

    let (_, body) = get(&app, "/info").await;
    let info: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(info["version"], "2");
}

#[tokio::test]
async fn test_failed_initial_load_stays_observable() {
    let (app, service) = setup_test_app();
    let outcome = service.load_model("/nonexistent/energy_forecasting_model");
    assert!(!outcome.is_loaded());

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "unhealthy");

    let (status, body) = post_predict(&app, predict_body(json!([vec![0.0; 48]]))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["detail"]["state"], "failed");
}

#[tokio::test]
async fn test_unknown_route_lists_endpoints() {
    let (app, _service) = setup_test_app();

    let (status, body) = get(&app, "/forecast").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "not_found");
    assert_eq!(
        body["available_endpoints"],
        json!(["/health", "/info", "/predict", "/metrics"])
    );
}

#[tokio::test]
async fn test_metrics_aggregate_across_workers() {
    let metrics_dir = TempDir::new().unwrap();
    let artifact_dir = TempDir::new().unwrap();
    write_artifact(artifact_dir.path(), "1");
    let reference = artifact_dir.path().to_str().unwrap();

    let worker = |id: &str| {
        let service = ForecastService::new(ServiceConfig {
            worker_id: id.to_string(),
            ..ServiceConfig::default()
        })
        .with_snapshot_store(SnapshotStore::new(metrics_dir.path()).unwrap());
        assert!(service.load_model(reference).is_loaded());
        let service = Arc::new(service);
        (create_router(AppState::new(Arc::clone(&service))), service)
    };
    let (app_a, service_a) = worker("worker-a");
    let (app_b, _service_b) = worker("worker-b");

    for _ in 0..4 {
        post_predict(&app_a, predict_body(json!([vec![1.0; 48]]))).await;
    }
    for _ in 0..6 {
        post_predict(&app_b, predict_body(json!([vec![1.0; 48]]))).await;
    }
    service_a.flush_metrics().unwrap();

    let (_, body) = get(&app_b, "/metrics").await;
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains(r#"forecast_requests_total{endpoint="/predict",status="2xx"} 10"#));
    assert!(text.contains(r#"forecast_model_ready{worker="worker-a"} 1"#));
    assert!(text.contains(r#"forecast_model_ready{worker="worker-b"} 1"#));
}
