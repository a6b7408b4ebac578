//! API client for communicating with the forecast server

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// API client for the forecast server
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("Invalid path")
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path)?)
            .send()
            .await
            .context("Failed to send request")?;

        parse_json(response).await
    }

    /// Make a GET request and return the raw body
    pub async fn get_text(&self, path: &str) -> Result<String> {
        let response = self
            .client
            .get(self.url(path)?)
            .send()
            .await
            .context("Failed to send request")?;

        let response = check_status(response).await?;
        response.text().await.context("Failed to read response")
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .client
            .post(self.url(path)?)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        parse_json(response).await
    }

    /// Query `/health`; a 503 is an answer, not an error
    pub async fn health(&self) -> Result<(StatusCode, HealthResponse)> {
        let response = self
            .client
            .get(self.url("health")?)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::SERVICE_UNAVAILABLE {
            return Err(api_error(response).await);
        }
        let health = response.json().await.context("Failed to parse response")?;
        Ok((status, health))
    }

    pub async fn info(&self) -> Result<ModelInfo> {
        self.get("info").await
    }

    pub async fn predict(&self, sequences: Vec<Vec<f64>>) -> Result<PredictionResponse> {
        self.post("predict", &PredictRequest { sequences }).await
    }

    pub async fn metrics(&self) -> Result<String> {
        self.get_text("metrics").await
    }
}

async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(api_error(response).await)
    }
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    check_status(response)
        .await?
        .json()
        .await
        .context("Failed to parse response")
}

/// Render a failed response, preferring the server's reason code
async fn api_error(response: Response) -> anyhow::Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => match err.detail {
            Some(detail) => anyhow::anyhow!("API error ({}): {} {}", status, err.error, detail),
            None => anyhow::anyhow!("API error ({}): {}", status, err.error),
        },
        Err(_) => anyhow::anyhow!("API error ({}): {}", status, body),
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub input_steps: usize,
    pub output_steps: usize,
    pub version: String,
    pub loaded_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub sequences: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predictions: Vec<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}
