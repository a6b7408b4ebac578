//! Server configuration

use anyhow::{ensure, Context, Result};
use forecast_lib::{ForecastShape, ServiceConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration, read from `FORECAST_*` environment variables and an
/// optional file named by `FORECAST_CONFIG_FILE`
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Artifact reference handed over by the model registry
    #[serde(default = "default_model_uri")]
    pub model_uri: String,

    #[serde(default = "default_input_steps")]
    pub input_steps: usize,

    #[serde(default = "default_output_steps")]
    pub output_steps: usize,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Reload the artifact when its manifest changes on disk
    #[serde(default)]
    pub watch_artifact: bool,

    /// Shared directory for per-worker metric snapshots
    #[serde(default)]
    pub metrics_dir: Option<PathBuf>,

    #[serde(default = "default_worker_id")]
    pub worker_id: String,

    #[serde(default = "default_metrics_flush_secs")]
    pub metrics_flush_secs: u64,

    #[serde(default = "default_slow_inference_ms")]
    pub slow_inference_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_model_uri() -> String {
    "/models/energy_forecasting_model".to_string()
}

fn default_input_steps() -> usize {
    48
}

fn default_output_steps() -> usize {
    24
}

fn default_max_batch_size() -> usize {
    forecast_lib::validator::DEFAULT_MAX_BATCH_SIZE
}

fn default_worker_id() -> String {
    let pid = std::process::id();
    match std::env::var("HOSTNAME") {
        Ok(host) if !host.is_empty() => format!("{host}-{pid}"),
        _ => format!("worker-{pid}"),
    }
}

fn default_metrics_flush_secs() -> u64 {
    5
}

fn default_slow_inference_ms() -> u64 {
    50
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            model_uri: default_model_uri(),
            input_steps: default_input_steps(),
            output_steps: default_output_steps(),
            max_batch_size: default_max_batch_size(),
            watch_artifact: false,
            metrics_dir: None,
            worker_id: default_worker_id(),
            metrics_flush_secs: default_metrics_flush_secs(),
            slow_inference_ms: default_slow_inference_ms(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment and config file
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var("FORECAST_CONFIG_FILE") {
            builder = builder.add_source(config::File::with_name(&path));
        }
        let config = builder
            .add_source(config::Environment::with_prefix("FORECAST"))
            .build()
            .context("Failed to read configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.input_steps > 0, "input_steps must be positive");
        ensure!(self.output_steps > 0, "output_steps must be positive");
        ensure!(self.max_batch_size > 0, "max_batch_size must be positive");
        ensure!(self.metrics_flush_secs > 0, "metrics_flush_secs must be positive");
        ensure!(!self.worker_id.is_empty(), "worker_id must not be empty");
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn metrics_flush_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_flush_secs)
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            shape: ForecastShape::new(self.input_steps, self.output_steps),
            max_batch_size: self.max_batch_size,
            slow_inference: Duration::from_millis(self.slow_inference_ms),
            worker_id: self.worker_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:5000");
        assert_eq!(config.model_uri, "/models/energy_forecasting_model");
        assert_eq!(config.input_steps, 48);
        assert_eq!(config.output_steps, 24);
        assert_eq!(config.max_batch_size, 256);
        assert!(!config.watch_artifact);
        assert!(config.metrics_dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_steps() {
        let config = ServerConfig {
            input_steps: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            max_batch_size: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_source_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "port = 6100\ninput_steps = 12\nmetrics_dir = \"/tmp/forecast\"").unwrap();

        let config: ServerConfig = config::Config::builder()
            .add_source(config::File::from(file.path()))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.port, 6100);
        assert_eq!(config.input_steps, 12);
        assert_eq!(config.output_steps, 24);
        assert_eq!(config.metrics_dir, Some(PathBuf::from("/tmp/forecast")));
        assert_eq!(
            config.service_config().shape,
            ForecastShape::new(12, 24)
        );
    }
}
