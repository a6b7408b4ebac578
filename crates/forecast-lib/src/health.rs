//! Readiness reporting for liveness and readiness probes

use crate::loader::ModelState;
use serde::{Deserialize, Serialize};

/// Health status of the serving process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    /// Healthy only while an artifact is active
    pub fn from_state(state: ModelState) -> Self {
        match state {
            ModelState::Ready => HealthStatus::Healthy,
            ModelState::Unloaded | ModelState::Loading | ModelState::Failed => {
                HealthStatus::Unhealthy
            }
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Body of `GET /health`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
}

impl HealthResponse {
    pub fn from_state(state: ModelState) -> Self {
        Self {
            status: HealthStatus::from_state(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_ready_is_healthy() {
        assert!(HealthStatus::from_state(ModelState::Ready).is_healthy());
        for state in [ModelState::Unloaded, ModelState::Loading, ModelState::Failed] {
            assert_eq!(HealthStatus::from_state(state), HealthStatus::Unhealthy);
        }
    }

    #[test]
    fn test_health_response_serialization() {
        let body = serde_json::to_string(&HealthResponse::from_state(ModelState::Unloaded)).unwrap();
        assert_eq!(body, r#"{"status":"unhealthy"}"#);

        let body = serde_json::to_string(&HealthResponse::from_state(ModelState::Ready)).unwrap();
        assert_eq!(body, r#"{"status":"healthy"}"#);
    }
}
