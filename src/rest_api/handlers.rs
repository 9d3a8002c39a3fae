//! HTTP handlers for the REST API

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use crate::controller::metrics::encode_registry;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
#[instrument]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Metrics endpoint handler
pub async fn metrics() -> Result<String, StatusCode> {
    encode_registry().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_reports_version() {
        let Json(body) = health().await;
        assert_eq!(body.status, "healthy");
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_metrics_renders_registry() {
        crate::controller::metrics::inc_write_conflict();
        let body = metrics().await.unwrap();
        assert!(body.contains("submariner_status_write_conflicts_total"));
    }
}
