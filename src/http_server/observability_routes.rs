//! Observability HTTP Routes
//!
//! Health check and counters.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use crate::control::ControlService;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

/// Create observability routes (mounted under `/observability`)
pub fn observability_routes(service: Arc<ControlService>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(service)
}

/// Health check route (also available at root /health)
pub fn health_routes(service: Arc<ControlService>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(service)
}

/// Health check handler
///
/// Reports this process only; the dependent service's health is what
/// `/api/actual-connection-state` is for.
async fn health_handler(State(service): State<Arc<ControlService>>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: service.service().to_string(),
    };

    (StatusCode::OK, Json(response))
}

/// Metrics handler - returns counters as JSON
async fn metrics_handler(State(service): State<Arc<ControlService>>) -> impl IntoResponse {
    (StatusCode::OK, Json(service.metrics()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            service: "upstream".to_string(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("ok"));
        assert!(json.contains("upstream"));
    }
}
