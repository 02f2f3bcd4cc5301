//! Partition HTTP Routes
//!
//! Endpoints for triggering partitions and reading connectivity state.

use std::sync::Arc;

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::control::{ControlError, ControlService};

// ==================
// Partition Routes
// ==================

/// Create partition routes (mounted under `/api`)
pub fn partition_routes(service: Arc<ControlService>) -> Router {
    Router::new()
        // Actions
        .route("/disconnect", post(disconnect_handler))
        .route("/reconnect", post(reconnect_handler))
        // Views
        .route("/connection-status", get(connection_status_handler))
        .route("/actual-connection-state", get(actual_state_handler))
        .route("/transitions", get(transitions_handler))
        .with_state(service)
}

// ==================
// Handlers
// ==================

/// POST /disconnect
///
/// Returns once the rule is installed; the transition timer keeps running.
async fn disconnect_handler(
    State(service): State<Arc<ControlService>>,
) -> Result<impl IntoResponse, ControlError> {
    let outcome = service.disconnect().await?;
    Ok(Json(outcome.report))
}

/// POST /reconnect
async fn reconnect_handler(
    State(service): State<Arc<ControlService>>,
) -> Result<impl IntoResponse, ControlError> {
    let outcome = service.reconnect().await?;
    Ok(Json(outcome.report))
}

/// GET /connection-status
async fn connection_status_handler(
    State(service): State<Arc<ControlService>>,
) -> Result<impl IntoResponse, ControlError> {
    Ok(Json(service.connection_status().await?))
}

/// GET /actual-connection-state
async fn actual_state_handler(State(service): State<Arc<ControlService>>) -> impl IntoResponse {
    Json(service.actual_state().await)
}

/// GET /transitions
async fn transitions_handler(State(service): State<Arc<ControlService>>) -> impl IntoResponse {
    Json(service.transitions())
}
