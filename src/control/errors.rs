//! # Control Errors
//!
//! Failures surfaced by the control service. Every variant renders as a
//! structured JSON payload with an HTTP error status; none of them take
//! the hosting process down.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::partition::PartitionError;
use crate::resolver::ResolverError;

/// Result type for control operations
pub type ControlResult<T> = Result<T, ControlError>;

/// Control service errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlError {
    // ==================
    // Resolution
    // ==================
    /// Service could not be resolved to an identity
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    // ==================
    // Packet filter
    // ==================
    /// Rule installation, removal or lookup failed
    #[error(transparent)]
    Partition(#[from] PartitionError),
}

impl ControlError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 409 Conflict: nothing to partition right now
            ControlError::Resolver(ResolverError::NotRunning(_)) => StatusCode::CONFLICT,

            // 503 Service Unavailable
            ControlError::Resolver(ResolverError::NetworkUnavailable { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // 502 Bad Gateway: container tooling failed
            ControlError::Resolver(ResolverError::Inspect { .. }) => StatusCode::BAD_GATEWAY,

            // 500 Internal Server Error
            ControlError::Partition(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            ControlError::Resolver(ResolverError::NotRunning(_)) => "NOT_RUNNING",
            ControlError::Resolver(ResolverError::NetworkUnavailable { .. }) => "NETWORK_UNAVAILABLE",
            ControlError::Resolver(ResolverError::Inspect { .. }) => "INSPECT_FAILED",
            ControlError::Partition(PartitionError::RuleInstallFailure { .. }) => "RULE_INSTALL_FAILURE",
            ControlError::Partition(PartitionError::RuleRemovalFailure { .. }) => "RULE_REMOVAL_FAILURE",
            ControlError::Partition(PartitionError::Query(_)) => "FILTER_QUERY_FAILED",
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub kind: &'static str,
    pub code: u16,
}

impl From<ControlError> for ErrorResponse {
    fn from(err: ControlError) -> Self {
        Self {
            success: false,
            code: err.status_code().as_u16(),
            kind: err.kind(),
            error: err.to_string(),
        }
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse::from(self));
        (status, body).into_response()
    }
}
