//! Resolver error types
//!
//! Both `NotRunning` and `NetworkUnavailable` fail fast; resolution is
//! never retried internally.

use thiserror::Error;

use crate::host::HostError;

/// Resolver errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolverError {
    /// Target process or container is absent or stopped
    #[error("service '{0}' is not running")]
    NotRunning(String),

    /// Running, but no address or enclosing subnet could be determined
    #[error("no network identity for service '{service}': {reason}")]
    NetworkUnavailable { service: String, reason: String },

    /// The inspection tooling itself failed
    #[error("failed to inspect service '{service}': {reason}")]
    Inspect { service: String, reason: String },
}

impl ResolverError {
    pub fn network_unavailable(service: &str, reason: impl Into<String>) -> Self {
        Self::NetworkUnavailable {
            service: service.to_string(),
            reason: reason.into(),
        }
    }

    pub fn inspect(service: &str, reason: impl Into<String>) -> Self {
        Self::Inspect {
            service: service.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn from_host(service: &str, err: HostError) -> Self {
        Self::inspect(service, err.to_string())
    }
}

/// Result type for resolution
pub type ResolverResult<T> = Result<T, ResolverError>;
