//! Partition error types
//!
//! A failed install is all-or-nothing: by the time `RuleInstallFailure`
//! reaches the caller, every rule added during that call has been rolled
//! back (or the rollback failure has been logged).

use thiserror::Error;

use crate::host::HostError;

/// Packet-filter command failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FilterError {
    /// The filter refused the command for lack of privilege
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The filter command ran and failed
    #[error("filter command failed (exit {code:?}): {message}")]
    CommandFailed { code: Option<i32>, message: String },

    /// The filter command could not be run
    #[error(transparent)]
    Host(#[from] HostError),
}

/// Result type for packet-filter operations
pub type FilterResult<T> = Result<T, FilterError>;

/// Partition controller errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PartitionError {
    /// Blocking could not be applied; no partial rule remains
    #[error("failed to install blocking rule for '{service}': {source}")]
    RuleInstallFailure {
        service: String,
        #[source]
        source: FilterError,
    },

    /// The blocking rule could not be removed
    #[error("failed to remove blocking rule for '{service}': {source}")]
    RuleRemovalFailure {
        service: String,
        #[source]
        source: FilterError,
    },

    /// Rule presence could not be determined
    #[error("failed to query packet filter: {0}")]
    Query(#[from] FilterError),
}

impl PartitionError {
    pub fn install(service: &str, source: FilterError) -> Self {
        Self::RuleInstallFailure {
            service: service.to_string(),
            source,
        }
    }

    pub fn removal(service: &str, source: FilterError) -> Self {
        Self::RuleRemovalFailure {
            service: service.to_string(),
            source,
        }
    }
}

/// Result type for partition operations
pub type PartitionResult<T> = Result<T, PartitionError>;
