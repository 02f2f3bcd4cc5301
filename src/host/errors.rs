//! Host command errors

use thiserror::Error;

/// Failures to run an external program at all.
///
/// A program that runs and exits non-zero is not a `HostError`; callers
/// inspect `CommandOutput` and decide what the exit status means.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    /// Program could not be started (missing binary, permissions)
    #[error("failed to start '{program}': {reason}")]
    Spawn { program: String, reason: String },

    /// Program did not finish within the allowed time
    #[error("'{program}' did not finish within {after_ms}ms")]
    Timeout { program: String, after_ms: u64 },
}

/// Result type for host command execution
pub type HostResult<T> = Result<T, HostError>;
