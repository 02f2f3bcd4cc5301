//! Reconciled connectivity states

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::probe::RawConnectionState;

/// Connectivity as inferred from repeated observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectivityState {
    /// Upstream link valid and settled
    Connected,
    /// Upstream link interrupted or off, and settled
    Disconnected,
    /// Latest observation differs from the one before it
    Transitioning,
    /// Dependent service has not connected yet
    Initializing,
    /// Dependent service's process is not running
    ContainerStopped,
    /// Status endpoint unreachable or reporting an unmodelled state
    Error,
}

impl ConnectivityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
            Self::Transitioning => "TRANSITIONING",
            Self::Initializing => "INITIALIZING",
            Self::ContainerStopped => "CONTAINER_STOPPED",
            Self::Error => "ERROR",
        }
    }

    /// Map a settled raw state
    pub fn from_settled(raw: RawConnectionState) -> Self {
        match raw {
            RawConnectionState::Valid => Self::Connected,
            RawConnectionState::Interrupted | RawConnectionState::Off => Self::Disconnected,
            RawConnectionState::Initializing => Self::Initializing,
            RawConnectionState::Unreachable | RawConnectionState::Unknown => Self::Error,
        }
    }

    /// Only settled connected/disconnected states can be trusted as ground truth
    pub fn is_ready_to_test(&self) -> bool {
        matches!(self, Self::Connected | Self::Disconnected)
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one reconciliation step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledStatus {
    pub state: ConnectivityState,
    pub ready_to_test: bool,
    pub raw_state: RawConnectionState,
    pub message: String,
    pub observed_at: DateTime<Utc>,
}

impl ReconciledStatus {
    pub fn connected(&self) -> bool {
        self.state == ConnectivityState::Connected
    }
}
