//! Connectivity snapshots and the status document they are read from

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Connection state reported by the dependent service for its upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RawConnectionState {
    /// Streaming connection established
    Valid,
    /// Connection lost; the service is retrying
    Interrupted,
    /// Connection permanently closed
    Off,
    /// Not yet connected for the first time
    Initializing,
    /// Status endpoint unreachable, timed out or malformed
    Unreachable,
    /// A value this controller does not model
    Unknown,
}

impl RawConnectionState {
    /// Parse a reported state; unmodelled values become `Unknown`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "VALID" => Self::Valid,
            "INTERRUPTED" => Self::Interrupted,
            "OFF" => Self::Off,
            "INITIALIZING" => Self::Initializing,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Interrupted => "INTERRUPTED",
            Self::Off => "OFF",
            Self::Initializing => "INITIALIZING",
            Self::Unreachable => "UNREACHABLE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Ordering used to fold several environments into one state;
    /// higher is less healthy.
    fn severity(&self) -> u8 {
        match self {
            Self::Valid => 0,
            Self::Initializing => 1,
            Self::Unknown => 2,
            Self::Interrupted => 3,
            Self::Off => 4,
            Self::Unreachable => 5,
        }
    }

    /// The less healthy of two states
    pub fn worst(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for RawConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation of the dependent service. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivitySnapshot {
    raw_state: RawConnectionState,
    observed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl ConnectivitySnapshot {
    pub fn new(raw_state: RawConnectionState) -> Self {
        Self {
            raw_state,
            observed_at: Utc::now(),
            detail: None,
        }
    }

    /// An `UNREACHABLE` snapshot explaining why
    pub fn unreachable(detail: impl Into<String>) -> Self {
        Self {
            raw_state: RawConnectionState::Unreachable,
            observed_at: Utc::now(),
            detail: Some(detail.into()),
        }
    }

    pub fn raw_state(&self) -> RawConnectionState {
        self.raw_state
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}

/// Read the connection state out of a status document.
///
/// Accepts the relay layout, one entry per environment:
///
/// ```json
/// {"environments": {"prod": {"connectionStatus": {"state": "VALID"}}}}
/// ```
///
/// and the flat application layout `{"connectionState": "VALID"}`.
/// Several environments fold to the least healthy state. Returns `None`
/// when the document carries no state at all.
pub fn parse_status_document(doc: &Value) -> Option<RawConnectionState> {
    if let Some(environments) = doc.get("environments").and_then(Value::as_object) {
        return environments
            .values()
            .map(|env| {
                env.pointer("/connectionStatus/state")
                    .and_then(Value::as_str)
                    .map(RawConnectionState::parse)
                    .unwrap_or(RawConnectionState::Unknown)
            })
            .reduce(RawConnectionState::worst);
    }

    doc.get("connectionState")
        .and_then(Value::as_str)
        .map(RawConnectionState::parse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_known_and_unknown_states() {
        assert_eq!(RawConnectionState::parse("VALID"), RawConnectionState::Valid);
        assert_eq!(RawConnectionState::parse("interrupted"), RawConnectionState::Interrupted);
        assert_eq!(RawConnectionState::parse("OFF"), RawConnectionState::Off);
        assert_eq!(RawConnectionState::parse("INITIALIZING"), RawConnectionState::Initializing);
        assert_eq!(RawConnectionState::parse("DEGRADED"), RawConnectionState::Unknown);
        assert_eq!(RawConnectionState::parse(""), RawConnectionState::Unknown);
    }

    #[test]
    fn test_relay_document_single_environment() {
        let doc = json!({
            "status": "healthy",
            "environments": {
                "production": {
                    "status": "connected",
                    "connectionStatus": {"state": "VALID", "stateSince": 1700000000000u64}
                }
            }
        });
        assert_eq!(parse_status_document(&doc), Some(RawConnectionState::Valid));
    }

    #[test]
    fn test_relay_document_folds_to_least_healthy() {
        let doc = json!({
            "environments": {
                "a": {"connectionStatus": {"state": "VALID"}},
                "b": {"connectionStatus": {"state": "INTERRUPTED"}},
                "c": {"connectionStatus": {"state": "INITIALIZING"}}
            }
        });
        assert_eq!(parse_status_document(&doc), Some(RawConnectionState::Interrupted));
    }

    #[test]
    fn test_environment_without_state_is_unknown() {
        let doc = json!({"environments": {"a": {"status": "connected"}}});
        assert_eq!(parse_status_document(&doc), Some(RawConnectionState::Unknown));
    }

    #[test]
    fn test_flat_document() {
        let doc = json!({"connected": false, "connectionState": "OFF", "sdkVersion": "9.0.0"});
        assert_eq!(parse_status_document(&doc), Some(RawConnectionState::Off));
    }

    #[test]
    fn test_document_without_state() {
        assert_eq!(parse_status_document(&json!({"status": "ok"})), None);
        assert_eq!(parse_status_document(&json!({"environments": {}})), None);
        assert_eq!(parse_status_document(&json!([1, 2])), None);
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = ConnectivitySnapshot::unreachable("connection refused");
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["rawState"], "UNREACHABLE");
        assert_eq!(json["detail"], "connection refused");
        assert!(json.get("observedAt").is_some());
    }
}
