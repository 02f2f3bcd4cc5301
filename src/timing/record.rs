//! Transition records

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::reconciler::ConnectivityState;

/// Partition action being timed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Disconnect,
    Reconnect,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnect => "disconnect",
            Self::Reconnect => "reconnect",
        }
    }

    /// Reconciled state that confirms the action took effect
    pub fn target_state(&self) -> ConnectivityState {
        match self {
            Self::Disconnect => ConnectivityState::Disconnected,
            Self::Reconnect => ConnectivityState::Connected,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a timed transition ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome {
    /// Target state observed
    #[serde(rename_all = "camelCase")]
    Confirmed { confirmed_at: DateTime<Utc> },
    /// Budget elapsed first; not an error
    #[serde(rename_all = "camelCase")]
    TimedOut {
        timed_out_at: DateTime<Utc>,
        last_state: Option<ConnectivityState>,
    },
}

/// A finalized transition. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub id: Uuid,
    pub action: ActionType,
    pub service: String,
    pub requested_at: DateTime<Utc>,
    pub rule_applied_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: TransitionOutcome,
    /// Milliseconds from rule application to confirmation or timeout
    pub elapsed_ms: u64,
    /// Polls issued before the timer finished
    pub polls: u32,
}

impl TransitionRecord {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.outcome, TransitionOutcome::Confirmed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_states() {
        assert_eq!(ActionType::Disconnect.target_state(), ConnectivityState::Disconnected);
        assert_eq!(ActionType::Reconnect.target_state(), ConnectivityState::Connected);
    }

    #[test]
    fn test_record_serialization() {
        let now = Utc::now();
        let record = TransitionRecord {
            id: Uuid::nil(),
            action: ActionType::Reconnect,
            service: "upstream".to_string(),
            requested_at: now,
            rule_applied_at: now,
            outcome: TransitionOutcome::TimedOut {
                timed_out_at: now,
                last_state: Some(ConnectivityState::Transitioning),
            },
            elapsed_ms: 240_000,
            polls: 121,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["action"], "reconnect");
        assert_eq!(json["outcome"], "timed_out");
        assert_eq!(json["lastState"], "TRANSITIONING");
        assert_eq!(json["elapsedMs"], 240_000);
        assert!(json.get("timedOutAt").is_some());
        assert!(json.get("confirmedAt").is_none());
        assert!(!record.is_confirmed());
    }
}
