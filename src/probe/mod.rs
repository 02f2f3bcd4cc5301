//! Connectivity Probe
//!
//! Asks the dependent service how it sees its own upstream connection.
//!
//! - Every call produces a fresh, immutable snapshot
//! - The probe never fails: unreachable, slow or malformed endpoints
//!   produce an `UNREACHABLE` snapshot
//! - Unmodelled state strings are kept as `UNKNOWN`

mod client;
mod snapshot;

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

pub use client::{HttpProbe, DEFAULT_PROBE_TIMEOUT};
pub use snapshot::{parse_status_document, ConnectivitySnapshot, RawConnectionState};

/// Source of connectivity snapshots
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn query(&self, endpoint: &str) -> ConnectivitySnapshot;
}

/// Replays a fixed sequence of states, repeating the last one forever.
///
/// Used for dry runs and tests where no dependent service exists.
#[derive(Debug)]
pub struct ScriptedProbe {
    script: Mutex<VecDeque<RawConnectionState>>,
    last: Mutex<RawConnectionState>,
}

impl ScriptedProbe {
    pub fn new(script: impl IntoIterator<Item = RawConnectionState>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(RawConnectionState::Unknown),
        }
    }

    /// Append states to the end of the script
    pub fn push(&self, states: impl IntoIterator<Item = RawConnectionState>) {
        if let Ok(mut script) = self.script.lock() {
            script.extend(states);
        }
    }

    fn next_state(&self) -> RawConnectionState {
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match self.last.lock() {
            Ok(mut last) => {
                if let Some(state) = next {
                    *last = state;
                }
                *last
            }
            Err(_) => next.unwrap_or(RawConnectionState::Unknown),
        }
    }
}

#[async_trait]
impl ConnectivityProbe for ScriptedProbe {
    async fn query(&self, _endpoint: &str) -> ConnectivitySnapshot {
        ConnectivitySnapshot::new(self.next_state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RawConnectionState::*;

    #[tokio::test]
    async fn test_scripted_probe_repeats_last_state() {
        let probe = ScriptedProbe::new([Valid, Interrupted]);
        assert_eq!(probe.query("").await.raw_state(), Valid);
        assert_eq!(probe.query("").await.raw_state(), Interrupted);
        assert_eq!(probe.query("").await.raw_state(), Interrupted);

        probe.push([Valid]);
        assert_eq!(probe.query("").await.raw_state(), Valid);
    }

    #[tokio::test]
    async fn test_empty_script_is_unknown() {
        let probe = ScriptedProbe::new([]);
        assert_eq!(probe.query("").await.raw_state(), Unknown);
    }
}
