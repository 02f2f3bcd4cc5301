//! Observable events for the partition controller
//!
//! Every externally meaningful step emits exactly one typed event:
//! - Partition actions (block / unblock and their failures)
//! - Probe outcomes that change how the reconciler reports
//! - Transition timer lifecycle
//! - Server lifecycle
//!
//! Events are explicit and typed; call sites never invent event names.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Configuration loaded and validated
    ConfigLoaded,
    /// HTTP surface bound and serving
    Serving,
    /// Shutdown requested
    ShutdownStart,

    // Resolution
    /// Service resolved to an address and subnet
    IdentityResolved,
    /// Service could not be resolved
    ResolveFailed,

    // Partition actions
    /// Disconnect requested by a caller
    DisconnectRequested,
    /// Reconnect requested by a caller
    ReconnectRequested,
    /// Transient connection-reset rules installed
    ResetRulesInstalled,
    /// Persistent DROP rule installed
    BlockApplied,
    /// DROP rule already present, nothing changed
    BlockAlreadyPresent,
    /// Persistent DROP rule removed
    UnblockApplied,
    /// No DROP rule present, nothing changed
    UnblockAlreadyAbsent,
    /// Filter command failed; partial state rolled back
    RuleInstallFailed,
    /// Filter command failed while removing a rule
    RuleRemovalFailed,

    // Observation
    /// Status endpoint unreachable or malformed
    ProbeUnreachable,
    /// Reconciled state changed
    StateChanged,

    // Transition timing
    /// Timer started for an action
    TransitionStarted,
    /// Expected terminal state observed
    TransitionConfirmed,
    /// Budget elapsed before terminal state was observed
    TransitionTimedOut,
    /// Timer cancelled by a newer action
    TransitionSuperseded,
}

impl Event {
    /// Returns the stable event name
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "config.loaded",
            Event::Serving => "server.serving",
            Event::ShutdownStart => "server.shutdown",
            Event::IdentityResolved => "resolver.resolved",
            Event::ResolveFailed => "resolver.failed",
            Event::DisconnectRequested => "control.disconnect.requested",
            Event::ReconnectRequested => "control.reconnect.requested",
            Event::ResetRulesInstalled => "partition.reset.installed",
            Event::BlockApplied => "partition.block.applied",
            Event::BlockAlreadyPresent => "partition.block.already_present",
            Event::UnblockApplied => "partition.unblock.applied",
            Event::UnblockAlreadyAbsent => "partition.unblock.already_absent",
            Event::RuleInstallFailed => "partition.rule.install_failed",
            Event::RuleRemovalFailed => "partition.rule.removal_failed",
            Event::ProbeUnreachable => "probe.unreachable",
            Event::StateChanged => "reconciler.state_changed",
            Event::TransitionStarted => "transition.started",
            Event::TransitionConfirmed => "transition.confirmed",
            Event::TransitionTimedOut => "transition.timed_out",
            Event::TransitionSuperseded => "transition.superseded",
        }
    }

    /// Returns true if this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::ResolveFailed | Event::RuleInstallFailed | Event::RuleRemovalFailed
        )
    }

    /// Returns true if this event is degraded-but-expected
    pub fn is_warning(&self) -> bool {
        matches!(self, Event::ProbeUnreachable | Event::TransitionTimedOut)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_dotted() {
        let events = [
            Event::BlockApplied,
            Event::UnblockApplied,
            Event::TransitionConfirmed,
            Event::ProbeUnreachable,
        ];
        for event in events {
            assert!(event.as_str().contains('.'), "{} is not dotted", event);
        }
    }

    #[test]
    fn test_failure_classification() {
        assert!(Event::RuleInstallFailed.is_failure());
        assert!(!Event::BlockApplied.is_failure());
        // A timeout is an observational outcome, not a failure
        assert!(!Event::TransitionTimedOut.is_failure());
        assert!(Event::TransitionTimedOut.is_warning());
    }
}
