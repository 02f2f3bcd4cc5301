//! Metrics registry for the partition controller
//!
//! - Counters only
//! - Monotonic increase
//! - Reset only on process start
//! - Thread-safe, lock-free

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters
///
/// All counters use Relaxed ordering; readers only need eventual values.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    disconnect_requests: AtomicU64,
    reconnect_requests: AtomicU64,
    rules_installed: AtomicU64,
    rules_removed: AtomicU64,
    rule_failures: AtomicU64,
    probes_issued: AtomicU64,
    probes_unreachable: AtomicU64,
    transitions_confirmed: AtomicU64,
    transitions_timed_out: AtomicU64,
    transitions_superseded: AtomicU64,
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub disconnect_requests: u64,
    pub reconnect_requests: u64,
    pub rules_installed: u64,
    pub rules_removed: u64,
    pub rule_failures: u64,
    pub probes_issued: u64,
    pub probes_unreachable: u64,
    pub transitions_confirmed: u64,
    pub transitions_timed_out: u64,
    pub transitions_superseded: u64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    // Actions

    pub fn increment_disconnect_requests(&self) {
        self.disconnect_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_reconnect_requests(&self) {
        self.reconnect_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Persistent rules installed (transient reset rules are not counted)
    pub fn increment_rules_installed(&self) {
        self.rules_installed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rules_removed(&self) {
        self.rules_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rule_failures(&self) {
        self.rule_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Probes

    pub fn increment_probes(&self) {
        self.probes_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_probes_unreachable(&self) {
        self.probes_unreachable.fetch_add(1, Ordering::Relaxed);
    }

    // Transitions

    pub fn increment_transitions_confirmed(&self) {
        self.transitions_confirmed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_transitions_timed_out(&self) {
        self.transitions_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_transitions_superseded(&self) {
        self.transitions_superseded.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            disconnect_requests: self.disconnect_requests.load(Ordering::Relaxed),
            reconnect_requests: self.reconnect_requests.load(Ordering::Relaxed),
            rules_installed: self.rules_installed.load(Ordering::Relaxed),
            rules_removed: self.rules_removed.load(Ordering::Relaxed),
            rule_failures: self.rule_failures.load(Ordering::Relaxed),
            probes_issued: self.probes_issued.load(Ordering::Relaxed),
            probes_unreachable: self.probes_unreachable.load(Ordering::Relaxed),
            transitions_confirmed: self.transitions_confirmed.load(Ordering::Relaxed),
            transitions_timed_out: self.transitions_timed_out.load(Ordering::Relaxed),
            transitions_superseded: self.transitions_superseded.load(Ordering::Relaxed),
        }
    }
}
