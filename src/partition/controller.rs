//! Partition Controller
//!
//! Installs and removes the persistent blocking rule for an identity.
//!
//! - `block` and `unblock` are idempotent; presence of the DROP rule is
//!   checked on the host every time, never remembered in-process, so a
//!   restarted controller re-detects an existing partition
//! - Calls for the same service are serialized by a per-service lock
//! - A failed install leaves no rule behind
//!
//! Non-Responsibilities:
//! - Does not resolve identities
//! - Does not observe whether the dependent process noticed

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::errors::{FilterError, PartitionError, PartitionResult};
use super::filter::PacketFilter;
use super::rule::FilterRule;
use crate::observability::{Event, MetricsRegistry};
use crate::resolver::NetworkIdentity;

/// Default window the transient reset rules stay installed
pub const DEFAULT_RESET_GRACE: Duration = Duration::from_secs(1);

/// What a block or unblock call changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleChange {
    /// Persistent rules added (block) or removed (unblock)
    pub rules_changed: usize,
    /// The requested end state already held
    pub already_applied: bool,
}

impl RuleChange {
    fn changed() -> Self {
        Self {
            rules_changed: 1,
            already_applied: false,
        }
    }

    fn unchanged() -> Self {
        Self {
            rules_changed: 0,
            already_applied: true,
        }
    }
}

/// One async lock per service, created on first use.
///
/// Owned by the controller that uses it; never global.
#[derive(Debug, Default)]
struct ServiceLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ServiceLocks {
    async fn acquire(&self, service: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(locks.entry(service.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

/// Idempotent, serialized control of blocking rules
pub struct PartitionController {
    filter: Arc<dyn PacketFilter>,
    locks: ServiceLocks,
    reset_grace: Duration,
    metrics: Arc<MetricsRegistry>,
}

impl PartitionController {
    pub fn new(filter: Arc<dyn PacketFilter>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            filter,
            locks: ServiceLocks::default(),
            reset_grace: DEFAULT_RESET_GRACE,
            metrics,
        }
    }

    /// Override how long transient reset rules stay installed
    pub fn with_reset_grace(mut self, grace: Duration) -> Self {
        self.reset_grace = grace;
        self
    }

    pub fn reset_grace(&self) -> Duration {
        self.reset_grace
    }

    /// Whether the persistent blocking rule is installed
    pub async fn is_blocked(&self, identity: &NetworkIdentity) -> PartitionResult<bool> {
        Ok(self.filter.contains(&FilterRule::blocking(identity)).await?)
    }

    /// Block egress from the identity to anything outside its subnet.
    ///
    /// Already-established sessions are reset first so the dependent
    /// process sees the partition immediately instead of after its idle
    /// timeouts.
    pub async fn block(&self, identity: &NetworkIdentity) -> PartitionResult<RuleChange> {
        let _guard = self.locks.acquire(&identity.service_name).await;
        let service = identity.service_name.as_str();
        let blocking = FilterRule::blocking(identity);

        let present = self
            .filter
            .contains(&blocking)
            .await
            .map_err(|e| self.install_failed(service, e))?;
        if present {
            tracing::info!(
                event = %Event::BlockAlreadyPresent,
                service,
                address = %identity.address,
                "blocking rule already installed"
            );
            return Ok(RuleChange::unchanged());
        }

        self.reset_sessions(identity).await?;

        if let Err(e) = self.filter.insert(&blocking).await {
            // A failed -I can still leave the rule behind on some hosts
            self.rollback(&[blocking]).await;
            return Err(self.install_failed(service, e));
        }

        self.metrics.increment_rules_installed();
        tracing::info!(
            event = %Event::BlockApplied,
            service,
            address = %identity.address,
            excluded = %identity.subnet,
            "blocking rule installed"
        );
        Ok(RuleChange::changed())
    }

    /// Remove the blocking rule, plus any transient rule a crashed
    /// `block` may have left behind.
    pub async fn unblock(&self, identity: &NetworkIdentity) -> PartitionResult<RuleChange> {
        let _guard = self.locks.acquire(&identity.service_name).await;
        let service = identity.service_name.as_str();

        let removed = match self.filter.delete(&FilterRule::blocking(identity)).await {
            Ok(removed) => removed,
            Err(e) => {
                self.metrics.increment_rule_failures();
                tracing::error!(
                    event = %Event::RuleRemovalFailed,
                    service,
                    error = %e,
                    "failed to remove blocking rule"
                );
                return Err(PartitionError::removal(service, e));
            }
        };

        for reset in FilterRule::resets(identity) {
            if let Err(e) = self.filter.delete(&reset).await {
                tracing::warn!(service, rule = %reset, error = %e, "stale reset rule not removed");
            }
        }

        if removed {
            self.metrics.increment_rules_removed();
            tracing::info!(
                event = %Event::UnblockApplied,
                service,
                address = %identity.address,
                "blocking rule removed"
            );
            Ok(RuleChange::changed())
        } else {
            tracing::info!(
                event = %Event::UnblockAlreadyAbsent,
                service,
                address = %identity.address,
                "no blocking rule installed"
            );
            Ok(RuleChange::unchanged())
        }
    }

    /// Reset both directions for the grace window, then remove the resets.
    async fn reset_sessions(&self, identity: &NetworkIdentity) -> PartitionResult<()> {
        let service = identity.service_name.as_str();
        let resets = FilterRule::resets(identity);
        let mut installed = Vec::with_capacity(resets.len());

        for reset in &resets {
            match self.filter.insert(reset).await {
                Ok(_) => installed.push(*reset),
                Err(e) => {
                    self.rollback(&installed).await;
                    return Err(self.install_failed(service, e));
                }
            }
        }

        tracing::debug!(
            event = %Event::ResetRulesInstalled,
            service,
            grace_ms = self.reset_grace.as_millis() as u64,
            "resetting established sessions"
        );
        tokio::time::sleep(self.reset_grace).await;

        for reset in &installed {
            if let Err(e) = self.filter.delete(reset).await {
                self.rollback(&installed).await;
                return Err(self.install_failed(service, e));
            }
        }
        Ok(())
    }

    /// Best-effort removal of rules added by a failing call
    async fn rollback(&self, rules: &[FilterRule]) {
        for rule in rules {
            if let Err(e) = self.filter.delete(rule).await {
                tracing::error!(rule = %rule, error = %e, "rollback failed; rule may remain installed");
            }
        }
    }

    fn install_failed(&self, service: &str, source: FilterError) -> PartitionError {
        self.metrics.increment_rule_failures();
        tracing::error!(
            event = %Event::RuleInstallFailed,
            service,
            error = %source,
            "failed to install blocking rule"
        );
        PartitionError::install(service, source)
    }
}
