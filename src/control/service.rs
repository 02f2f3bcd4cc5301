//! Control Service
//!
//! Orchestrates a partition action:
//! 1. Resolve the service's identity (fresh for every action)
//! 2. Apply or remove the blocking rule
//! 3. Start a transition timer and return without waiting for it
//!
//! Status queries combine the reconciled state with rule presence.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::errors::ControlResult;
use crate::observability::{Event, MetricsRegistry, MetricsSnapshot};
use crate::partition::{PacketFilter, PartitionController, RuleChange, DEFAULT_RESET_GRACE};
use crate::probe::{ConnectivityProbe, RawConnectionState};
use crate::reconciler::{
    ConnectivityState, SharedObserver, StateReconciler, DEFAULT_POLL_INTERVAL,
};
use crate::resolver::{NetworkAddressResolver, NetworkIdentity, Subnet};
use crate::timing::{
    ActionType, TimerConfig, TimerHandle, TransitionLog, TransitionRecord, TransitionStart,
    TransitionTimer, DEFAULT_DISCONNECT_TIMEOUT, DEFAULT_HISTORY, DEFAULT_RECONNECT_TIMEOUT,
};

// ==================
// Settings
// ==================

/// Everything the control service needs besides its collaborators
#[derive(Debug, Clone)]
pub struct ControlSettings {
    /// Name of the dependent service to partition
    pub service: String,
    /// Status endpoint of the dependent service
    pub status_url: String,
    pub poll_interval: Duration,
    pub reset_grace: Duration,
    pub disconnect_timeout: Duration,
    pub reconnect_timeout: Duration,
    /// Finalized transitions kept for reporting
    pub history: usize,
}

impl ControlSettings {
    pub fn new(service: impl Into<String>, status_url: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            status_url: status_url.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            reset_grace: DEFAULT_RESET_GRACE,
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
            reconnect_timeout: DEFAULT_RECONNECT_TIMEOUT,
            history: DEFAULT_HISTORY,
        }
    }
}

// ==================
// Reports
// ==================

/// Timing of the synchronous part of an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionTiming {
    pub requested_at: DateTime<Utc>,
    pub rule_applied_at: DateTime<Utc>,
    /// Milliseconds from request to rule application
    pub elapsed_ms: u64,
}

/// Response to a disconnect or reconnect
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionReport {
    pub success: bool,
    pub action: ActionType,
    pub service: String,
    pub container_address: Ipv4Addr,
    pub subnet: Subnet,
    pub rules_changed: usize,
    pub already_applied: bool,
    /// Id of the transition timer started by this action
    pub transition_id: Uuid,
    pub message: String,
    pub timing: ActionTiming,
}

/// An accepted action and the timer it started
#[derive(Debug)]
pub struct ActionOutcome {
    pub report: ActionReport,
    pub timer: TimerHandle,
}

/// Raw rule-presence view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub service: String,
    pub container_address: Ipv4Addr,
    pub subnet: Subnet,
    pub blocked: bool,
    pub timestamp: DateTime<Utc>,
}

/// Reconciled connectivity plus rule presence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActualConnectionState {
    pub state: ConnectivityState,
    pub connected: bool,
    pub ready_to_test: bool,
    pub raw_state: RawConnectionState,
    /// `None` when rule presence could not be determined
    pub rule_active: Option<bool>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Finalized transitions, newest first
#[derive(Debug, Clone, Serialize)]
pub struct TransitionHistory {
    pub transitions: Vec<TransitionRecord>,
    pub total: usize,
}

// ==================
// Service
// ==================

/// Partition control for one dependent service
pub struct ControlService {
    service: String,
    poll_interval: Duration,
    resolver: Arc<dyn NetworkAddressResolver>,
    controller: PartitionController,
    reconciler: Arc<StateReconciler>,
    timer: TransitionTimer,
    log: Arc<TransitionLog>,
    metrics: Arc<MetricsRegistry>,
}

impl ControlService {
    pub fn new(
        settings: ControlSettings,
        resolver: Arc<dyn NetworkAddressResolver>,
        filter: Arc<dyn PacketFilter>,
        probe: Arc<dyn ConnectivityProbe>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let controller = PartitionController::new(filter, Arc::clone(&metrics))
            .with_reset_grace(settings.reset_grace);

        let reconciler = Arc::new(StateReconciler::new(
            settings.service.clone(),
            settings.status_url,
            probe,
            Arc::clone(&resolver),
            Arc::clone(&metrics),
        ));

        let log = Arc::new(TransitionLog::new(settings.history));
        let timer = TransitionTimer::new(
            Arc::new(SharedObserver::new(Arc::clone(&reconciler), settings.poll_interval)),
            Arc::clone(&log),
            Arc::clone(&metrics),
            TimerConfig {
                poll_interval: settings.poll_interval,
                disconnect_timeout: settings.disconnect_timeout,
                reconnect_timeout: settings.reconnect_timeout,
            },
        );

        Self {
            service: settings.service,
            poll_interval: settings.poll_interval,
            resolver,
            controller,
            reconciler,
            timer,
            log,
            metrics,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn timer(&self) -> &TransitionTimer {
        &self.timer
    }

    /// Block the service's egress beyond its subnet
    pub async fn disconnect(&self) -> ControlResult<ActionOutcome> {
        self.metrics.increment_disconnect_requests();
        tracing::info!(event = %Event::DisconnectRequested, service = %self.service, "disconnect requested");
        self.act(ActionType::Disconnect).await
    }

    /// Remove the block
    pub async fn reconnect(&self) -> ControlResult<ActionOutcome> {
        self.metrics.increment_reconnect_requests();
        tracing::info!(event = %Event::ReconnectRequested, service = %self.service, "reconnect requested");
        self.act(ActionType::Reconnect).await
    }

    async fn act(&self, action: ActionType) -> ControlResult<ActionOutcome> {
        let requested_at = Utc::now();
        let started = Instant::now();

        let identity = self.resolve().await?;
        let change = match action {
            ActionType::Disconnect => self.controller.block(&identity).await?,
            ActionType::Reconnect => self.controller.unblock(&identity).await?,
        };

        let rule_applied_at = Utc::now();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let timer = self.timer.start(TransitionStart {
            action,
            service: self.service.clone(),
            requested_at,
            rule_applied_at,
        });

        let report = ActionReport {
            success: true,
            action,
            service: self.service.clone(),
            container_address: identity.address,
            subnet: identity.subnet,
            rules_changed: change.rules_changed,
            already_applied: change.already_applied,
            transition_id: timer.id,
            message: Self::action_message(action, &identity, change),
            timing: ActionTiming {
                requested_at,
                rule_applied_at,
                elapsed_ms,
            },
        };
        Ok(ActionOutcome { report, timer })
    }

    fn action_message(action: ActionType, identity: &NetworkIdentity, change: RuleChange) -> String {
        match (action, change.already_applied) {
            (ActionType::Disconnect, false) => format!(
                "blocked traffic from {} to destinations outside {}",
                identity.address, identity.subnet
            ),
            (ActionType::Disconnect, true) => format!("{} was already blocked", identity.address),
            (ActionType::Reconnect, false) => format!("unblocked traffic from {}", identity.address),
            (ActionType::Reconnect, true) => format!("{} was not blocked", identity.address),
        }
    }

    async fn resolve(&self) -> ControlResult<NetworkIdentity> {
        match self.resolver.resolve(&self.service).await {
            Ok(identity) => {
                tracing::debug!(
                    event = %Event::IdentityResolved,
                    service = %identity.service_name,
                    address = %identity.address,
                    subnet = %identity.subnet,
                    "identity resolved"
                );
                Ok(identity)
            }
            Err(e) => {
                tracing::warn!(
                    event = %Event::ResolveFailed,
                    service = %self.service,
                    error = %e,
                    "identity resolution failed"
                );
                Err(e.into())
            }
        }
    }

    /// Rule presence for the service's current identity
    pub async fn connection_status(&self) -> ControlResult<ConnectionStatus> {
        let identity = self.resolve().await?;
        let blocked = self.controller.is_blocked(&identity).await?;
        Ok(ConnectionStatus {
            service: self.service.clone(),
            container_address: identity.address,
            subnet: identity.subnet,
            blocked,
            timestamp: Utc::now(),
        })
    }

    /// Reconciled state, probed fresh unless a status younger than one
    /// poll interval is cached
    pub async fn actual_state(&self) -> ActualConnectionState {
        let (status, rule_active) = tokio::join!(
            self.reconciler.current(self.poll_interval),
            self.rule_active()
        );

        ActualConnectionState {
            state: status.state,
            connected: status.connected(),
            ready_to_test: status.ready_to_test,
            raw_state: status.raw_state,
            rule_active,
            message: status.message,
            timestamp: status.observed_at,
        }
    }

    async fn rule_active(&self) -> Option<bool> {
        let identity = self.resolver.resolve(&self.service).await.ok()?;
        self.controller.is_blocked(&identity).await.ok()
    }

    pub fn transitions(&self) -> TransitionHistory {
        let transitions = self.log.records();
        TransitionHistory {
            total: transitions.len(),
            transitions,
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Start the background monitor loop
    pub fn spawn_monitor(&self, cancel: CancellationToken) -> JoinHandle<()> {
        Arc::clone(&self.reconciler).spawn_monitor(self.poll_interval, cancel)
    }

    /// Cancel in-flight transition timers
    pub fn shutdown(&self) {
        tracing::info!(event = %Event::ShutdownStart, service = %self.service, "stopping transition timers");
        self.timer.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlError;
    use crate::partition::{FilterRule, MemoryFilter};
    use crate::probe::ScriptedProbe;
    use crate::resolver::{ResolverError, ResolverResult, StaticResolver};
    use async_trait::async_trait;
    use RawConnectionState::*;

    fn identity() -> NetworkIdentity {
        NetworkIdentity::new(
            "upstream",
            Ipv4Addr::new(172, 18, 0, 40),
            "172.18.0.0/16".parse().unwrap(),
        )
    }

    fn settings() -> ControlSettings {
        let mut settings = ControlSettings::new("upstream", "http://upstream/status");
        settings.reset_grace = Duration::from_millis(10);
        settings
    }

    fn service(script: Vec<RawConnectionState>) -> (ControlService, Arc<MemoryFilter>) {
        let filter = Arc::new(MemoryFilter::new());
        let service = ControlService::new(
            settings(),
            Arc::new(StaticResolver::new(
                Ipv4Addr::new(172, 18, 0, 40),
                "172.18.0.0/16".parse().unwrap(),
            )),
            filter.clone(),
            Arc::new(ScriptedProbe::new(script)),
            Arc::new(MetricsRegistry::new()),
        );
        (service, filter)
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_reports_identity_and_timing() {
        let (service, filter) = service(vec![Valid]);
        let outcome = service.disconnect().await.unwrap();
        let report = &outcome.report;

        assert!(report.success);
        assert_eq!(report.action, ActionType::Disconnect);
        assert_eq!(report.container_address, Ipv4Addr::new(172, 18, 0, 40));
        assert_eq!(report.subnet.to_string(), "172.18.0.0/16");
        assert_eq!(report.rules_changed, 1);
        assert!(!report.already_applied);
        assert!(report.timing.rule_applied_at >= report.timing.requested_at);
        assert_eq!(report.transition_id, outcome.timer.id);
        assert_eq!(filter.count(&FilterRule::blocking(&identity())), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_serializes_wire_shape() {
        let (service, _) = service(vec![Valid]);
        let report = service.disconnect().await.unwrap().report;
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["containerAddress"], "172.18.0.40");
        assert_eq!(json["subnet"], "172.18.0.0/16");
        assert_eq!(json["action"], "disconnect");
        assert!(json["timing"]["requestedAt"].is_string());
        assert!(json["timing"]["ruleAppliedAt"].is_string());
        assert!(json["timing"]["elapsedMs"].is_u64());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_without_rule_is_noop() {
        let (service, filter) = service(vec![Valid]);
        let report = service.reconnect().await.unwrap().report;
        assert!(report.success);
        assert_eq!(report.rules_changed, 0);
        assert!(report.already_applied);
        assert!(filter.rules().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_status_tracks_rule() {
        let (service, _) = service(vec![Valid]);
        assert!(!service.connection_status().await.unwrap().blocked);
        service.disconnect().await.unwrap();
        assert!(service.connection_status().await.unwrap().blocked);
        service.reconnect().await.unwrap();
        assert!(!service.connection_status().await.unwrap().blocked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_actual_state_reports_rule_presence() {
        let (service, _) = service(vec![Valid]);
        service.disconnect().await.unwrap();

        let state = service.actual_state().await;
        assert_eq!(state.rule_active, Some(true));
        assert_eq!(state.raw_state, Valid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_confirmed_in_history() {
        let (service, _) = service(vec![Valid, Valid, Interrupted]);
        let outcome = service.disconnect().await.unwrap();
        let record = outcome.timer.wait().await.unwrap();

        assert!(record.is_confirmed());
        let history = service.transitions();
        assert_eq!(history.total, 1);
        assert_eq!(history.transitions[0].id, record.id);
        assert_eq!(service.metrics().disconnect_requests, 1);
        assert_eq!(service.metrics().transitions_confirmed, 1);
    }

    struct NotRunning;

    #[async_trait]
    impl NetworkAddressResolver for NotRunning {
        async fn resolve(&self, service: &str) -> ResolverResult<NetworkIdentity> {
            Err(ResolverError::NotRunning(service.to_string()))
        }

        async fn is_running(&self, _service: &str) -> ResolverResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_service_fails_fast() {
        let filter = Arc::new(MemoryFilter::new());
        let service = ControlService::new(
            settings(),
            Arc::new(NotRunning),
            filter.clone(),
            Arc::new(ScriptedProbe::new([Unreachable])),
            Arc::new(MetricsRegistry::new()),
        );

        let err = service.disconnect().await.unwrap_err();
        assert!(matches!(err, ControlError::Resolver(ResolverError::NotRunning(_))));
        assert!(filter.rules().is_empty());
        assert!(service.timer().in_flight("upstream").is_none());

        let state = service.actual_state().await;
        assert_eq!(state.state, ConnectivityState::ContainerStopped);
        assert_eq!(state.rule_active, None);
    }
}
