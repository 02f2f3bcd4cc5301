//! State Reconciler
//!
//! Converts raw snapshots into a settled connectivity state:
//! 1. A confirmed-stopped process reports `CONTAINER_STOPPED`
//! 2. A raw state that differs from the previous observation reports
//!    `TRANSITIONING`
//! 3. A raw state equal to the previous observation is mapped
//!    (`VALID` → `CONNECTED`, `INTERRUPTED`/`OFF` → `DISCONNECTED`, ...)
//!
//! The result is derived only from observation, never from the action
//! that was taken. A dependent process can take many poll intervals to
//! notice a partition on its own.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::state::{ConnectivityState, ReconciledStatus};
use super::ConnectivityObserver;
use crate::observability::{Event, MetricsRegistry};
use crate::probe::{ConnectivityProbe, ConnectivitySnapshot, RawConnectionState};
use crate::resolver::NetworkAddressResolver;

/// Default interval between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
struct History {
    previous_raw: Option<RawConnectionState>,
    last_reported: Option<ConnectivityState>,
    latest: Option<(Instant, ReconciledStatus)>,
}

/// Settles raw observations of one service into a connectivity state
pub struct StateReconciler {
    service: String,
    endpoint: String,
    probe: Arc<dyn ConnectivityProbe>,
    resolver: Arc<dyn NetworkAddressResolver>,
    metrics: Arc<MetricsRegistry>,
    history: Mutex<History>,
    /// Held across a shared probe so overlapping callers never take two
    /// samples in the same interval
    poll_gate: tokio::sync::Mutex<()>,
}

impl StateReconciler {
    pub fn new(
        service: impl Into<String>,
        endpoint: impl Into<String>,
        probe: Arc<dyn ConnectivityProbe>,
        resolver: Arc<dyn NetworkAddressResolver>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            service: service.into(),
            endpoint: endpoint.into(),
            probe,
            resolver,
            metrics,
            history: Mutex::new(History::default()),
            poll_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn with_history<T>(&self, f: impl FnOnce(&mut History) -> T) -> T {
        let mut guard = match self.history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Apply one observation.
    ///
    /// `running` is `Some(false)` only when the process is confirmed
    /// stopped; `None` means liveness could not be determined.
    pub fn step(&self, snapshot: &ConnectivitySnapshot, running: Option<bool>) -> ReconciledStatus {
        let raw = snapshot.raw_state();
        let previous = self.with_history(|h| h.previous_raw.replace(raw));

        let (state, message) = if running == Some(false) {
            (
                ConnectivityState::ContainerStopped,
                format!("service '{}' is not running", self.service),
            )
        } else if previous != Some(raw) {
            let message = match previous {
                Some(previous) => {
                    format!("upstream state changed {} -> {}; waiting to settle", previous, raw)
                }
                None => format!("first observation {}; waiting to settle", raw),
            };
            (ConnectivityState::Transitioning, message)
        } else {
            let state = ConnectivityState::from_settled(raw);
            (state, Self::settled_message(state, snapshot))
        };

        let status = ReconciledStatus {
            state,
            ready_to_test: state.is_ready_to_test(),
            raw_state: raw,
            message,
            observed_at: snapshot.observed_at(),
        };

        let changed = self.with_history(|h| {
            let changed = h.last_reported != Some(state);
            h.last_reported = Some(state);
            h.latest = Some((Instant::now(), status.clone()));
            changed
        });
        if changed {
            tracing::info!(
                event = %Event::StateChanged,
                service = %self.service,
                state = %state,
                raw_state = %raw,
                ready_to_test = status.ready_to_test,
                "connectivity state changed"
            );
        }

        status
    }

    fn settled_message(state: ConnectivityState, snapshot: &ConnectivitySnapshot) -> String {
        match state {
            ConnectivityState::Connected => "upstream connection established".to_string(),
            ConnectivityState::Disconnected => "upstream connection lost".to_string(),
            ConnectivityState::Initializing => "service has not connected upstream yet".to_string(),
            ConnectivityState::Error => match snapshot.raw_state() {
                RawConnectionState::Unknown => "service reports an unrecognized upstream state".to_string(),
                _ => snapshot
                    .detail()
                    .map(|d| format!("status endpoint unreachable: {}", d))
                    .unwrap_or_else(|| "status endpoint unreachable".to_string()),
            },
            ConnectivityState::Transitioning | ConnectivityState::ContainerStopped => {
                state.as_str().to_string()
            }
        }
    }

    /// Liveness of the service; `None` when it cannot be determined
    async fn liveness(&self) -> Option<bool> {
        match self.resolver.is_running(&self.service).await {
            Ok(running) => Some(running),
            Err(e) => {
                tracing::debug!(service = %self.service, error = %e, "liveness unknown");
                None
            }
        }
    }

    /// The most recent status if it is younger than `max_age`
    pub fn cached(&self, max_age: Duration) -> Option<ReconciledStatus> {
        self.with_history(|h| {
            h.latest
                .as_ref()
                .filter(|(at, _)| at.elapsed() < max_age)
                .map(|(_, status)| status.clone())
        })
    }

    /// Cached status when fresh enough, otherwise a fresh poll.
    ///
    /// Concurrent callers that miss the cache are serialized; whoever waited
    /// on the gate gets the status the first caller just produced.
    pub async fn current(&self, max_age: Duration) -> ReconciledStatus {
        if let Some(status) = self.cached(max_age) {
            return status;
        }

        let _gate = self.poll_gate.lock().await;
        match self.cached(max_age) {
            Some(status) => status,
            None => self.poll().await,
        }
    }

    /// Keep polling until cancelled so `current` stays fresh
    pub fn spawn_monitor(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                self.current(interval).await;
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            tracing::debug!(service = %self.service, "connectivity monitor stopped");
        })
    }
}

#[async_trait]
impl ConnectivityObserver for StateReconciler {
    async fn poll(&self) -> ReconciledStatus {
        let (snapshot, running) = tokio::join!(self.probe.query(&self.endpoint), self.liveness());

        self.metrics.increment_probes();
        if snapshot.raw_state() == RawConnectionState::Unreachable {
            self.metrics.increment_probes_unreachable();
            tracing::warn!(
                event = %Event::ProbeUnreachable,
                service = %self.service,
                endpoint = %self.endpoint,
                detail = snapshot.detail().unwrap_or_default(),
                "status endpoint unreachable"
            );
        }

        self.step(&snapshot, running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ScriptedProbe;
    use crate::resolver::{ResolverError, ResolverResult, NetworkIdentity, StaticResolver};
    use std::net::Ipv4Addr;
    use RawConnectionState::*;

    fn static_resolver() -> Arc<dyn NetworkAddressResolver> {
        Arc::new(StaticResolver::new(
            Ipv4Addr::new(172, 18, 0, 40),
            "172.18.0.0/16".parse().unwrap(),
        ))
    }

    fn reconciler(script: Vec<RawConnectionState>) -> StateReconciler {
        StateReconciler::new(
            "upstream",
            "http://upstream/status",
            Arc::new(ScriptedProbe::new(script)),
            static_resolver(),
            Arc::new(MetricsRegistry::new()),
        )
    }

    #[test]
    fn test_first_observation_is_transitioning() {
        let r = reconciler(vec![]);
        let status = r.step(&ConnectivitySnapshot::new(Valid), Some(true));
        assert_eq!(status.state, ConnectivityState::Transitioning);
        assert!(!status.ready_to_test);
    }

    #[test]
    fn test_settling_sequence() {
        let r = reconciler(vec![]);
        let states: Vec<_> = [Valid, Valid, Interrupted, Interrupted, Interrupted]
            .into_iter()
            .map(|raw| r.step(&ConnectivitySnapshot::new(raw), Some(true)))
            .collect();

        assert_eq!(states[1].state, ConnectivityState::Connected);
        assert!(states[1].ready_to_test);
        assert_eq!(states[2].state, ConnectivityState::Transitioning);
        assert!(!states[2].ready_to_test);
        for status in &states[3..] {
            assert_eq!(status.state, ConnectivityState::Disconnected);
            assert!(status.ready_to_test);
        }
    }

    #[test]
    fn test_off_settles_to_disconnected() {
        let r = reconciler(vec![]);
        r.step(&ConnectivitySnapshot::new(Off), None);
        let status = r.step(&ConnectivitySnapshot::new(Off), None);
        assert_eq!(status.state, ConnectivityState::Disconnected);
    }

    #[test]
    fn test_stopped_overrides_raw_state() {
        let r = reconciler(vec![]);
        r.step(&ConnectivitySnapshot::new(Valid), Some(true));
        let status = r.step(&ConnectivitySnapshot::new(Valid), Some(false));
        assert_eq!(status.state, ConnectivityState::ContainerStopped);
        assert!(!status.ready_to_test);
        assert!(status.message.contains("not running"));
    }

    #[test]
    fn test_unknown_liveness_does_not_imply_stopped() {
        let r = reconciler(vec![]);
        r.step(&ConnectivitySnapshot::new(Valid), None);
        let status = r.step(&ConnectivitySnapshot::new(Valid), None);
        assert_eq!(status.state, ConnectivityState::Connected);
    }

    #[test]
    fn test_settled_unreachable_is_error() {
        let r = reconciler(vec![]);
        r.step(&ConnectivitySnapshot::unreachable("refused"), Some(true));
        let status = r.step(&ConnectivitySnapshot::unreachable("refused"), Some(true));
        assert_eq!(status.state, ConnectivityState::Error);
        assert!(!status.ready_to_test);
        assert!(status.message.contains("refused"));
    }

    #[test]
    fn test_settled_unknown_is_error() {
        let r = reconciler(vec![]);
        r.step(&ConnectivitySnapshot::new(Unknown), Some(true));
        let status = r.step(&ConnectivitySnapshot::new(Unknown), Some(true));
        assert_eq!(status.state, ConnectivityState::Error);
        assert!(status.message.contains("unrecognized"));
    }

    #[tokio::test]
    async fn test_poll_counts_unreachable_probes() {
        let metrics = Arc::new(MetricsRegistry::new());
        let r = StateReconciler::new(
            "upstream",
            "http://upstream/status",
            Arc::new(ScriptedProbe::new([Unreachable, Valid])),
            static_resolver(),
            metrics.clone(),
        );
        r.poll().await;
        r.poll().await;
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.probes_issued, 2);
        assert_eq!(snapshot.probes_unreachable, 1);
    }

    struct Stopped;

    #[async_trait]
    impl NetworkAddressResolver for Stopped {
        async fn resolve(&self, service: &str) -> ResolverResult<NetworkIdentity> {
            Err(ResolverError::NotRunning(service.to_string()))
        }

        async fn is_running(&self, _service: &str) -> ResolverResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_poll_reports_stopped_container() {
        let r = StateReconciler::new(
            "upstream",
            "http://upstream/status",
            Arc::new(ScriptedProbe::new([Unreachable])),
            Arc::new(Stopped),
            Arc::new(MetricsRegistry::new()),
        );
        assert_eq!(r.poll().await.state, ConnectivityState::ContainerStopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_uses_cache_within_max_age() {
        let r = reconciler(vec![Valid, Interrupted]);
        let first = r.current(Duration::from_secs(2)).await;
        assert_eq!(first.raw_state, Valid);

        // Within max age: cached, the script is not advanced
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(r.current(Duration::from_secs(2)).await.raw_state, Valid);

        // Past max age: fresh probe
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(r.current(Duration::from_secs(2)).await.raw_state, Interrupted);
    }

    /// Status endpoint that answers after a fixed delay
    struct Delayed {
        inner: ScriptedProbe,
        latency: Duration,
    }

    #[async_trait]
    impl ConnectivityProbe for Delayed {
        async fn query(&self, endpoint: &str) -> ConnectivitySnapshot {
            tokio::time::sleep(self.latency).await;
            self.inner.query(endpoint).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_callers_share_one_sample() {
        let metrics = Arc::new(MetricsRegistry::new());
        let r = StateReconciler::new(
            "upstream",
            "http://upstream/status",
            Arc::new(Delayed {
                inner: ScriptedProbe::new([Valid, Valid, Interrupted, Interrupted]),
                latency: Duration::from_millis(300),
            }),
            static_resolver(),
            metrics.clone(),
        );
        let interval = Duration::from_secs(2);

        r.current(interval).await;
        tokio::time::sleep(interval).await;
        assert_eq!(r.current(interval).await.state, ConnectivityState::Connected);

        // Cache is stale; both callers miss it at the same instant
        tokio::time::sleep(interval).await;
        let (a, b) = tokio::join!(r.current(interval), r.current(interval));
        assert_eq!(a, b);
        assert_eq!(a.state, ConnectivityState::Transitioning);
        assert!(!a.ready_to_test);
        assert_eq!(metrics.snapshot().probes_issued, 3);

        // Settles only after a full interval
        tokio::time::sleep(interval).await;
        let settled = r.current(interval).await;
        assert_eq!(settled.state, ConnectivityState::Disconnected);
        assert!(settled.ready_to_test);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_shares_gate_with_callers() {
        let metrics = Arc::new(MetricsRegistry::new());
        let r = Arc::new(StateReconciler::new(
            "upstream",
            "http://upstream/status",
            Arc::new(Delayed {
                inner: ScriptedProbe::new([Valid]),
                latency: Duration::from_millis(300),
            }),
            static_resolver(),
            metrics.clone(),
        ));
        let cancel = CancellationToken::new();
        let handle = Arc::clone(&r).spawn_monitor(Duration::from_secs(2), cancel.clone());

        // Arrives while the monitor's first probe is in flight
        tokio::time::sleep(Duration::from_millis(100)).await;
        let status = r.current(Duration::from_secs(2)).await;
        assert_eq!(status.raw_state, Valid);
        assert_eq!(metrics.snapshot().probes_issued, 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_polls_until_cancelled() {
        let r = Arc::new(reconciler(vec![Valid, Valid, Valid]));
        let cancel = CancellationToken::new();
        let handle = Arc::clone(&r).spawn_monitor(Duration::from_secs(2), cancel.clone());

        tokio::time::sleep(Duration::from_secs(3)).await;
        let status = r.cached(Duration::from_secs(10)).unwrap();
        assert_eq!(status.state, ConnectivityState::Connected);

        cancel.cancel();
        handle.await.unwrap();
    }
}
