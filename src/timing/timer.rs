//! Transition Timer
//!
//! Measures how long the dependent process takes to notice a partition
//! action. One detached task per action:
//!
//! 1. Poll the observer immediately, then once per interval
//! 2. Finish as confirmed when the action's target state is reported
//! 3. Finish as timed out when the budget elapses
//!
//! A newer action for the same service cancels the in-flight timer; the
//! cancelled timer exits without a record. Timers only observe; they
//! never touch packet-filter rules.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::log::TransitionLog;
use super::record::{ActionType, TransitionOutcome, TransitionRecord};
use crate::observability::{Event, MetricsRegistry};
use crate::reconciler::ConnectivityObserver;

/// Default budget for a disconnect to be noticed
pub const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(120);
/// Default budget for a reconnect to be noticed
pub const DEFAULT_RECONNECT_TIMEOUT: Duration = Duration::from_secs(240);

/// Poll cadence and per-action budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    pub poll_interval: Duration,
    pub disconnect_timeout: Duration,
    pub reconnect_timeout: Duration,
}

impl TimerConfig {
    pub fn budget(&self, action: ActionType) -> Duration {
        match action {
            ActionType::Disconnect => self.disconnect_timeout,
            ActionType::Reconnect => self.reconnect_timeout,
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            poll_interval: crate::reconciler::DEFAULT_POLL_INTERVAL,
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
            reconnect_timeout: DEFAULT_RECONNECT_TIMEOUT,
        }
    }
}

/// Facts known when the partition controller returns
#[derive(Debug, Clone)]
pub struct TransitionStart {
    pub action: ActionType,
    pub service: String,
    pub requested_at: DateTime<Utc>,
    pub rule_applied_at: DateTime<Utc>,
}

/// Handle to a running timer.
///
/// The task resolves to `None` when superseded. Dropping the handle
/// detaches the task.
#[derive(Debug)]
pub struct TimerHandle {
    pub id: Uuid,
    pub join: JoinHandle<Option<TransitionRecord>>,
}

impl TimerHandle {
    /// Wait for the timer to finish
    pub async fn wait(self) -> Option<TransitionRecord> {
        self.join.await.ok().flatten()
    }
}

/// Starts and supersedes transition timers
pub struct TransitionTimer {
    observer: Arc<dyn ConnectivityObserver>,
    log: Arc<TransitionLog>,
    metrics: Arc<MetricsRegistry>,
    config: TimerConfig,
    in_flight: Arc<Mutex<HashMap<String, (Uuid, CancellationToken)>>>,
}

impl TransitionTimer {
    pub fn new(
        observer: Arc<dyn ConnectivityObserver>,
        log: Arc<TransitionLog>,
        metrics: Arc<MetricsRegistry>,
        config: TimerConfig,
    ) -> Self {
        Self {
            observer,
            log,
            metrics,
            config,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    /// Timer id currently in flight for a service
    pub fn in_flight(&self, service: &str) -> Option<Uuid> {
        self.in_flight
            .lock()
            .ok()
            .and_then(|m| m.get(service).map(|(id, _)| *id))
    }

    /// Start timing an action, cancelling any timer already running for
    /// the same service.
    pub fn start(&self, start: TransitionStart) -> TimerHandle {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        let superseded = {
            let mut in_flight = match self.in_flight.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            in_flight.insert(start.service.clone(), (id, cancel.clone()))
        };
        if let Some((_, stale)) = superseded {
            stale.cancel();
        }

        tracing::info!(
            event = %Event::TransitionStarted,
            transition_id = %id,
            action = %start.action,
            service = %start.service,
            budget_ms = self.config.budget(start.action).as_millis() as u64,
            "transition timer started"
        );

        let run = TimerRun {
            id,
            start,
            observer: Arc::clone(&self.observer),
            log: Arc::clone(&self.log),
            metrics: Arc::clone(&self.metrics),
            config: self.config,
            in_flight: Arc::clone(&self.in_flight),
        };
        let join = tokio::spawn(run.execute(cancel));
        TimerHandle { id, join }
    }

    /// Cancel every in-flight timer
    pub fn cancel_all(&self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            for (_, (_, token)) in in_flight.drain() {
                token.cancel();
            }
        }
    }
}

struct TimerRun {
    id: Uuid,
    start: TransitionStart,
    observer: Arc<dyn ConnectivityObserver>,
    log: Arc<TransitionLog>,
    metrics: Arc<MetricsRegistry>,
    config: TimerConfig,
    in_flight: Arc<Mutex<HashMap<String, (Uuid, CancellationToken)>>>,
}

impl TimerRun {
    async fn execute(self, cancel: CancellationToken) -> Option<TransitionRecord> {
        let target = self.start.action.target_state();
        let budget = self.config.budget(self.start.action);
        let started = Instant::now();

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut polls = 0u32;

        let record = loop {
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.superseded(polls);
                    return None;
                }
                status = async {
                    ticker.tick().await;
                    self.observer.poll().await
                } => status,
            };
            polls += 1;

            let elapsed = started.elapsed();
            if status.state == target {
                break self.finalize(
                    elapsed,
                    polls,
                    |at| TransitionOutcome::Confirmed { confirmed_at: at },
                );
            }
            if elapsed >= budget {
                break self.finalize(elapsed, polls, |at| TransitionOutcome::TimedOut {
                    timed_out_at: at,
                    last_state: Some(status.state),
                });
            }
        };

        self.release();
        self.report(&record);
        self.log.push(record.clone());
        Some(record)
    }

    fn finalize(
        &self,
        elapsed: Duration,
        polls: u32,
        outcome: impl FnOnce(DateTime<Utc>) -> TransitionOutcome,
    ) -> TransitionRecord {
        // Derived from the monotonic clock so the finish time and
        // elapsed_ms always agree.
        let finished_at = chrono::Duration::from_std(elapsed)
            .ok()
            .and_then(|d| self.start.rule_applied_at.checked_add_signed(d))
            .unwrap_or_else(Utc::now);

        TransitionRecord {
            id: self.id,
            action: self.start.action,
            service: self.start.service.clone(),
            requested_at: self.start.requested_at,
            rule_applied_at: self.start.rule_applied_at,
            outcome: outcome(finished_at),
            elapsed_ms: elapsed.as_millis() as u64,
            polls,
        }
    }

    fn report(&self, record: &TransitionRecord) {
        match &record.outcome {
            TransitionOutcome::Confirmed { confirmed_at } => {
                self.metrics.increment_transitions_confirmed();
                tracing::info!(
                    event = %Event::TransitionConfirmed,
                    transition_id = %record.id,
                    action = %record.action,
                    service = %record.service,
                    requested_at = %record.requested_at.to_rfc3339(),
                    rule_applied_at = %record.rule_applied_at.to_rfc3339(),
                    confirmed_at = %confirmed_at.to_rfc3339(),
                    elapsed_ms = record.elapsed_ms,
                    polls = record.polls,
                    "transition confirmed"
                );
            }
            TransitionOutcome::TimedOut {
                timed_out_at,
                last_state,
            } => {
                self.metrics.increment_transitions_timed_out();
                tracing::warn!(
                    event = %Event::TransitionTimedOut,
                    transition_id = %record.id,
                    action = %record.action,
                    service = %record.service,
                    rule_applied_at = %record.rule_applied_at.to_rfc3339(),
                    timed_out_at = %timed_out_at.to_rfc3339(),
                    last_state = last_state.map(|s| s.as_str()).unwrap_or("NONE"),
                    elapsed_ms = record.elapsed_ms,
                    polls = record.polls,
                    "transition not observed within budget"
                );
            }
        }
    }

    fn superseded(&self, polls: u32) {
        self.metrics.increment_transitions_superseded();
        tracing::info!(
            event = %Event::TransitionSuperseded,
            transition_id = %self.id,
            action = %self.start.action,
            service = %self.start.service,
            polls,
            "transition timer superseded"
        );
    }

    /// Drop the in-flight entry unless a newer timer already replaced it
    fn release(&self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            if in_flight
                .get(&self.start.service)
                .is_some_and(|(id, _)| *id == self.id)
            {
                in_flight.remove(&self.start.service);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::{ConnectivityState, ReconciledStatus};
    use crate::probe::RawConnectionState;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Reports a fixed sequence of reconciled states, repeating the last
    struct Sequence(Mutex<VecDeque<ConnectivityState>>, Mutex<ConnectivityState>);

    impl Sequence {
        fn new(states: impl IntoIterator<Item = ConnectivityState>) -> Arc<Self> {
            Arc::new(Self(
                Mutex::new(states.into_iter().collect()),
                Mutex::new(ConnectivityState::Transitioning),
            ))
        }
    }

    #[async_trait]
    impl ConnectivityObserver for Sequence {
        async fn poll(&self) -> ReconciledStatus {
            let mut last = self.1.lock().unwrap();
            if let Some(next) = self.0.lock().unwrap().pop_front() {
                *last = next;
            }
            ReconciledStatus {
                state: *last,
                ready_to_test: last.is_ready_to_test(),
                raw_state: RawConnectionState::Unknown,
                message: String::new(),
                observed_at: Utc::now(),
            }
        }
    }

    fn config() -> TimerConfig {
        TimerConfig {
            poll_interval: Duration::from_secs(2),
            disconnect_timeout: Duration::from_secs(20),
            reconnect_timeout: Duration::from_secs(40),
        }
    }

    fn timer(observer: Arc<dyn ConnectivityObserver>) -> (TransitionTimer, Arc<TransitionLog>, Arc<MetricsRegistry>) {
        let log = Arc::new(TransitionLog::default());
        let metrics = Arc::new(MetricsRegistry::new());
        let timer = TransitionTimer::new(observer, log.clone(), metrics.clone(), config());
        (timer, log, metrics)
    }

    fn start(action: ActionType) -> TransitionStart {
        let now = Utc::now();
        TransitionStart {
            action,
            service: "upstream".to_string(),
            requested_at: now,
            rule_applied_at: now,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_matches_polls_to_target() {
        use ConnectivityState::*;
        // Target reported on the poll N intervals after the first
        for n in [0u64, 1, 4, 7] {
            let mut states = vec![Connected; n as usize];
            states.push(Disconnected);
            let (timer, _, _) = timer(Sequence::new(states));

            let record = timer.start(start(ActionType::Disconnect)).wait().await.unwrap();
            assert!(record.is_confirmed());
            let expected = n * 2000;
            assert!(record.elapsed_ms.abs_diff(expected) <= 2000, "n={} got {}", n, record.elapsed_ms);
            assert_eq!(record.polls as u64, n + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_at_agrees_with_elapsed() {
        let (timer, log, metrics) = timer(Sequence::new([
            ConnectivityState::Transitioning,
            ConnectivityState::Connected,
        ]));
        let start = start(ActionType::Reconnect);
        let applied = start.rule_applied_at;

        let record = timer.start(start).wait().await.unwrap();
        match record.outcome {
            TransitionOutcome::Confirmed { confirmed_at } => {
                assert_eq!((confirmed_at - applied).num_milliseconds() as u64, record.elapsed_ms);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(log.len(), 1);
        assert_eq!(metrics.snapshot().transitions_confirmed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_recorded_not_raised() {
        let (timer, log, metrics) = timer(Sequence::new([ConnectivityState::Transitioning]));

        let record = timer.start(start(ActionType::Disconnect)).wait().await.unwrap();
        match record.outcome {
            TransitionOutcome::TimedOut { last_state, .. } => {
                assert_eq!(last_state, Some(ConnectivityState::Transitioning));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(record.elapsed_ms >= 20_000);
        assert!(record.elapsed_ms < 22_000);
        assert_eq!(log.len(), 1);
        assert_eq!(metrics.snapshot().transitions_timed_out, 1);
        assert!(timer.in_flight("upstream").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_uses_its_own_budget() {
        let (timer, _, _) = timer(Sequence::new([ConnectivityState::Disconnected]));
        let record = timer.start(start(ActionType::Reconnect)).wait().await.unwrap();
        assert!(!record.is_confirmed());
        assert!(record.elapsed_ms >= 40_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_action_supersedes_in_flight_timer() {
        let (timer, log, metrics) = timer(Sequence::new([ConnectivityState::Transitioning]));

        let stale = timer.start(start(ActionType::Disconnect));
        tokio::time::sleep(Duration::from_secs(3)).await;
        let fresh = timer.start(start(ActionType::Reconnect));
        assert_eq!(timer.in_flight("upstream"), Some(fresh.id));

        assert!(stale.wait().await.is_none());
        assert_eq!(metrics.snapshot().transitions_superseded, 1);

        // The newer timer still runs to its own outcome
        let record = fresh.wait().await.unwrap();
        assert_eq!(record.action, ActionType::Reconnect);
        assert_eq!(log.len(), 1);
        assert_eq!(log.latest().unwrap().action, ActionType::Reconnect);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timers_for_different_services_are_independent() {
        let (timer, log, metrics) = timer(Sequence::new([ConnectivityState::Disconnected]));
        let mut other = start(ActionType::Disconnect);
        other.service = "other".to_string();

        let a = timer.start(start(ActionType::Disconnect));
        let b = timer.start(other);
        assert!(a.wait().await.is_some());
        assert!(b.wait().await.is_some());
        assert_eq!(log.len(), 2);
        assert_eq!(metrics.snapshot().transitions_superseded, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let (timer, log, _) = timer(Sequence::new([ConnectivityState::Transitioning]));
        let handle = timer.start(start(ActionType::Disconnect));
        timer.cancel_all();
        assert!(handle.wait().await.is_none());
        assert!(log.is_empty());
    }
}
