//! Connectivity Reconciliation
//!
//! - States are explicit and enumerable
//! - A state is reported only once it has held for a full poll interval;
//!   until then the reconciler says `TRANSITIONING`
//! - `readyToTest` is true only for settled CONNECTED / DISCONNECTED
//! - Nothing here reads or writes packet-filter rules

mod reconcile;
mod state;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use reconcile::{StateReconciler, DEFAULT_POLL_INTERVAL};
pub use state::{ConnectivityState, ReconciledStatus};

/// Anything that can produce a reconciled status on demand
#[async_trait]
pub trait ConnectivityObserver: Send + Sync {
    /// Observe once and return the reconciled status
    async fn poll(&self) -> ReconciledStatus;
}

/// Observer that reuses a status younger than `max_age`, so transition
/// timers and the monitor loop share one probe per interval.
pub struct SharedObserver {
    reconciler: Arc<StateReconciler>,
    max_age: Duration,
}

impl SharedObserver {
    pub fn new(reconciler: Arc<StateReconciler>, max_age: Duration) -> Self {
        Self { reconciler, max_age }
    }
}

#[async_trait]
impl ConnectivityObserver for SharedObserver {
    async fn poll(&self) -> ReconciledStatus {
        self.reconciler.current(self.max_age).await
    }
}
