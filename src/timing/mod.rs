//! Transition Timing
//!
//! Times the interval between a partition action and the dependent
//! process being observed in the action's terminal state.
//!
//! - One record per action, finalized exactly once (confirmed or timed out)
//! - Superseded timers produce no record
//! - Finalized records are kept in a bounded, newest-first log

mod log;
mod record;
mod timer;

pub use log::{TransitionLog, DEFAULT_HISTORY};
pub use record::{ActionType, TransitionOutcome, TransitionRecord};
pub use timer::{
    TimerConfig, TimerHandle, TransitionStart, TransitionTimer, DEFAULT_DISCONNECT_TIMEOUT,
    DEFAULT_RECONNECT_TIMEOUT,
};
