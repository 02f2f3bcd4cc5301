//! Control API
//!
//! Thin request/response surface over the partition subsystem:
//! - `disconnect` / `reconnect`: idempotent; return once the rule change
//!   is applied and leave a transition timer running
//! - `connection_status`: rule presence for the current identity
//! - `actual_state`: reconciled connectivity plus rule presence
//! - `transitions`: finalized transition history

mod errors;
mod service;

pub use errors::{ControlError, ControlResult, ErrorResponse};
pub use service::{
    ActionOutcome, ActionReport, ActionTiming, ActualConnectionState, ConnectionStatus,
    ControlService, ControlSettings, TransitionHistory,
};
