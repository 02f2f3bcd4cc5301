//! Partition Subsystem
//!
//! Simulates a network partition between a service and everything
//! outside its local subnet by managing host packet-filter rules.
//!
//! - The persistent DROP rule is the only durable state; its presence
//!   means "disconnect requested" and survives restarts of this process
//! - Transient reset rules force already-open TCP sessions closed
//! - Installation and removal are idempotent and serialized per service
//! - Failures are all-or-nothing

mod controller;
mod errors;
mod filter;
mod rule;

pub use controller::{PartitionController, RuleChange, DEFAULT_RESET_GRACE};
pub use errors::{FilterError, FilterResult, PartitionError, PartitionResult};
pub use filter::{IptablesFilter, MemoryFilter, PacketFilter, DEFAULT_CHAIN};
pub use rule::{FilterRule, RuleKind, RULE_COMMENT};
