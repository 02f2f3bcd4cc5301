//! Observability subsystem
//!
//! This module provides:
//! - Structured logging (JSON lines via `tracing`)
//! - Typed event names
//! - Monotonic operational counters
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. Logging or metric failures never change control behaviour
//! 3. One log line per event, carrying the event name as `event`
//!
//! # Usage
//!
//! ```ignore
//! use netpartition::observability::{Event, MetricsRegistry};
//!
//! tracing::info!(event = %Event::BlockApplied, address = "172.18.0.40", "drop rule installed");
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_rules_installed();
//! ```

mod events;
mod logging;
mod metrics;

pub use events::Event;
pub use logging::{init_logging, LogFormat};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
