//! netpartition - simulate an upstream network partition for a service
//! and observe when the service notices
//!
//! Leaves first:
//! - `host`: privileged command execution in the host network namespace
//! - `resolver`: service name to address and subnet
//! - `probe`: the service's self-reported upstream connection state
//! - `partition`: idempotent blocking rules
//! - `reconciler`: raw observations to a settled connectivity state
//! - `timing`: how long each action takes to be observed
//! - `control`: disconnect / reconnect / status orchestration
//! - `http_server`, `cli`: outer surfaces

pub mod cli;
pub mod control;
pub mod host;
pub mod http_server;
pub mod observability;
pub mod partition;
pub mod probe;
pub mod reconciler;
pub mod resolver;
pub mod timing;
