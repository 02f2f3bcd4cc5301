//! # HTTP Server Module
//!
//! JSON control API over the partition subsystem.
//!
//! # Endpoints
//!
//! - `/health` - Health check
//! - `/api/disconnect`, `/api/reconnect` - Partition actions
//! - `/api/connection-status` - Rule presence
//! - `/api/actual-connection-state` - Reconciled connectivity
//! - `/api/transitions` - Finalized transition timings
//! - `/observability/*` - Metrics and monitoring

pub mod config;
pub mod observability_routes;
pub mod partition_routes;
pub mod server;

pub use config::{HttpConfigError, HttpServerConfig};
pub use server::HttpServer;
