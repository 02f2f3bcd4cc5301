//! CLI module for netpartition
//!
//! Provides command-line interface for:
//! - serve: control API plus background connectivity monitor
//! - disconnect / reconnect: one-shot partition actions
//! - status: rule presence and reconciled connectivity
//! - check-config: validate a configuration file

mod args;
mod commands;
mod config;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{act, build_service, check_config, run, run_command, serve, status};
pub use config::{Config, StaticIdentity};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::write_json;
