//! Configuration file
//!
//! JSON, loaded and validated before anything else starts. Every field
//! except `service` has a default.

use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{CliError, CliResult};
use crate::control::ControlSettings;
use crate::host::HostExecMode;
use crate::http_server::HttpServerConfig;
use crate::observability::LogFormat;
use crate::partition::DEFAULT_CHAIN;
use crate::resolver::Subnet;

/// A pinned address that bypasses container inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticIdentity {
    pub address: Ipv4Addr,
    pub subnet: Subnet,
}

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Container name of the dependent service (required)
    pub service: String,

    /// Status endpoint of the dependent service
    /// (default: `http://<service>:8030/status`)
    #[serde(default)]
    pub status_url: Option<String>,

    /// Pinned identity; when absent the container is inspected per action
    #[serde(default)]
    pub static_identity: Option<StaticIdentity>,

    /// Container network to read the address from (default: the only one)
    #[serde(default)]
    pub network: Option<String>,

    /// Packet-filter chain (default: DOCKER-USER)
    #[serde(default = "default_chain")]
    pub chain: String,

    /// How privileged commands reach the host namespace (default: direct)
    #[serde(default)]
    pub host_exec: HostExecMode,

    #[serde(default = "default_reset_grace_ms")]
    pub reset_grace_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Bound on any single host command
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    #[serde(default = "default_disconnect_timeout_secs")]
    pub disconnect_timeout_secs: u64,

    #[serde(default = "default_reconnect_timeout_secs")]
    pub reconnect_timeout_secs: u64,

    /// Finalized transitions kept for `/api/transitions`
    #[serde(default = "default_transition_history")]
    pub transition_history: usize,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default)]
    pub http: HttpServerConfig,
}

fn default_chain() -> String {
    DEFAULT_CHAIN.to_string()
}
fn default_reset_grace_ms() -> u64 {
    1000
}
fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_probe_timeout_ms() -> u64 {
    5000
}
fn default_command_timeout_ms() -> u64 {
    15000
}
fn default_disconnect_timeout_secs() -> u64 {
    120
}
fn default_reconnect_timeout_secs() -> u64 {
    240
}
fn default_transition_history() -> usize {
    50
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::config_error(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parse and validate configuration JSON
    pub fn parse(content: &str) -> CliResult<Self> {
        let config: Config = serde_json::from_str(content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.service.trim().is_empty() {
            return Err(CliError::config_error("service must not be empty"));
        }

        if self.chain.trim().is_empty() {
            return Err(CliError::config_error("chain must not be empty"));
        }

        if let Some(url) = &self.status_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(CliError::config_error(format!(
                    "status_url must be an http(s) URL, got '{}'",
                    url
                )));
            }
        }

        self.http
            .validate()
            .map_err(|e| CliError::config_error(format!("http: {}", e)))?;

        if let Some(identity) = &self.static_identity {
            if !identity.subnet.contains(identity.address) {
                return Err(CliError::config_error(format!(
                    "static_identity address {} is outside {}",
                    identity.address, identity.subnet
                )));
            }
        }

        for (name, value) in [
            ("poll_interval_ms", self.poll_interval_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
            ("command_timeout_ms", self.command_timeout_ms),
            ("disconnect_timeout_secs", self.disconnect_timeout_secs),
            ("reconnect_timeout_secs", self.reconnect_timeout_secs),
        ] {
            if value == 0 {
                return Err(CliError::config_error(format!("{} must be > 0", name)));
            }
        }

        if self.disconnect_timeout_secs * 1000 < self.poll_interval_ms
            || self.reconnect_timeout_secs * 1000 < self.poll_interval_ms
        {
            return Err(CliError::config_error(
                "transition timeouts must be at least one poll interval",
            ));
        }

        Ok(())
    }

    pub fn status_url(&self) -> String {
        self.status_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:8030/status", self.service))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Settings for the control service
    pub fn control_settings(&self) -> ControlSettings {
        ControlSettings {
            service: self.service.clone(),
            status_url: self.status_url(),
            poll_interval: self.poll_interval(),
            reset_grace: Duration::from_millis(self.reset_grace_ms),
            disconnect_timeout: Duration::from_secs(self.disconnect_timeout_secs),
            reconnect_timeout: Duration::from_secs(self.reconnect_timeout_secs),
            history: self.transition_history,
        }
    }
}
