//! Control API listener settings
//!
//! The listener is an IP literal plus port; hostnames are not resolved.
//! CORS only has to admit the two verbs the control API speaks.

use std::net::{IpAddr, SocketAddr};

use axum::http::{HeaderValue, Method};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Rejected listener settings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpConfigError {
    #[error("invalid bind host '{host}': expected an IPv4 or IPv6 literal")]
    InvalidHost { host: String },

    #[error("invalid CORS origin '{origin}': {reason}")]
    InvalidOrigin { origin: String, reason: String },
}

/// Listener and CORS settings for the control API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServerConfig {
    /// IP to bind to (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to (default: 8090)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed to drive the API from a browser; empty admits any
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

impl HttpServerConfig {
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Address the listener binds to
    pub fn bind_addr(&self) -> Result<SocketAddr, HttpConfigError> {
        let ip: IpAddr = self
            .host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse()
            .map_err(|_| HttpConfigError::InvalidHost {
                host: self.host.clone(),
            })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Check everything `serve` would otherwise only discover at startup
    pub fn validate(&self) -> Result<(), HttpConfigError> {
        self.bind_addr()?;
        for origin in &self.cors_origins {
            parse_origin(origin)?;
        }
        Ok(())
    }

    /// CORS policy for the control routes
    pub fn cors_layer(&self) -> CorsLayer {
        let layer = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any);

        if self.cors_origins.is_empty() {
            return layer.allow_origin(Any);
        }

        // Invalid entries are rejected by validate(); skip them here
        let origins: Vec<HeaderValue> = self
            .cors_origins
            .iter()
            .filter_map(|origin| parse_origin(origin).ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

fn parse_origin(origin: &str) -> Result<HeaderValue, HttpConfigError> {
    let invalid = |reason: &str| HttpConfigError::InvalidOrigin {
        origin: origin.to_string(),
        reason: reason.to_string(),
    };

    let rest = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
        .ok_or_else(|| invalid("must start with http:// or https://"))?;
    if rest.is_empty() || rest.contains('/') {
        return Err(invalid("must be scheme://host[:port] with no path"));
    }

    HeaderValue::from_str(origin).map_err(|e| invalid(&e.to_string()))
}
