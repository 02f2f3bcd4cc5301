//! HTTP status probe

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::snapshot::{parse_status_document, ConnectivitySnapshot};
use super::ConnectivityProbe;

/// Default bound on a single status request
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Polls a status endpoint over HTTP
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(2)))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn query(&self, endpoint: &str) -> ConnectivitySnapshot {
        let response = match self.client.get(endpoint).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return ConnectivitySnapshot::unreachable(format!("timed out: {}", endpoint))
            }
            Err(e) if e.is_connect() => {
                return ConnectivitySnapshot::unreachable(format!("cannot connect to {}", endpoint))
            }
            Err(e) => return ConnectivitySnapshot::unreachable(e.to_string()),
        };

        // Error statuses still carry a usable document on some services
        let status = response.status();
        let doc: Value = match response.json().await {
            Ok(doc) => doc,
            Err(e) => {
                return ConnectivitySnapshot::unreachable(format!(
                    "malformed status document (HTTP {}): {}",
                    status.as_u16(),
                    e
                ))
            }
        };

        match parse_status_document(&doc) {
            Some(state) => ConnectivitySnapshot::new(state),
            None => ConnectivitySnapshot::unreachable(format!(
                "status document has no connection state (HTTP {})",
                status.as_u16()
            )),
        }
    }
}
