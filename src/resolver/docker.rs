//! Container resolution through the `docker` CLI

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::errors::{ResolverError, ResolverResult};
use super::identity::{NetworkIdentity, Subnet};
use super::NetworkAddressResolver;
use crate::host::CommandRunner;

// ==================
// `docker inspect` document (only the fields we read)
// ==================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedContainer {
    #[serde(default)]
    state: ContainerState,
    #[serde(default)]
    network_settings: NetworkSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerState {
    #[serde(default)]
    running: bool,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkSettings {
    #[serde(default)]
    networks: BTreeMap<String, EndpointSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct EndpointSettings {
    #[serde(rename = "IPAddress", default)]
    ip_address: String,
    #[serde(rename = "IPPrefixLen", default)]
    ip_prefix_len: u8,
}

/// Resolves services by inspecting containers of the local engine
pub struct DockerResolver {
    runner: Arc<dyn CommandRunner>,
    /// Network to read the address from; first attached network if unset
    network: Option<String>,
}

impl DockerResolver {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            network: None,
        }
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    async fn inspect(&self, service: &str) -> ResolverResult<InspectedContainer> {
        let args = vec![
            "inspect".to_string(),
            "--type".to_string(),
            "container".to_string(),
            service.to_string(),
        ];
        let output = self
            .runner
            .run("docker", &args)
            .await
            .map_err(|e| ResolverError::from_host(service, e))?;

        if !output.success() {
            let diagnostic = output.diagnostic();
            if diagnostic.contains("No such object") || diagnostic.contains("No such container") {
                return Err(ResolverError::NotRunning(service.to_string()));
            }
            return Err(ResolverError::inspect(service, diagnostic));
        }

        let mut containers: Vec<InspectedContainer> = serde_json::from_str(&output.stdout)
            .map_err(|e| ResolverError::inspect(service, format!("unreadable inspect output: {}", e)))?;

        if containers.is_empty() {
            return Err(ResolverError::NotRunning(service.to_string()));
        }
        Ok(containers.swap_remove(0))
    }

    fn identity_from(
        &self,
        service: &str,
        container: &InspectedContainer,
    ) -> ResolverResult<NetworkIdentity> {
        let networks = &container.network_settings.networks;
        let endpoint = match &self.network {
            Some(name) => networks.get(name).ok_or_else(|| {
                ResolverError::network_unavailable(service, format!("not attached to network '{}'", name))
            })?,
            None => networks
                .values()
                .find(|e| !e.ip_address.is_empty())
                .ok_or_else(|| ResolverError::network_unavailable(service, "no network address assigned"))?,
        };

        if endpoint.ip_address.is_empty() {
            return Err(ResolverError::network_unavailable(service, "no network address assigned"));
        }

        let address: Ipv4Addr = endpoint.ip_address.parse().map_err(|_| {
            ResolverError::network_unavailable(
                service,
                format!("'{}' is not an IPv4 address", endpoint.ip_address),
            )
        })?;

        if endpoint.ip_prefix_len == 0 {
            return Err(ResolverError::network_unavailable(service, "enclosing subnet unknown"));
        }
        let subnet = Subnet::enclosing(address, endpoint.ip_prefix_len)
            .map_err(|reason| ResolverError::network_unavailable(service, reason))?;

        Ok(NetworkIdentity::new(service, address, subnet))
    }
}

#[async_trait]
impl NetworkAddressResolver for DockerResolver {
    async fn resolve(&self, service: &str) -> ResolverResult<NetworkIdentity> {
        let container = self.inspect(service).await?;
        if !container.state.running {
            return Err(ResolverError::NotRunning(service.to_string()));
        }
        self.identity_from(service, &container)
    }

    async fn is_running(&self, service: &str) -> ResolverResult<bool> {
        match self.inspect(service).await {
            Ok(container) => {
                tracing::trace!(service, status = %container.state.status, "container state");
                Ok(container.state.running)
            }
            Err(ResolverError::NotRunning(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
