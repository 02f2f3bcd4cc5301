//! Network Address Resolution
//!
//! Resolves a named service to its network identity: the address its
//! traffic leaves from and the subnet it shares with local peers. The
//! subnet lets blocking rules drop only egress that leaves the local
//! network while intra-cluster dependencies stay reachable.
//!
//! Identities are resolved per action and never cached.

mod docker;
mod errors;
mod identity;

use std::net::Ipv4Addr;

use async_trait::async_trait;

pub use docker::DockerResolver;
pub use errors::{ResolverError, ResolverResult};
pub use identity::{NetworkIdentity, Subnet};

/// Resolves services to network identities
#[async_trait]
pub trait NetworkAddressResolver: Send + Sync {
    /// Resolve the service's current identity.
    ///
    /// Fails with `NotRunning` when the service is absent or stopped and
    /// with `NetworkUnavailable` when no address or subnet is assigned.
    async fn resolve(&self, service: &str) -> ResolverResult<NetworkIdentity>;

    /// Whether the service's process is currently running.
    ///
    /// `Ok(false)` is a confirmation; an `Err` means liveness is unknown.
    async fn is_running(&self, service: &str) -> ResolverResult<bool>;
}

/// Resolver for a statically assigned address.
///
/// Liveness cannot be observed, so `is_running` always reports `true`.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    address: Ipv4Addr,
    subnet: Subnet,
}

impl StaticResolver {
    pub fn new(address: Ipv4Addr, subnet: Subnet) -> Self {
        Self { address, subnet }
    }
}

#[async_trait]
impl NetworkAddressResolver for StaticResolver {
    async fn resolve(&self, service: &str) -> ResolverResult<NetworkIdentity> {
        if !self.subnet.contains(self.address) {
            return Err(ResolverError::network_unavailable(
                service,
                format!("{} is outside {}", self.address, self.subnet),
            ));
        }
        Ok(NetworkIdentity::new(service, self.address, self.subnet))
    }

    async fn is_running(&self, _service: &str) -> ResolverResult<bool> {
        Ok(true)
    }
}
