//! Network identity of a resolved service

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An IPv4 network in CIDR notation, normalised to its network address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subnet {
    network: Ipv4Addr,
    prefix: u8,
}

impl Subnet {
    /// Build the subnet enclosing `address` with the given prefix length
    pub fn enclosing(address: Ipv4Addr, prefix: u8) -> Result<Self, String> {
        if prefix > 32 {
            return Err(format!("prefix length {} exceeds 32", prefix));
        }
        let network = u32::from(address) & Self::mask(prefix);
        Ok(Self {
            network: Ipv4Addr::from(network),
            prefix,
        })
    }

    fn mask(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix))
        }
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn contains(&self, address: Ipv4Addr) -> bool {
        u32::from(address) & Self::mask(self.prefix) == u32::from(self.network)
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Subnet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| format!("'{}' is not in CIDR notation", s))?;
        let address: Ipv4Addr = addr
            .trim()
            .parse()
            .map_err(|_| format!("invalid network address in '{}'", s))?;
        let prefix: u8 = prefix
            .trim()
            .parse()
            .map_err(|_| format!("invalid prefix length in '{}'", s))?;
        Self::enclosing(address, prefix)
    }
}

impl TryFrom<String> for Subnet {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Subnet> for String {
    fn from(subnet: Subnet) -> Self {
        subnet.to_string()
    }
}

/// A service's address and the subnet it shares with its local peers.
///
/// Resolved once per action and never cached: an unpinned container may
/// come back with a different address after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkIdentity {
    pub service_name: String,
    pub address: Ipv4Addr,
    pub subnet: Subnet,
}

impl NetworkIdentity {
    pub fn new(service_name: impl Into<String>, address: Ipv4Addr, subnet: Subnet) -> Self {
        Self {
            service_name: service_name.into(),
            address,
            subnet,
        }
    }
}

impl fmt::Display for NetworkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} in {})", self.service_name, self.address, self.subnet)
    }
}
