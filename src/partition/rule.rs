//! Packet-filter rules managed by the controller
//!
//! A rule is identified by (kind, address, excluded subnet). Only the
//! persistent DROP rule outlives a single call; its presence is the
//! durable record that a disconnect was requested.

use std::fmt;
use std::net::Ipv4Addr;

use serde::Serialize;

use crate::resolver::{NetworkIdentity, Subnet};

/// Comment attached to every installed rule so operators can find them
pub const RULE_COMMENT: &str = "netpartition";

/// What a rule matches and does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Persistent: drop traffic from the address leaving the subnet
    Drop,
    /// Transient: reset TCP sessions from the address leaving the subnet
    ResetEgress,
    /// Transient: reset TCP sessions arriving at the address from outside
    ResetIngress,
}

impl RuleKind {
    pub fn is_transient(&self) -> bool {
        !matches!(self, RuleKind::Drop)
    }
}

/// A forwarding rule scoped to one identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRule {
    pub kind: RuleKind,
    pub address: Ipv4Addr,
    pub excluded: Subnet,
}

impl FilterRule {
    /// The persistent blocking rule for an identity
    pub fn blocking(identity: &NetworkIdentity) -> Self {
        Self {
            kind: RuleKind::Drop,
            address: identity.address,
            excluded: identity.subnet,
        }
    }

    /// Transient reset rules, one per direction
    pub fn resets(identity: &NetworkIdentity) -> [Self; 2] {
        [
            Self {
                kind: RuleKind::ResetEgress,
                address: identity.address,
                excluded: identity.subnet,
            },
            Self {
                kind: RuleKind::ResetIngress,
                address: identity.address,
                excluded: identity.subnet,
            },
        ]
    }

    /// iptables match/target arguments, without the chain command
    pub fn iptables_spec(&self) -> Vec<String> {
        let address = self.address.to_string();
        let excluded = self.excluded.to_string();
        let (from, to) = match self.kind {
            RuleKind::Drop | RuleKind::ResetEgress => (("-s", &address), ("-d", &excluded)),
            RuleKind::ResetIngress => (("-d", &address), ("-s", &excluded)),
        };

        let mut spec = vec![
            from.0.to_string(),
            from.1.clone(),
            "!".to_string(),
            to.0.to_string(),
            to.1.clone(),
        ];
        let target: &[&str] = match self.kind {
            RuleKind::Drop => &["-j", "DROP"],
            RuleKind::ResetEgress | RuleKind::ResetIngress => {
                &["-p", "tcp", "-j", "REJECT", "--reject-with", "tcp-reset"]
            }
        };
        spec.extend(target.iter().map(|s| s.to_string()));
        spec.extend(
            ["-m", "comment", "--comment", RULE_COMMENT]
                .iter()
                .map(|s| s.to_string()),
        );
        spec
    }
}

impl fmt::Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RuleKind::Drop => write!(f, "DROP {} -> !{}", self.address, self.excluded),
            RuleKind::ResetEgress => write!(f, "RESET {} -> !{}", self.address, self.excluded),
            RuleKind::ResetIngress => write!(f, "RESET !{} -> {}", self.excluded, self.address),
        }
    }
}
