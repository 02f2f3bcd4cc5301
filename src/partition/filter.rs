//! Packet-filter adapters
//!
//! - `IptablesFilter`: netfilter forwarding chain, executed through `HostExec`
//! - `MemoryFilter`: in-process rule set for dry runs and tests
//!
//! Both are idempotent: inserting a present rule and deleting an absent
//! rule succeed without changing anything.

use std::sync::Mutex;

use async_trait::async_trait;

use super::errors::{FilterError, FilterResult};
use super::rule::FilterRule;
use crate::host::{CommandOutput, HostExec};

/// Default forwarding chain consulted before the engine's own rules
pub const DEFAULT_CHAIN: &str = "DOCKER-USER";

/// Seconds to wait for the xtables lock before failing
const XTABLES_WAIT_SECS: &str = "5";

/// A host packet filter
#[async_trait]
pub trait PacketFilter: Send + Sync {
    /// Whether the rule is currently installed
    async fn contains(&self, rule: &FilterRule) -> FilterResult<bool>;

    /// Install the rule; returns false if it was already present
    async fn insert(&self, rule: &FilterRule) -> FilterResult<bool>;

    /// Remove the rule; returns false if it was already absent
    async fn delete(&self, rule: &FilterRule) -> FilterResult<bool>;
}

// =============================================================================
// iptables
// =============================================================================

/// netfilter rules managed with `iptables`
#[derive(Debug, Clone)]
pub struct IptablesFilter {
    exec: HostExec,
    chain: String,
}

impl IptablesFilter {
    pub fn new(exec: HostExec, chain: impl Into<String>) -> Self {
        Self {
            exec,
            chain: chain.into(),
        }
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    fn args(&self, command: &str, rule: &FilterRule) -> Vec<String> {
        let mut args = vec![
            "-w".to_string(),
            XTABLES_WAIT_SECS.to_string(),
            command.to_string(),
            self.chain.clone(),
        ];
        args.extend(rule.iptables_spec());
        args
    }

    async fn iptables(&self, command: &str, rule: &FilterRule) -> FilterResult<CommandOutput> {
        let args = self.args(command, rule);
        Ok(self.exec.run("iptables", &args).await?)
    }

    fn failure(output: &CommandOutput) -> FilterError {
        let message = output.diagnostic();
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("permission denied") || lowered.contains("you must be root") {
            FilterError::PermissionDenied(message)
        } else {
            FilterError::CommandFailed {
                code: output.status,
                message,
            }
        }
    }

    /// `-C` and `-D` exit 1 when the rule does not exist
    fn is_missing_rule(output: &CommandOutput) -> bool {
        output.status == Some(1) && !Self::is_permission_failure(output)
    }

    fn is_permission_failure(output: &CommandOutput) -> bool {
        matches!(Self::failure(output), FilterError::PermissionDenied(_))
    }
}

#[async_trait]
impl PacketFilter for IptablesFilter {
    async fn contains(&self, rule: &FilterRule) -> FilterResult<bool> {
        let output = self.iptables("-C", rule).await?;
        if output.success() {
            Ok(true)
        } else if Self::is_missing_rule(&output) {
            Ok(false)
        } else {
            Err(Self::failure(&output))
        }
    }

    async fn insert(&self, rule: &FilterRule) -> FilterResult<bool> {
        if self.contains(rule).await? {
            return Ok(false);
        }
        let output = self.iptables("-I", rule).await?;
        if output.success() {
            Ok(true)
        } else {
            Err(Self::failure(&output))
        }
    }

    async fn delete(&self, rule: &FilterRule) -> FilterResult<bool> {
        let output = self.iptables("-D", rule).await?;
        if output.success() {
            Ok(true)
        } else if Self::is_missing_rule(&output) {
            Ok(false)
        } else {
            Err(Self::failure(&output))
        }
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// In-process rule set.
///
/// Check and insert are separate steps, like the two commands an
/// iptables insert takes, so unsynchronised callers can race into
/// duplicates exactly as they would against a real host.
#[derive(Debug, Default)]
pub struct MemoryFilter {
    rules: Mutex<Vec<FilterRule>>,
}

impl MemoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every installed rule, duplicates included
    pub fn rules(&self) -> Vec<FilterRule> {
        self.rules.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of installed copies of `rule`
    pub fn count(&self, rule: &FilterRule) -> usize {
        self.rules().iter().filter(|r| *r == rule).count()
    }

    fn with_rules<T>(&self, f: impl FnOnce(&mut Vec<FilterRule>) -> T) -> T {
        let mut guard = match self.rules.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl PacketFilter for MemoryFilter {
    async fn contains(&self, rule: &FilterRule) -> FilterResult<bool> {
        Ok(self.with_rules(|rules| rules.contains(rule)))
    }

    async fn insert(&self, rule: &FilterRule) -> FilterResult<bool> {
        if self.contains(rule).await? {
            return Ok(false);
        }
        tokio::task::yield_now().await;
        self.with_rules(|rules| rules.push(*rule));
        Ok(true)
    }

    async fn delete(&self, rule: &FilterRule) -> FilterResult<bool> {
        Ok(self.with_rules(|rules| match rules.iter().position(|r| r == rule) {
            Some(index) => {
                rules.remove(index);
                true
            }
            None => false,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CommandRunner, HostExecMode, HostResult};
    use crate::resolver::NetworkIdentity;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn identity() -> NetworkIdentity {
        NetworkIdentity::new(
            "upstream",
            Ipv4Addr::new(172, 18, 0, 40),
            "172.18.0.0/16".parse().unwrap(),
        )
    }

    /// Emulates iptables -C/-I/-D over an in-memory chain
    #[derive(Default)]
    struct FakeIptables {
        chain: Mutex<Vec<Vec<String>>>,
        calls: Mutex<Vec<Vec<String>>>,
        deny: bool,
    }

    #[async_trait]
    impl CommandRunner for FakeIptables {
        async fn run(&self, program: &str, args: &[String]) -> HostResult<CommandOutput> {
            assert_eq!(program, "iptables");
            self.calls.lock().unwrap().push(args.to_vec());
            if self.deny {
                return Ok(CommandOutput::failed(
                    4,
                    "iptables v1.8.9: can't initialize iptables table `filter': Permission denied (you must be root)",
                ));
            }
            // -w 5 <command> <chain> <spec...>
            let command = args[2].as_str();
            let spec = args[4..].to_vec();
            let mut chain = self.chain.lock().unwrap();
            let present = chain.iter().position(|r| *r == spec);
            Ok(match (command, present) {
                ("-C", Some(_)) => CommandOutput::ok(""),
                ("-C", None) | ("-D", None) => CommandOutput::failed(
                    1,
                    "iptables: Bad rule (does a matching rule exist in that chain?).",
                ),
                ("-I", _) => {
                    chain.insert(0, spec);
                    CommandOutput::ok("")
                }
                ("-D", Some(index)) => {
                    chain.remove(index);
                    CommandOutput::ok("")
                }
                _ => CommandOutput::failed(2, "unexpected"),
            })
        }
    }

    fn filter(fake: Arc<FakeIptables>) -> IptablesFilter {
        IptablesFilter::new(HostExec::new(HostExecMode::Direct, fake), DEFAULT_CHAIN)
    }

    #[tokio::test]
    async fn test_iptables_insert_is_idempotent() {
        let fake = Arc::new(FakeIptables::default());
        let filter = filter(fake.clone());
        let rule = FilterRule::blocking(&identity());

        assert!(!filter.contains(&rule).await.unwrap());
        assert!(filter.insert(&rule).await.unwrap());
        assert!(!filter.insert(&rule).await.unwrap());
        assert!(filter.contains(&rule).await.unwrap());
        assert_eq!(fake.chain.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_iptables_delete_missing_is_ok() {
        let fake = Arc::new(FakeIptables::default());
        let filter = filter(fake.clone());
        let rule = FilterRule::blocking(&identity());

        assert!(!filter.delete(&rule).await.unwrap());
        filter.insert(&rule).await.unwrap();
        assert!(filter.delete(&rule).await.unwrap());
        assert!(fake.chain.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_iptables_targets_configured_chain_with_lock_wait() {
        let fake = Arc::new(FakeIptables::default());
        let filter = IptablesFilter::new(HostExec::new(HostExecMode::Direct, fake.clone()), "FORWARD");
        filter.contains(&FilterRule::blocking(&identity())).await.unwrap();

        let calls = fake.calls.lock().unwrap();
        assert_eq!(calls[0][..4], ["-w", "5", "-C", "FORWARD"].map(String::from));
    }

    #[tokio::test]
    async fn test_iptables_permission_denied() {
        let fake = Arc::new(FakeIptables {
            deny: true,
            ..Default::default()
        });
        let err = filter(fake)
            .insert(&FilterRule::blocking(&identity()))
            .await
            .unwrap_err();
        assert!(matches!(err, FilterError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_memory_filter_semantics() {
        let filter = MemoryFilter::new();
        let rule = FilterRule::blocking(&identity());

        assert!(filter.insert(&rule).await.unwrap());
        assert!(!filter.insert(&rule).await.unwrap());
        assert_eq!(filter.count(&rule), 1);
        assert!(filter.delete(&rule).await.unwrap());
        assert!(!filter.delete(&rule).await.unwrap());
        assert!(filter.rules().is_empty());
    }
}
