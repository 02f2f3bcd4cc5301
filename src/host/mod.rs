//! Host Command Execution
//!
//! Packet-filter rules only affect the dependent service when they are
//! applied in the network namespace that actually forwards its traffic.
//! When this process runs inside a container, and particularly when the
//! container engine itself runs inside a hidden virtual machine, that
//! namespace is not ours. This module provides:
//! - `CommandRunner`: bounded-time execution of external programs
//! - `HostExec`: rewrites privileged commands so they run in the host's
//!   namespaces (directly, via `nsenter`, or via a privileged helper
//!   container that enters PID 1's namespaces)

mod errors;
mod exec;
mod runner;

pub use errors::{HostError, HostResult};
pub use exec::{HostExec, HostExecMode, DEFAULT_HELPER_IMAGE};
pub use runner::{CommandOutput, CommandRunner, SystemRunner};
