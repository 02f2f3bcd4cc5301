//! Privileged execution in the host network namespace

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::errors::HostResult;
use super::runner::{CommandOutput, CommandRunner};

/// Image used for the helper container when none is configured
pub const DEFAULT_HELPER_IMAGE: &str = "alpine:3.20";

/// Where privileged filter commands are executed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum HostExecMode {
    /// Run in this process's own namespace (bare-metal hosts, `--net=host`)
    #[default]
    Direct,

    /// Enter PID 1's network namespace; requires `--pid=host` and CAP_SYS_ADMIN
    Nsenter,

    /// Start a privileged container sharing the engine host's PID and
    /// network namespaces, then enter PID 1's namespaces from inside it.
    /// Reaches the real forwarding path even when the engine runs inside
    /// a virtual machine this process cannot see.
    HelperContainer {
        #[serde(default = "default_helper_image")]
        image: String,
    },
}

fn default_helper_image() -> String {
    DEFAULT_HELPER_IMAGE.to_string()
}

impl HostExecMode {
    pub fn name(&self) -> &'static str {
        match self {
            HostExecMode::Direct => "direct",
            HostExecMode::Nsenter => "nsenter",
            HostExecMode::HelperContainer { .. } => "helper_container",
        }
    }
}

/// Executes privileged commands according to a `HostExecMode`
#[derive(Clone)]
pub struct HostExec {
    mode: HostExecMode,
    runner: Arc<dyn CommandRunner>,
}

impl HostExec {
    pub fn new(mode: HostExecMode, runner: Arc<dyn CommandRunner>) -> Self {
        Self { mode, runner }
    }

    pub fn mode(&self) -> &HostExecMode {
        &self.mode
    }

    /// The program and argument vector actually executed for `program args`
    pub fn command_line(&self, program: &str, args: &[String]) -> (String, Vec<String>) {
        match &self.mode {
            HostExecMode::Direct => (program.to_string(), args.to_vec()),
            HostExecMode::Nsenter => {
                let mut full = vec![
                    "-t".to_string(),
                    "1".to_string(),
                    "-n".to_string(),
                    "--".to_string(),
                    program.to_string(),
                ];
                full.extend(args.iter().cloned());
                ("nsenter".to_string(), full)
            }
            HostExecMode::HelperContainer { image } => {
                let mut full: Vec<String> = [
                    "run",
                    "--rm",
                    "--privileged",
                    "--pid=host",
                    "--net=host",
                    image.as_str(),
                    "nsenter",
                    "-t",
                    "1",
                    "-m",
                    "-u",
                    "-n",
                    "-i",
                    program,
                ]
                .iter()
                .map(|s| s.to_string())
                .collect();
                full.extend(args.iter().cloned());
                ("docker".to_string(), full)
            }
        }
    }

    /// Run `program args` in the host's namespace
    pub async fn run(&self, program: &str, args: &[String]) -> HostResult<CommandOutput> {
        let (program, args) = self.command_line(program, args);
        self.runner.run(&program, &args).await
    }
}

impl std::fmt::Debug for HostExec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostExec").field("mode", &self.mode).finish()
    }
}
