//! CLI argument definitions using clap
//!
//! Commands:
//! - netpartition serve --config <path> [--port <port>] [--dry-run]
//! - netpartition disconnect --config <path> [--wait]
//! - netpartition reconnect --config <path> [--wait]
//! - netpartition status --config <path>
//! - netpartition check-config --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// netpartition - simulate an upstream network partition for one service
#[derive(Parser, Debug)]
#[command(name = "netpartition")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the control API and monitor connectivity
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./netpartition.json")]
        config: PathBuf,

        /// Override the configured HTTP port
        #[arg(long)]
        port: Option<u16>,

        /// Keep rules in memory instead of touching the host packet filter
        #[arg(long)]
        dry_run: bool,
    },

    /// Block the service's upstream traffic and exit
    Disconnect {
        /// Path to configuration file
        #[arg(long, default_value = "./netpartition.json")]
        config: PathBuf,

        /// Wait until the service is observed disconnected (or the budget elapses)
        #[arg(long)]
        wait: bool,
    },

    /// Remove the block and exit
    Reconnect {
        /// Path to configuration file
        #[arg(long, default_value = "./netpartition.json")]
        config: PathBuf,

        /// Wait until the service is observed connected (or the budget elapses)
        #[arg(long)]
        wait: bool,
    },

    /// Print rule presence and reconciled connectivity
    Status {
        /// Path to configuration file
        #[arg(long, default_value = "./netpartition.json")]
        config: PathBuf,
    },

    /// Validate the configuration file and print the effective settings
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./netpartition.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_flags() {
        let cli = Cli::try_parse_from(["netpartition", "serve", "--port", "9000", "--dry-run"]).unwrap();
        match cli.command {
            Command::Serve { config, port, dry_run } => {
                assert_eq!(config, PathBuf::from("./netpartition.json"));
                assert_eq!(port, Some(9000));
                assert!(dry_run);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_disconnect_wait() {
        let cli = Cli::try_parse_from(["netpartition", "disconnect", "--config", "/etc/np.json", "--wait"]).unwrap();
        match cli.command {
            Command::Disconnect { config, wait } => {
                assert_eq!(config, PathBuf::from("/etc/np.json"));
                assert!(wait);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_check_config_is_kebab_case() {
        assert!(Cli::try_parse_from(["netpartition", "check-config"]).is_ok());
    }
}
