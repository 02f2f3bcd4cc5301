//! CLI command implementations
//!
//! Every command loads and validates the configuration first. One-shot
//! commands print a single JSON document to stdout; `serve` runs until
//! interrupted.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use super::args::Command;
use super::config::Config;
use super::errors::{CliError, CliResult};
use super::io::write_json;
use crate::control::ControlService;
use crate::host::{CommandRunner, HostExec, SystemRunner};
use crate::http_server::HttpServer;
use crate::observability::{init_logging, Event, MetricsRegistry};
use crate::partition::{IptablesFilter, MemoryFilter, PacketFilter};
use crate::probe::HttpProbe;
use crate::resolver::{DockerResolver, NetworkAddressResolver, StaticResolver};
use crate::timing::ActionType;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve {
            config,
            port,
            dry_run,
        } => serve(&config, port, dry_run),
        Command::Disconnect { config, wait } => act(&config, ActionType::Disconnect, wait),
        Command::Reconnect { config, wait } => act(&config, ActionType::Reconnect, wait),
        Command::Status { config } => status(&config),
        Command::CheckConfig { config } => check_config(&config),
    }
}

/// Load config and start logging
fn boot(config_path: &Path) -> CliResult<Config> {
    let config = Config::load(config_path)?;
    init_logging(config.log_format);
    tracing::info!(
        event = %Event::ConfigLoaded,
        path = %config_path.display(),
        service = %config.service,
        host_exec = config.host_exec.name(),
        chain = %config.chain,
        "configuration loaded"
    );
    Ok(config)
}

fn runtime() -> CliResult<Runtime> {
    Runtime::new().map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))
}

/// Wire the control service from configuration.
///
/// `dry_run` keeps rules in memory; container inspection still runs
/// unless a static identity is configured.
pub fn build_service(config: &Config, dry_run: bool) -> CliResult<ControlService> {
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new(config.command_timeout()));

    let resolver: Arc<dyn NetworkAddressResolver> = match &config.static_identity {
        Some(identity) => Arc::new(StaticResolver::new(identity.address, identity.subnet)),
        None => {
            let mut docker = DockerResolver::new(Arc::clone(&runner));
            if let Some(network) = &config.network {
                docker = docker.with_network(network.clone());
            }
            Arc::new(docker)
        }
    };

    let filter: Arc<dyn PacketFilter> = if dry_run {
        tracing::warn!("dry run: rules are kept in memory and do not affect traffic");
        Arc::new(MemoryFilter::new())
    } else {
        let exec = HostExec::new(config.host_exec.clone(), runner);
        Arc::new(IptablesFilter::new(exec, config.chain.clone()))
    };

    let probe = HttpProbe::new(config.probe_timeout())
        .map_err(|e| CliError::boot_failed(format!("Failed to build probe client: {}", e)))?;

    Ok(ControlService::new(
        config.control_settings(),
        resolver,
        filter,
        Arc::new(probe),
        Arc::new(MetricsRegistry::new()),
    ))
}

/// Serve the control API until interrupted
pub fn serve(config_path: &Path, port: Option<u16>, dry_run: bool) -> CliResult<()> {
    let config = boot(config_path)?;

    let mut http_config = config.http.clone();
    if let Some(port) = port {
        http_config.port = port;
    }

    let rt = runtime()?;
    rt.block_on(async {
        let service = Arc::new(build_service(&config, dry_run)?);
        let shutdown = CancellationToken::new();

        let monitor = service.spawn_monitor(shutdown.child_token());
        tokio::spawn(wait_for_signal(shutdown.clone()));

        let result = HttpServer::with_config(http_config, Arc::clone(&service))
            .start(shutdown.clone())
            .await
            .map_err(|e| CliError::boot_failed(format!("HTTP server failed: {}", e)));

        shutdown.cancel();
        service.shutdown();
        if let Err(e) = monitor.await {
            tracing::warn!(error = %e, "monitor task ended abnormally");
        }
        result
    })
}

async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!(event = %Event::ShutdownStart, "shutdown signal received");
    shutdown.cancel();
}

/// Apply one partition action and print its report.
///
/// With `wait`, also waits for the transition to be confirmed or time out
/// and prints the finalized record.
pub fn act(config_path: &Path, action: ActionType, wait: bool) -> CliResult<()> {
    let config = boot(config_path)?;

    let rt = runtime()?;
    rt.block_on(async {
        let service = build_service(&config, false)?;
        let outcome = match action {
            ActionType::Disconnect => service.disconnect().await?,
            ActionType::Reconnect => service.reconnect().await?,
        };

        if wait {
            let transition = outcome.timer.wait().await;
            write_json(&json!({ "action": outcome.report, "transition": transition }))
        } else {
            write_json(&outcome.report)
        }
    })
}

/// Print rule presence and reconciled state.
///
/// A state is only reported as settled after two observations, so this
/// observes twice, one poll interval apart.
pub fn status(config_path: &Path) -> CliResult<()> {
    let config = boot(config_path)?;

    let rt = runtime()?;
    rt.block_on(async {
        let service = build_service(&config, false)?;
        let connection = service.connection_status().await?;

        service.actual_state().await;
        tokio::time::sleep(config.poll_interval()).await;
        let actual = service.actual_state().await;

        write_json(&json!({ "connection": connection, "actual": actual }))
    })
}

/// Validate configuration and print the effective settings
pub fn check_config(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    write_json(&json!({
        "valid": true,
        "statusUrl": config.status_url(),
        "config": config,
    }))
}
