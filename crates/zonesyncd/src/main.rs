// # zonesyncd - Zone mirror daemon
//
// Thin integration layer over zonesync-core. It reads configuration from the
// environment, wires providers through the registry and hands control to the
// scheduler. No reconciliation logic lives here.
//
// ## Commands
//
// - `zonesyncd` / `zonesyncd run`: run the scheduler until SIGTERM or SIGINT
// - `zonesyncd preview <domain>`: print the plan a sync would apply, as JSON
// - `zonesyncd sync <domain>`: apply one manual sync and print the finished run
// - `zonesyncd history <domain> [--limit N]`: print recent runs, newest first
//
// ## Configuration
//
// ### Source (DirectAdmin)
// - `ZONESYNC_SOURCE_URL`: Panel URL, e.g. `https://panel.example.net:2222`
// - `ZONESYNC_SOURCE_USERNAME`: Panel user
// - `ZONESYNC_SOURCE_PASSWORD` or `ZONESYNC_SOURCE_LOGIN_KEY`: Basic auth secret
// - `ZONESYNC_SOURCE_TOKEN`: Bearer token, replaces username/password
//
// ### Destination (Cloudflare)
// - `ZONESYNC_CLOUDFLARE_API_TOKEN`: Scoped API token
// - `ZONESYNC_CLOUDFLARE_EMAIL` + `ZONESYNC_CLOUDFLARE_API_KEY`: Global key auth
//
// ### Domains
// - `ZONESYNC_DOMAINS`: Comma-separated list of zones to mirror; `alias=base`
//   marks a DirectAdmin pointer domain served by its base domain
// - `ZONESYNC_DOMAINS_FILE`: JSON array of domain configs, re-read on every run
//
// ### Policy
// - `ZONESYNC_MANAGED_RECORD_TYPES`, `ZONESYNC_EXCLUDE_NAMES`
// - `ZONESYNC_PROXY_A`, `ZONESYNC_PROXY_AAAA`, `ZONESYNC_PROXY_CNAME`
// - `ZONESYNC_PROXY_RULES`: `pattern=bool,...`, first match wins
// - `ZONESYNC_FAST_TRACK_TYPES`, `ZONESYNC_FAST_TRACK_NAMES`, `ZONESYNC_MANAGE_TTL`
//
// ### Engine
// - `ZONESYNC_SYNC_INTERVAL_MINUTES`, `ZONESYNC_FAST_TRACK_INTERVAL_MINUTES` (or `off`)
// - `ZONESYNC_SYNC_CONCURRENCY`, `ZONESYNC_QUEUE_CAPACITY`, `ZONESYNC_PROVIDER_TIMEOUT_SECS`
// - `ZONESYNC_HISTORY_PATH`: JSON history file (in-memory when unset), shared
//   safely with concurrent CLI commands
// - `ZONESYNC_LOCK_DIR`: per-domain lock files shared by the daemon and CLI
//   commands (default: `locks/` next to the history file, else under the
//   system temp directory)
// - `ZONESYNC_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export ZONESYNC_SOURCE_URL=https://panel.example.net:2222
// export ZONESYNC_SOURCE_USERNAME=admin
// export ZONESYNC_SOURCE_LOGIN_KEY=your_login_key
// export ZONESYNC_CLOUDFLARE_API_TOKEN=your_token
// export ZONESYNC_DOMAINS=example.com,example.org
// export ZONESYNC_HISTORY_PATH=/var/lib/zonesync/history.json
//
// zonesyncd
// ```

mod env;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use zonesync_core::config::HistoryStoreConfig;
use zonesync_core::store::config_store_for;
use zonesync_core::{
    EngineEvent, ProviderRegistry, Redactor, RunStatus, Scheduler, SyncEngine, ZonesyncConfig,
};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long in-flight runs get to finish after a shutdown signal
const DRAIN_TIMEOUT: Duration = Duration::from_secs(120);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum ZonesyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error, including a manual sync that did not succeed
    RuntimeError = 2,
}

impl From<ZonesyncExitCode> for ExitCode {
    fn from(code: ZonesyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Debug, Parser)]
#[command(name = "zonesyncd", version, about = "Mirror DirectAdmin DNS zones into Cloudflare")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the scheduler until SIGTERM or SIGINT
    Run,
    /// Print the plan a sync would apply, without applying it
    Preview { domain: String },
    /// Apply one manual sync and print the finished run
    Sync { domain: String },
    /// Print recent runs for a domain, newest first
    History {
        domain: String,
        /// Maximum number of runs to print
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match env::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            return ZonesyncExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
        return ZonesyncExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ZonesyncExitCode::RuntimeError.into();
        }
    };

    let command = cli.command.unwrap_or(Command::Run);
    let code = rt.block_on(async {
        let (engine, events) = match build_engine(&config.zonesync).await {
            Ok(built) => built,
            Err(e) => {
                error!("Startup failed: {e:#}");
                return ZonesyncExitCode::ConfigError;
            }
        };

        match run_command(command, engine, events).await {
            Ok(code) => code,
            Err(e) => {
                error!("{e:#}");
                ZonesyncExitCode::RuntimeError
            }
        }
    });

    code.into()
}

/// Build every collaborator from configuration and start the engine
async fn build_engine(config: &ZonesyncConfig) -> Result<(Arc<SyncEngine>, mpsc::Receiver<EngineEvent>)> {
    let registry = ProviderRegistry::with_builtin_stores();

    #[cfg(feature = "directadmin")]
    zonesync_provider_directadmin::register(&registry);

    #[cfg(feature = "cloudflare")]
    zonesync_provider_cloudflare::register(&registry);

    debug!(
        sources = ?registry.list_sources(),
        destinations = ?registry.list_destinations(),
        "Providers registered"
    );

    let source = registry
        .create_source(&config.source)
        .context("creating source provider")?;
    let destination = registry
        .create_destination(&config.destination)
        .context("creating destination provider")?;

    if matches!(config.history, HistoryStoreConfig::Memory) {
        warn!("ZONESYNC_HISTORY_PATH is not set; run history will not survive a restart");
    }
    let history = registry
        .create_history_store(&config.history)
        .await
        .context("opening history store")?;

    let config_store = config_store_for(config.policy.clone(), &config.domains);
    let redactor = Redactor::with_secrets(config.secrets());

    let (engine, events) = SyncEngine::new(
        source,
        destination,
        config_store,
        Arc::from(history),
        redactor,
        config.engine.clone(),
    )
    .await?;

    Ok((Arc::new(engine), events))
}

async fn run_command(
    command: Command,
    engine: Arc<SyncEngine>,
    events: mpsc::Receiver<EngineEvent>,
) -> Result<ZonesyncExitCode> {
    match command {
        Command::Run => {
            run_daemon(engine, events).await?;
            Ok(ZonesyncExitCode::CleanShutdown)
        }
        Command::Preview { domain } => {
            let plan = engine.preview_plan(&domain).await?;
            print_json(&plan)?;
            Ok(ZonesyncExitCode::CleanShutdown)
        }
        Command::Sync { domain } => {
            let run = engine.sync_now(&domain).await?;
            print_json(&run)?;
            if run.status == RunStatus::Success {
                Ok(ZonesyncExitCode::CleanShutdown)
            } else {
                warn!(domain = %domain, status = %run.status, "Sync did not fully succeed");
                Ok(ZonesyncExitCode::RuntimeError)
            }
        }
        Command::History { domain, limit } => {
            let runs = engine.get_history(&domain, limit).await?;
            print_json(&runs)?;
            Ok(ZonesyncExitCode::CleanShutdown)
        }
    }
}

/// Run the scheduler until a shutdown signal, then drain in-flight runs
async fn run_daemon(engine: Arc<SyncEngine>, events: mpsc::Receiver<EngineEvent>) -> Result<()> {
    info!("Starting zonesyncd");

    let domains = engine.domain_configs().await?;
    for domain in &domains {
        info!(domain = %domain.name(), enabled = domain.enabled, "Managing zone");
    }

    tokio::spawn(log_events(events));

    let scheduler = Scheduler::new(engine);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let run = scheduler.run_with_shutdown(Some(shutdown_rx));
    tokio::pin!(run);

    let signal = tokio::select! {
        result = &mut run => {
            // The scheduler only returns on its own if it failed to start
            result?;
            return Ok(());
        }
        signal = wait_for_shutdown() => signal?,
    };

    info!("Received shutdown signal: {}", signal);
    info!("Waiting for in-flight runs to finish");
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, run).await {
        Ok(result) => {
            result?;
            info!("Shutdown complete");
            Ok(())
        }
        Err(_) => Err(anyhow!(
            "In-flight runs did not finish within {:?}",
            DRAIN_TIMEOUT
        )),
    }
}

/// Drain engine events into the log so the channel never backs up
async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        debug!(?event, "Engine event");
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(name)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_run() {
        let cli = Cli::try_parse_from(["zonesyncd"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn history_accepts_a_limit() {
        let cli = Cli::try_parse_from(["zonesyncd", "history", "example.com", "--limit", "5"]).unwrap();
        match cli.command {
            Some(Command::History { domain, limit }) => {
                assert_eq!(domain, "example.com");
                assert_eq!(limit, Some(5));
            }
            other => panic!("expected history, got {other:?}"),
        }
    }

    #[test]
    fn preview_requires_a_domain() {
        assert!(Cli::try_parse_from(["zonesyncd", "preview"]).is_err());
    }

    #[test]
    fn exit_codes_follow_systemd_conventions() {
        assert_eq!(ZonesyncExitCode::CleanShutdown as u8, 0);
        assert_eq!(ZonesyncExitCode::ConfigError as u8, 1);
        assert_eq!(ZonesyncExitCode::RuntimeError as u8, 2);
    }
}
