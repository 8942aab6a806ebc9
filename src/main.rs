#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use mirror::envelope::Envelope;
use mirror::{
    load_config, MirrorConfig, MirrorError, ReconnectPolicy, Result, StoreView, SyncService,
    SyncStore, WsTransport,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mirror")]
#[command(about = "Live read-only mirror of a Lodestar coordination backend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (default: .lodestar/mirror.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print one status line per published version
    Watch {
        /// Realtime endpoint, overrides config and environment
        #[arg(short, long)]
        url: Option<String>,
    },

    /// Feed a JSON-lines recording of inbound frames into an offline store
    Replay {
        file: PathBuf,

        /// Number of recent events and messages to print
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Evaluate lease expiry at this RFC 3339 instant instead of now
        #[arg(long)]
        at: Option<String>,
    },

    /// Print the effective configuration
    Config {
        #[arg(short, long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        match Envelope::failure(&err).to_json() {
            Ok(doc) => println!("{doc}"),
            Err(_) => eprintln!("{err}"),
        }
        std::process::exit(err.exit_code());
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Watch { url } => {
            let config = effective_config(cli.config, url.as_deref()).await?;
            watch(config).await
        }
        Commands::Replay { file, limit, at } => {
            let now = match at.as_deref() {
                Some(raw) => parse_instant(raw)?,
                None => Utc::now(),
            };
            let summary = replay(&file, limit, now).await?;
            println!("{}", Envelope::success(summary).to_json()?);
            Ok(())
        }
        Commands::Config { url } => {
            let config = effective_config(cli.config, url.as_deref()).await?;
            println!("{}", Envelope::success(config.summary()).to_json()?);
            Ok(())
        }
    }
}

async fn effective_config(path: Option<PathBuf>, url: Option<&str>) -> Result<MirrorConfig> {
    let config = load_config(path).await?;
    match url {
        Some(url) => config.with_endpoint(url),
        None => Ok(config),
    }
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| MirrorError::ConfigError(format!("Invalid --at timestamp {raw}: {e}")))
}

async fn watch(config: MirrorConfig) -> Result<()> {
    let transport = WsTransport::new(config.endpoint.clone());
    let (service, mut handle, control) = SyncService::new(transport, config);
    let driver = tokio::spawn(service.run());

    loop {
        tokio::select! {
            changed = handle.changed() => match changed {
                Ok(view) => println!("{}", status_line(&view)),
                Err(_) => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutting down");
                control.shutdown().await?;
                break;
            }
        }
    }

    driver
        .await
        .map_err(|e| MirrorError::Internal(format!("sync task failed: {e}")))
}

fn status_line(view: &StoreView) -> String {
    let connection = view.connection();
    let status = view.repo_status();
    let error = view
        .connection_error()
        .map(|e| format!(" error=\"{e}\""))
        .unwrap_or_default();
    format!(
        "v{} {} attempts={}/{} agents={}/{} tasks={} ready={} in_progress={} leases={} critical={} expired={}{}",
        view.version(),
        connection.phase.as_str(),
        connection.reconnect_attempts,
        connection.max_reconnect_attempts,
        status.active_agents,
        status.total_agents,
        status.total_tasks,
        status.tasks_by_status.ready,
        status.tasks_by_status.in_progress,
        status.lease_expiry.normal
            + status.lease_expiry.warning
            + status.lease_expiry.critical
            + status.lease_expiry.expired,
        status.lease_expiry.critical,
        status.lease_expiry.expired,
        error,
    )
}

async fn replay(file: &Path, limit: usize, now: DateTime<Utc>) -> Result<Value> {
    let content = tokio::fs::read_to_string(file).await?;
    let (mut store, handle) = SyncStore::new(ReconnectPolicy::default());

    let mut resync_requests = Vec::new();
    for line in content.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if let Some(request) = store.ingest_text(line, now).resync() {
            resync_requests.push(request.request_id);
        }
    }
    store.tick(now);
    info!(
        "Replayed {} into version {}",
        file.display(),
        handle.current().version()
    );

    let view = handle.current();
    Ok(json!({
        "version": view.version(),
        "lastAppliedEventId": view.last_applied_event(),
        "awaitingSnapshot": store.awaiting_snapshot(),
        "resyncRequests": resync_requests,
        "repoStatus": view.repo_status(),
        "ingestStats": view.ingest_stats(),
        "agents": unshared(&view.list_agents()),
        "tasks": unshared(&view.list_tasks()),
        "leases": view.list_leases_with_expiry(now),
        "orphanedLeases": unshared(&view.list_orphaned_leases()),
        "recentEvents": unshared(&view.list_recent_events(limit)),
        "messages": unshared(&view.list_messages(limit)),
    }))
}

fn unshared<T: serde::Serialize>(items: &[Arc<T>]) -> Value {
    items
        .iter()
        .map(|item| serde_json::to_value(item.as_ref()).unwrap_or(Value::Null))
        .collect()
}
