//! Keeper Daemon
//!
//! Hosts the local replica, hydrates it from the remote on startup and keeps
//! pushing local edits in the background until interrupted.

use clap::Parser;
use keeper_core::{
    ClientConfig, CommandDispatcher, KeeperHandle, MemoryRemote, RecordService, ReplicaStore,
    SyncEngine, SyncEvent, SyncScheduler,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const COMMAND_BUFFER: usize = 64;

#[derive(Parser)]
#[command(name = "keeper-daemon", about = "Keeper replica sync daemon")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "keeper.toml")]
    config: PathBuf,

    /// Push interval override, in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Per-call remote timeout override, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(self, mut cfg: ClientConfig) -> keeper_core::Result<ClientConfig> {
        if let Some(ms) = self.interval_ms {
            cfg.sync_interval_ms = ms;
        }
        if let Some(ms) = self.timeout_ms {
            cfg.request_timeout_ms = ms;
        }
        if let Some(level) = self.log_level {
            cfg.log_level = level;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone();
    let cfg = cli.apply(ClientConfig::resolve(Some(&config_path))?)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if !config_path.exists() {
        info!("No config file found, using defaults");
    }
    info!(
        remote = %cfg.remote_address,
        interval_ms = cfg.sync_interval_ms,
        timeout_ms = cfg.request_timeout_ms,
        "Starting keeper daemon"
    );

    // No network transport ships with the daemon; it syncs against an
    // in-process remote.
    let remote = Arc::new(MemoryRemote::default());
    let store = Arc::new(ReplicaStore::new());
    let engine = Arc::new(SyncEngine::new(store, remote, cfg.request_timeout()));
    let service = Arc::new(RecordService::new(engine.clone()));

    let cancel = CancellationToken::new();
    let (dispatcher, handle) = CommandDispatcher::new(service, cancel.clone(), COMMAND_BUFFER);
    let dispatcher = tokio::spawn(dispatcher.run());
    let events = spawn_event_logger(&handle, cancel.clone());

    let records = handle.initialize().await?;
    info!("Replica ready with {} records", records.len());

    let scheduler = SyncScheduler::spawn(engine, cfg.sync_interval(), cancel.clone());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    cancel.cancel();
    scheduler.shutdown().await;
    if let Err(e) = dispatcher.await {
        error!("Command dispatcher task failed: {}", e);
    }
    if let Err(e) = events.await {
        error!("Event logger task failed: {}", e);
    }

    info!("Keeper daemon stopped");
    Ok(())
}

fn spawn_event_logger(
    handle: &KeeperHandle,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let mut events = handle.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(SyncEvent::Hydrated { count }) => info!(count, "Replica hydrated"),
                    Ok(SyncEvent::Pushed { count }) => info!(count, "Local changes pushed"),
                    Ok(SyncEvent::Pulled { count }) => info!(count, "Remote changes applied"),
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "Sync events dropped"),
                    Err(RecvError::Closed) => break,
                },
            }
        }
    })
}
