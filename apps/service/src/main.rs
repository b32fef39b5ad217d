mod report;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chainping::bus::EngineEvent;
use chainping::config::LogFormat;
use chainping::store::{KeyValueStore, MemoryStore, SqliteStore};
use chainping::{Config, LatencyEngine, RunOutcome};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use report::Report;

/// Measure RPC endpoint latency for configured networks.
#[derive(Parser)]
#[command(name = "chainping", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a latency test and print the snapshot.
    Run {
        network: String,

        /// Probe even if a fresh snapshot is cached.
        #[arg(long)]
        refresh: bool,
    },
    /// Print the cached snapshot if it is still fresh.
    Snapshot { network: String },
    /// Re-run whenever the cache expires and print every engine event.
    Watch { network: String },
    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_config(cli.config.as_ref()).context("loading configuration")?;
    let format = match config.logging.format {
        LogFormat::Compact => logger::Format::Compact,
        LogFormat::Json => logger::Format::Json,
    };
    logger::init_tracing(&config.logging.level, format);

    if let Command::Config = cli.command {
        print!("{config}");
        return Ok(());
    }

    let store = open_store(&config).await?;
    let engine = Arc::new(LatencyEngine::from_config(config, store).context("building engine")?);

    match cli.command {
        Command::Run { network, refresh } => run(&engine, &network, refresh).await,
        Command::Snapshot { network } => match engine.get_snapshot(&network).await {
            Some(snapshot) => Report::new(&network, "cached", &snapshot, engine.geo_info()).print(),
            None => bail!("no fresh snapshot for network {network}"),
        },
        Command::Watch { network } => watch(engine, &network).await,
        Command::Config => Ok(()),
    }
}

async fn open_store(config: &Config) -> Result<Arc<dyn KeyValueStore>> {
    match &config.storage.path {
        Some(path) => {
            let store = SqliteStore::open(path)
                .await
                .with_context(|| format!("opening store at {}", path.display()))?;
            info!(path = %path.display(), "Using SQLite store");
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

async fn run(engine: &LatencyEngine, network: &str, refresh: bool) -> Result<()> {
    let outcome = if refresh {
        engine.refresh(network).await?
    } else {
        engine.run_latency_test(network).await?
    };

    match outcome {
        RunOutcome::Cached(snapshot) => {
            Report::new(network, "cached", &snapshot, engine.geo_info()).print()
        }
        RunOutcome::Measured(snapshot) => {
            Report::new(network, "measured", &snapshot, engine.geo_info()).print()
        }
        RunOutcome::InProgress => bail!("a latency test for {network} is already running"),
        RunOutcome::UnknownNetwork => bail!("network {network} is not configured"),
    }
}

async fn watch(engine: Arc<LatencyEngine>, network: &str) -> Result<()> {
    let mut events = engine.subscribe();
    if engine.run_latency_test(network).await? == RunOutcome::UnknownNetwork {
        bail!("network {network} is not configured");
    }

    let listener = engine.spawn_passive_listener(network);
    let mut ticker = tokio::time::interval(engine.settings().cache_ttl());
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down");
                break;
            }
            _ = ticker.tick() => {
                spawn_scheduled_run(&engine, network);
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&engine, &event)?,
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Dropped engine events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    listener.abort();
    Ok(())
}

/// Run a latency test in the background, logging rather than returning errors
fn spawn_scheduled_run(engine: &Arc<LatencyEngine>, network: &str) -> JoinHandle<()> {
    let engine = Arc::clone(engine);
    let network = network.to_string();

    tokio::spawn(async move {
        match engine.run_latency_test(&network).await {
            Ok(RunOutcome::InProgress) => info!(network = %network, "Previous run still in progress"),
            Ok(_) => {}
            Err(e) => error!(network = %network, "Scheduled latency test failed: {:#}", e),
        }
    })
}

fn print_event(engine: &LatencyEngine, event: &EngineEvent) -> Result<()> {
    match event {
        EngineEvent::RunStarted { network, records } => {
            info!(network = %network, providers = records.len(), "Run started");
            Ok(())
        }
        EngineEvent::ProviderMeasured { network, record } => {
            let line = serde_json::json!({ "network": network, "record": record });
            println!("{}", serde_json::to_string(&line)?);
            Ok(())
        }
        EngineEvent::RunCompleted { network, snapshot } => {
            Report::new(network, "measured", snapshot, engine.geo_info()).print()
        }
        EngineEvent::PassiveMerged { network, snapshot } => {
            Report::new(network, "passive", snapshot, engine.geo_info()).print()
        }
        EngineEvent::GeoResolved(geo) => {
            info!(location = %geo.location, "Observer location resolved");
            Ok(())
        }
    }
}
