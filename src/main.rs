//! mock-kafka: serve a cluster document over the Kafka wire protocol

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mock_kafka::config::{Config, DEFAULT_LOG_LEVEL};
use mock_kafka::kafka::constants::{
    DEFAULT_FETCH_POLL_INTERVAL_MS, DEFAULT_JOIN_WINDOW_MS, DEFAULT_SHUTDOWN_TIMEOUT_MS,
};
use mock_kafka::kafka::{listener, metrics, ClusterConfig, Store, StoreOptions};

/// In-memory mock Kafka cluster
#[derive(Debug, Parser)]
#[command(name = "mock-kafka", version, about)]
struct Args {
    /// Cluster document (YAML, or JSON by extension)
    #[arg(short, long)]
    config: PathBuf,

    /// Bind every broker on this host instead of the one in its URL
    #[arg(long)]
    host: Option<String>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,

    /// Grace period for listeners to stop on shutdown
    #[arg(long, default_value_t = DEFAULT_SHUTDOWN_TIMEOUT_MS)]
    shutdown_timeout_ms: u64,

    /// Fallback poll period of a fetch waiting for data
    #[arg(long, default_value_t = DEFAULT_FETCH_POLL_INTERVAL_MS)]
    fetch_poll_interval_ms: u64,

    /// How long a rebalance collects JoinGroup requests
    #[arg(long, default_value_t = DEFAULT_JOIN_WINDOW_MS)]
    join_window_ms: u64,
}

impl From<&Args> for Config {
    fn from(args: &Args) -> Self {
        Config {
            host: args.host.clone(),
            log_level: args.log_level.clone(),
            shutdown_timeout_ms: args.shutdown_timeout_ms,
            fetch_poll_interval_ms: args.fetch_poll_interval_ms,
            join_window_ms: args.join_window_ms,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(log_filter)
        .init();

    metrics::describe();

    let config = Config::from(&args).validated();
    info!(?config, "Starting mock-kafka");

    let cluster = ClusterConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let store = Store::with_options(&cluster, StoreOptions::from(&config));

    let brokers = store.brokers();
    if brokers.is_empty() {
        warn!("Cluster document defines no usable servers, nothing to listen on");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut listeners = JoinSet::new();
    for broker in brokers {
        let host = config.host.clone().unwrap_or_else(|| broker.host.clone());
        let addr = format!("{}:{}", host, broker.port);
        let socket = match TcpListener::bind(&addr).await {
            Ok(socket) => socket,
            Err(e) => {
                error!(broker = %broker.name, "Failed to bind {}: {}", addr, e);
                continue;
            }
        };
        info!(broker = %broker.name, id = broker.id, "Broker listening on {}", addr);
        listeners.spawn(listener::run(socket, store.clone(), shutdown_rx.clone()));
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutting down");

    let _ = shutdown_tx.send(true);
    store.close();

    let grace = Duration::from_millis(config.shutdown_timeout_ms);
    let drained = tokio::time::timeout(grace, async {
        while let Some(joined) = listeners.join_next().await {
            match joined {
                Ok(Err(e)) => warn!("Listener stopped with error: {}", e),
                Err(e) => warn!("Listener task failed: {}", e),
                Ok(Ok(())) => {}
            }
        }
    })
    .await;
    if drained.is_err() {
        warn!("Listeners did not stop within {:?}, aborting", grace);
        listeners.abort_all();
    }

    info!("mock-kafka stopped");
    Ok(())
}
