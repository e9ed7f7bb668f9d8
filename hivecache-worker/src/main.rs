//! Cache worker binary.
//!
//! Attaches to a coordinator's work queue and computes examples until the
//! task channel is drained. Any number of workers on any host may attach
//! to the same coordinator; they steal batches from the shared channel.
//!
//! # Usage
//!
//! ```bash
//! hivecache-worker --address coordinator-host:63127 --dataset synthetic
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hivecache_core::config::CacheConfig;
use hivecache_core::dataset::DatasetRegistry;
use hivecache_core::queue::QueueClient;
use hivecache_core::worker::run_worker;

/// Worker for distributed dataset cache builds
#[derive(Parser, Debug)]
#[command(name = "hivecache-worker")]
#[command(about = "Worker for distributed dataset cache builds")]
struct Args {
    /// Coordinator queue address (host:port)
    #[arg(short, long)]
    address: String,

    /// Source dataset to compute (registry name, must match the coordinator)
    #[arg(short, long)]
    dataset: String,

    /// Root directory for built-in datasets
    #[arg(long, default_value = "./data")]
    data_root: PathBuf,

    /// Shared authentication token
    #[arg(long)]
    auth_token: Option<String>,

    /// Worker identifier shown in coordinator logs
    #[arg(long)]
    worker_id: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &args.config {
        Some(path) => CacheConfig::from_file(path)?,
        None => CacheConfig::default(),
    }
    .with_env_overrides();

    if let Some(token) = args.auth_token {
        config.queue.auth_token = token;
    }
    config.validate()?;

    let registry = DatasetRegistry::with_builtins(&args.data_root);
    let source = registry.create(&args.dataset)?;

    tracing::info!("Connecting to coordinator at {}", args.address);
    let mut client =
        QueueClient::connect_with_retry(&args.address, &config.queue.auth_token, &config.queue)
            .await?;
    if let Some(worker_id) = args.worker_id {
        client = client.with_worker_id(worker_id);
    }

    let produced = run_worker(&client, source).await?;
    tracing::info!("Produced {} examples", produced);

    Ok(())
}
