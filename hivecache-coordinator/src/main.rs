//! Cache coordinator binary.
//!
//! Hosts the work queue and runs the build for one source dataset:
//! computes the pending indices, enqueues batches, drains worker results
//! into the archive, and extracts the label sidecar.
//!
//! # Usage
//!
//! ```bash
//! # Cache the built-in synthetic dataset
//! hivecache-coordinator --dataset synthetic
//!
//! # Custom port and token; workers must match
//! hivecache-coordinator --dataset synthetic --port 63127 --auth-token secret
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hivecache_core::archive;
use hivecache_core::builder::CacheBuilder;
use hivecache_core::config::CacheConfig;
use hivecache_core::dataset::DatasetRegistry;

/// Coordinator for distributed dataset cache builds
#[derive(Parser, Debug)]
#[command(name = "hivecache-coordinator")]
#[command(about = "Coordinator for distributed dataset cache builds")]
struct Args {
    /// Source dataset to cache (registry name)
    #[arg(short, long)]
    dataset: String,

    /// Root directory for built-in datasets
    #[arg(long, default_value = "./data")]
    data_root: PathBuf,

    /// Address to bind the queue service to
    #[arg(short, long)]
    address: Option<String>,

    /// Port for the queue service
    #[arg(short, long)]
    port: Option<u16>,

    /// Shared authentication token for workers
    #[arg(long)]
    auth_token: Option<String>,

    /// Indices per task batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Ignore existing archive entries instead of resuming
    #[arg(long)]
    no_resume: bool,

    /// Rebuild from scratch even if an archive exists
    #[arg(long)]
    force: bool,

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

    if let Some(address) = args.address {
        config.queue.bind_address = address;
    }
    if let Some(port) = args.port {
        config.queue.port = port;
    }
    if let Some(token) = args.auth_token {
        config.queue.auth_token = token;
    }
    if let Some(batch_size) = args.batch_size {
        config.build.batch_size = batch_size;
    }
    if args.no_resume {
        config.build.resume = false;
    }
    if args.force {
        config.build.force = true;
    }
    config.validate()?;

    let registry = DatasetRegistry::with_builtins(&args.data_root);
    let source = registry.create(&args.dataset)?;

    tracing::info!("Starting cache build");
    tracing::info!("  Dataset: {} ({} examples)", source.name(), source.len());
    tracing::info!(
        "  Archive: {}",
        archive::store_path(source.root(), source.name()).display()
    );
    tracing::info!("  Queue:   {}", config.queue.bind_addr());

    let builder = CacheBuilder::new(source, config);
    let report = builder.build().await?;

    if report.skipped {
        tracing::info!("Archive already complete; nothing to do");
    } else {
        tracing::info!(
            "Cached {} examples ({} kept from previous runs)",
            report.built,
            report.kept
        );
    }

    Ok(())
}
