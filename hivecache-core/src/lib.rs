//! hivecache - distributed dataset caching
//!
//! This crate turns a slow, arbitrarily expensive per-item data source
//! into a fast, randomly-addressable, persisted archive:
//!
//! - A coordinator-hosted work queue distributes index batches to worker
//!   processes on any host
//! - Workers compute and serialize examples; the single builder drains
//!   results into one archive and extracts a label sidecar
//! - A read-only facade and a small composition algebra (subsetting,
//!   transforms, concatenation) serve the cached data downstream

pub mod archive;
pub mod builder;
pub mod config;
pub mod dataset;
pub mod error;
pub mod example;
pub mod queue;
pub mod worker;

// Re-export commonly used types for convenience
pub use builder::{BuildMode, BuildPlan, BuildReport, CacheBuilder};
pub use config::{BuildConfig, CacheConfig, QueueConfig, StorageConfig};
pub use dataset::{
    CachedDataset, ConcatenatedDataset, Dataset, DatasetRegistry, ProcessedDataset,
    SourceDataset, SubDataset, SyntheticDataset,
};
pub use error::{CacheError, Result};
pub use example::{Example, Labels, Value};
pub use queue::{QueueClient, QueueConnection, QueueHandle, QueueService};
pub use worker::run_worker;

/// Default number of indices dispatched per task batch.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Default port for the work-queue service.
pub const DEFAULT_QUEUE_PORT: u16 = 63127;
