//! Configuration management for the cache runtime.
//!
//! This module provides configuration parsing from TOML files, environment
//! variable overrides, and validation of configuration values.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::{CacheError, Result};

// Top-level cache configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub queue: QueueConfig,
    pub build: BuildConfig,
    pub storage: StorageConfig,
}

/// Work-queue transport configuration, shared by the coordinator and the
/// worker client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    // Address the coordinator binds to.
    pub bind_address: String,
    // Port for the queue service.
    pub port: u16,
    // Shared static authentication token checked on every request.
    pub auth_token: String,
    // Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    // Request timeout in milliseconds.
    pub request_timeout_ms: u64,
    // Maximum connection attempts at worker startup.
    pub max_connect_attempts: u32,
    // Initial delay (milliseconds) between connection attempts.
    pub reconnect_delay_ms: u64,
}

// Build orchestration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    // Number of indices dispatched per task batch.
    pub batch_size: usize,
    // Skip indices already present in an existing archive.
    pub resume: bool,
    // Rebuild from scratch even if an archive exists.
    pub force: bool,
}

// Archive read tuning, mirrored from the facade side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    // Buffer size in bytes for file I/O.
    pub buffer_size: usize,
    // Whether to memory-map archives for reading.
    pub use_mmap: bool,
    // File size threshold (bytes) above which to use mmap.
    pub mmap_threshold: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: crate::DEFAULT_QUEUE_PORT,
            auth_token: "hivecache".to_string(),
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
            max_connect_attempts: 5,
            reconnect_delay_ms: 500,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::DEFAULT_BATCH_SIZE,
            resume: true,
            force: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64 * 1024,          // 64 KB
            use_mmap: true,
            mmap_threshold: 1024 * 1024,     // 1 MB
        }
    }
}

impl QueueConfig {
    /// The full address the coordinator binds the queue service to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl FromStr for CacheConfig {
    type Err = CacheError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| CacheError::config_with_source("failed to parse TOML config", e))
    }
}

impl CacheConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CacheError::archive_with_source(path, "failed to read config file", e)
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Environment variables are prefixed with `HIVE_` and use underscores
    // to separate nested fields. For example:
    // - `HIVE_QUEUE_PORT` overrides `queue.port`
    // - `HIVE_QUEUE_AUTH_TOKEN` overrides `queue.auth_token`
    // - `HIVE_BUILD_BATCH_SIZE` overrides `build.batch_size`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        // Queue overrides
        if let Ok(val) = std::env::var("HIVE_QUEUE_BIND_ADDRESS") {
            self.queue.bind_address = val;
        }
        if let Ok(val) = std::env::var("HIVE_QUEUE_PORT") {
            if let Ok(v) = val.parse() {
                self.queue.port = v;
            }
        }
        if let Ok(val) = std::env::var("HIVE_QUEUE_AUTH_TOKEN") {
            self.queue.auth_token = val;
        }
        if let Ok(val) = std::env::var("HIVE_QUEUE_CONNECT_TIMEOUT_MS") {
            if let Ok(v) = val.parse() {
                self.queue.connect_timeout_ms = v;
            }
        }
        if let Ok(val) = std::env::var("HIVE_QUEUE_REQUEST_TIMEOUT_MS") {
            if let Ok(v) = val.parse() {
                self.queue.request_timeout_ms = v;
            }
        }
        if let Ok(val) = std::env::var("HIVE_QUEUE_MAX_CONNECT_ATTEMPTS") {
            if let Ok(v) = val.parse() {
                self.queue.max_connect_attempts = v;
            }
        }
        if let Ok(val) = std::env::var("HIVE_QUEUE_RECONNECT_DELAY_MS") {
            if let Ok(v) = val.parse() {
                self.queue.reconnect_delay_ms = v;
            }
        }

        // Build overrides
        if let Ok(val) = std::env::var("HIVE_BUILD_BATCH_SIZE") {
            if let Ok(v) = val.parse() {
                self.build.batch_size = v;
            }
        }
        if let Ok(val) = std::env::var("HIVE_BUILD_RESUME") {
            if let Ok(v) = val.parse() {
                self.build.resume = v;
            }
        }
        if let Ok(val) = std::env::var("HIVE_BUILD_FORCE") {
            if let Ok(v) = val.parse() {
                self.build.force = v;
            }
        }

        // Storage overrides
        if let Ok(val) = std::env::var("HIVE_STORAGE_BUFFER_SIZE") {
            if let Ok(v) = val.parse() {
                self.storage.buffer_size = v;
            }
        }
        if let Ok(val) = std::env::var("HIVE_STORAGE_USE_MMAP") {
            if let Ok(v) = val.parse() {
                self.storage.use_mmap = v;
            }
        }
        if let Ok(val) = std::env::var("HIVE_STORAGE_MMAP_THRESHOLD") {
            if let Ok(v) = val.parse() {
                self.storage.mmap_threshold = v;
            }
        }

        self
    }

    // Validate all configuration values.
    //
    // # Errors
    //
    // Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.queue.auth_token.is_empty() {
            return Err(CacheError::config("queue.auth_token must not be empty"));
        }
        if self.queue.connect_timeout_ms == 0 {
            return Err(CacheError::config(
                "queue.connect_timeout_ms must be greater than 0",
            ));
        }
        if self.queue.request_timeout_ms == 0 {
            return Err(CacheError::config(
                "queue.request_timeout_ms must be greater than 0",
            ));
        }
        if self.queue.max_connect_attempts == 0 {
            return Err(CacheError::config(
                "queue.max_connect_attempts must be greater than 0",
            ));
        }

        if self.build.batch_size == 0 {
            return Err(CacheError::config("build.batch_size must be greater than 0"));
        }

        if self.storage.buffer_size == 0 {
            return Err(CacheError::config(
                "storage.buffer_size must be greater than 0",
            ));
        }

        Ok(())
    }
}
