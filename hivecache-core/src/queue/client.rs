//! Worker-side queue client.

use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};
use tonic::Request;
use tracing::warn;

use super::proto::work_queue_client::WorkQueueClient;
use super::proto::{PullBatchRequest, PushResultRequest};
use crate::config::QueueConfig;
use crate::error::{CacheError, Result};

/// Transport abstraction over the two queue channels.
///
/// The worker loop only needs these two operations, so tests can drive it
/// with an in-memory implementation instead of a live service.
#[async_trait]
pub trait QueueConnection: Send + Sync {
    /// Non-blocking dequeue of one index batch. `None` means the task
    /// channel is drained and no more work will arrive.
    async fn pull_batch(&self) -> Result<Option<Vec<u64>>>;

    /// Pushes one serialized example onto the result channel.
    async fn push_result(&self, key: &str, payload: Vec<u8>) -> Result<()>;
}

/// gRPC client attached to a running queue service.
pub struct QueueClient {
    client: WorkQueueClient<Channel>,
    auth_token: String,
    worker_id: String,
}

impl QueueClient {
    /// Connects to the queue service at `addr` (host:port).
    ///
    /// The token is validated lazily, on the first request.
    pub async fn connect(addr: &str, auth_token: &str, config: &QueueConfig) -> Result<Self> {
        let endpoint = Endpoint::from_shared(format!("http://{addr}"))
            .map_err(|e| CacheError::queue_with_source("invalid queue address", e))?
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms));

        let channel = endpoint.connect().await.map_err(|e| {
            CacheError::queue_with_source(format!("failed to connect to queue at {addr}"), e)
        })?;

        Ok(Self {
            client: WorkQueueClient::new(channel),
            auth_token: auth_token.to_string(),
            worker_id: format!("worker-{}", std::process::id()),
        })
    }

    /// Connects with bounded exponential backoff, for workers started
    /// before the coordinator is up.
    pub async fn connect_with_retry(
        addr: &str,
        auth_token: &str,
        config: &QueueConfig,
    ) -> Result<Self> {
        let mut attempts = 0;
        let mut delay = Duration::from_millis(config.reconnect_delay_ms);

        loop {
            match Self::connect(addr, auth_token, config).await {
                Ok(client) => return Ok(client),
                Err(e) => {
                    attempts += 1;
                    if attempts >= config.max_connect_attempts {
                        return Err(CacheError::queue(format!(
                            "failed to connect after {attempts} attempts: {e}"
                        )));
                    }
                    warn!(attempts, "queue connection failed, retrying: {e}");
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(
                        delay * 2,
                        Duration::from_millis(config.request_timeout_ms),
                    );
                }
            }
        }
    }

    /// Sets the worker identifier sent with every pull, for coordinator
    /// logs.
    #[must_use]
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }
}

#[async_trait]
impl QueueConnection for QueueClient {
    async fn pull_batch(&self) -> Result<Option<Vec<u64>>> {
        let mut client = self.client.clone();

        let request = Request::new(PullBatchRequest {
            auth_token: self.auth_token.clone(),
            worker_id: self.worker_id.clone(),
        });

        let response = client
            .pull_batch(request)
            .await
            .map_err(|e| CacheError::queue_with_source("failed to pull batch", e))?;

        Ok(response.into_inner().batch.map(|b| b.indices))
    }

    async fn push_result(&self, key: &str, payload: Vec<u8>) -> Result<()> {
        let mut client = self.client.clone();

        let request = Request::new(PushResultRequest {
            auth_token: self.auth_token.clone(),
            key: key.to_string(),
            payload,
        });

        let response = client
            .push_result(request)
            .await
            .map_err(|e| CacheError::queue_with_source("failed to push result", e))?;

        if !response.into_inner().accepted {
            return Err(CacheError::queue("result rejected by coordinator"));
        }
        Ok(())
    }
}
