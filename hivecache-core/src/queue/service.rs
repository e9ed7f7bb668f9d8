//! Queue service hosted by the coordinator process.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

use super::proto::work_queue_server::{WorkQueue, WorkQueueServer};
use super::proto::{
    IndexBatch, PullBatchRequest, PullBatchResponse, PushResultRequest, PushResultResponse,
};
use crate::error::{CacheError, Result};

/// One serialized example flowing back from a worker.
pub type ResultEntry = (String, Vec<u8>);

/// State shared between the gRPC service and the in-process handle.
struct QueueShared {
    auth_token: String,
    /// Task channel: index batches waiting to be pulled.
    tasks: Mutex<VecDeque<Vec<u64>>>,
    /// Result channel sender; the handle owns the receiving end.
    results: mpsc::UnboundedSender<ResultEntry>,
}

impl QueueShared {
    fn check_token(&self, token: &str) -> std::result::Result<(), Status> {
        if token != self.auth_token {
            return Err(Status::unauthenticated("invalid auth token"));
        }
        Ok(())
    }
}

struct WorkQueueImpl {
    shared: Arc<QueueShared>,
}

#[tonic::async_trait]
impl WorkQueue for WorkQueueImpl {
    async fn pull_batch(
        &self,
        request: Request<PullBatchRequest>,
    ) -> std::result::Result<Response<PullBatchResponse>, Status> {
        let req = request.into_inner();
        self.shared.check_token(&req.auth_token)?;

        // Non-blocking: an empty channel tells the worker to terminate.
        let batch = self.shared.tasks.lock().unwrap().pop_front();
        match &batch {
            Some(indices) => {
                debug!(worker = %req.worker_id, count = indices.len(), "dispatched batch")
            }
            None => debug!(worker = %req.worker_id, "task channel drained"),
        }

        Ok(Response::new(PullBatchResponse {
            batch: batch.map(|indices| IndexBatch { indices }),
        }))
    }

    async fn push_result(
        &self,
        request: Request<PushResultRequest>,
    ) -> std::result::Result<Response<PushResultResponse>, Status> {
        let req = request.into_inner();
        self.shared.check_token(&req.auth_token)?;

        self.shared
            .results
            .send((req.key, req.payload))
            .map_err(|_| Status::failed_precondition("result channel closed"))?;

        Ok(Response::new(PushResultResponse { accepted: true }))
    }
}

/// Namespace for starting the queue service.
pub struct QueueService;

impl QueueService {
    /// Binds `bind_addr` and serves the two queue channels in a background
    /// task. Port 0 binds an ephemeral port; the actual address is
    /// available from the returned handle.
    pub async fn start(bind_addr: &str, auth_token: &str) -> Result<QueueHandle> {
        let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
            CacheError::queue_with_source(format!("failed to bind queue service to {bind_addr}"), e)
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| CacheError::queue_with_source("failed to resolve local address", e))?;

        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(QueueShared {
            auth_token: auth_token.to_string(),
            tasks: Mutex::new(VecDeque::new()),
            results: results_tx,
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let service = WorkQueueImpl {
            shared: shared.clone(),
        };
        let server = tokio::spawn(async move {
            let outcome = Server::builder()
                .add_service(WorkQueueServer::new(service))
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = outcome {
                warn!("queue service terminated with error: {e}");
            }
        });

        info!("queue service listening on {local_addr}");

        Ok(QueueHandle {
            local_addr,
            shared,
            results: results_rx,
            shutdown: Some(shutdown_tx),
            server,
        })
    }
}

/// In-process handle to a started queue service.
///
/// The builder enqueues batches and drains results through this handle;
/// remote workers reach the same channels through [`super::QueueClient`].
pub struct QueueHandle {
    local_addr: SocketAddr,
    shared: Arc<QueueShared>,
    results: mpsc::UnboundedReceiver<ResultEntry>,
    shutdown: Option<oneshot::Sender<()>>,
    server: JoinHandle<()>,
}

impl QueueHandle {
    /// Address the service is reachable at.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Appends one index batch to the task channel.
    pub fn enqueue(&self, batch: Vec<u64>) {
        self.shared.tasks.lock().unwrap().push_back(batch);
    }

    /// Number of batches not yet pulled by any worker.
    pub fn pending_batches(&self) -> usize {
        self.shared.tasks.lock().unwrap().len()
    }

    /// Blocking pull of the next result. Suspends until some worker
    /// produces one.
    pub async fn next_result(&mut self) -> Option<ResultEntry> {
        self.results.recv().await
    }

    /// Stops the service and waits for the server task to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.server).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::queue::{QueueClient, QueueConnection};

    async fn start_local() -> QueueHandle {
        QueueService::start("127.0.0.1:0", "token").await.unwrap()
    }

    async fn connect(handle: &QueueHandle, token: &str) -> QueueClient {
        QueueClient::connect(&handle.local_addr().to_string(), token, &QueueConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_pull_from_empty_channel_is_none() {
        let handle = start_local().await;
        let client = connect(&handle, "token").await;
        assert_eq!(client.pull_batch().await.unwrap(), None);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_batches_flow_fifo() {
        let handle = start_local().await;
        handle.enqueue(vec![0, 1, 2]);
        handle.enqueue(vec![3]);
        assert_eq!(handle.pending_batches(), 2);

        let client = connect(&handle, "token").await;
        assert_eq!(client.pull_batch().await.unwrap(), Some(vec![0, 1, 2]));
        assert_eq!(client.pull_batch().await.unwrap(), Some(vec![3]));
        assert_eq!(client.pull_batch().await.unwrap(), None);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_results_reach_handle() {
        let mut handle = start_local().await;
        let client = connect(&handle, "token").await;

        client
            .push_result("example_0.p", vec![1, 2, 3])
            .await
            .unwrap();
        let (key, payload) = handle.next_result().await.unwrap();
        assert_eq!(key, "example_0.p");
        assert_eq!(payload, vec![1, 2, 3]);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_bad_token_rejected() {
        let handle = start_local().await;
        let client = connect(&handle, "wrong").await;

        assert!(client.pull_batch().await.is_err());
        assert!(client.push_result("k", vec![]).await.is_err());
        handle.shutdown().await;
    }
}
