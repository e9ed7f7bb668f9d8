//! Work-queue service and client.
//!
//! The coordinator hosts two FIFO channels over one gRPC service: index
//! batches flow out to workers, serialized results flow back. Workers on
//! any host attach with the coordinator address and the shared static
//! token. Neither channel guarantees ordering across workers, so
//! downstream consumers are order-agnostic.

mod client;
mod service;

// Include generated protobuf code
pub mod proto {
    include!("proto/hivecache.queue.rs");
}

pub use client::{QueueClient, QueueConnection};
pub use service::{QueueHandle, QueueService};
