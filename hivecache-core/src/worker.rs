//! Worker loop: pull index batches, compute examples, push results.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::dataset::SourceDataset;
use crate::error::{CacheError, Result};
use crate::example::{example_key, serialize_example};
use crate::queue::QueueConnection;

/// Pulls batches from the task channel until it is drained, computing each
/// example through the source and pushing serialized results individually.
///
/// The task channel models a finite work-stealing pool, not a stream: an
/// empty pull terminates the worker. A compute failure is fatal to this
/// worker only; other workers keep pulling, but the overall build stalls
/// because the builder's expected result count becomes unreachable.
///
/// Returns the number of examples produced.
pub async fn run_worker(
    queue: &dyn QueueConnection,
    source: Arc<dyn SourceDataset>,
) -> Result<u64> {
    info!(dataset = source.name(), "worker started");
    let mut produced = 0u64;

    loop {
        let Some(batch) = queue.pull_batch().await? else {
            break;
        };
        debug!(count = batch.len(), "pulled batch");

        for &index in &batch {
            let source = source.clone();
            let (key, payload) =
                tokio::task::spawn_blocking(move || compute_example(source.as_ref(), index))
                    .await
                    .map_err(|e| CacheError::queue(format!("compute task panicked: {e}")))??;

            queue.push_result(&key, payload).await?;
            produced += 1;
        }
    }

    info!(produced, "worker finished: task channel drained");
    Ok(produced)
}

/// Computes and serializes one example.
fn compute_example(source: &dyn SourceDataset, index: u64) -> Result<(String, Vec<u8>)> {
    let example = source.get(index as usize).map_err(|e| {
        error!(index, "failed to compute example: {e}");
        CacheError::compute(index, e.to_string())
    })?;
    Ok((example_key(index), serialize_example(&example)?))
}
