//! Worker pool that drains work items in fixed-size batches

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum number of batches running at once
    pub worker_count: usize,
    /// Items per batch
    pub batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: 5,
            batch_size: 50,
        }
    }
}

/// Processes a single item. Invoked sequentially within a batch.
///
/// Implementations own their error handling; by the time `handle` returns the
/// item must be in a terminal state.
#[async_trait]
pub trait BatchHandler<T>: Send + Sync {
    async fn handle(&self, item: T);
}

/// Summary of one [`WorkerPool::process`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub batches: usize,
    pub items: usize,
    /// Batches whose unit of work panicked or could not get a worker slot
    pub aborted_batches: usize,
}

/// Runs every batch as its own tokio task, gated by `worker_count` permits.
///
/// A batch holds its permit for its whole duration, so parallelism is bounded
/// by the worker count, not by the number of batches.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Process all `items` and return once every batch has finished.
    pub async fn process<T, H>(&self, items: Vec<T>, handler: Arc<H>) -> ProcessReport
    where
        T: Send + 'static,
        H: BatchHandler<T> + ?Sized + 'static,
    {
        let item_count = items.len();
        let batches = into_batches(items, self.config.batch_size);
        let batch_count = batches.len();
        let worker_count = self.config.worker_count.max(1);
        let semaphore = Arc::new(Semaphore::new(worker_count));

        info!(
            items = item_count,
            batches = batch_count,
            workers = worker_count,
            "Processing batches"
        );

        let mut handles = Vec::with_capacity(batch_count);
        for (index, batch) in batches.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let handler = handler.clone();

            handles.push(tokio::spawn(async move {
                let permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!(batch = index, error = %e, "Worker semaphore closed");
                        return false;
                    }
                };

                debug!(batch = index, size = batch.len(), "Batch started");
                for item in batch {
                    handler.handle(item).await;
                }
                debug!(batch = index, "Batch finished");

                drop(permit);
                true
            }));
        }

        let mut report = ProcessReport {
            batches: batch_count,
            items: item_count,
            aborted_batches: 0,
        };
        for (index, joined) in futures::future::join_all(handles)
            .await
            .into_iter()
            .enumerate()
        {
            match joined {
                Ok(true) => {}
                Ok(false) => report.aborted_batches += 1,
                Err(e) => {
                    error!(batch = index, error = %e, "Batch task panicked");
                    report.aborted_batches += 1;
                }
            }
        }

        report
    }
}

/// Split `items` into contiguous batches of at most `size`, preserving order.
pub fn into_batches<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        batches.push(iter.by_ref().take(size).collect());
    }
    batches
}
