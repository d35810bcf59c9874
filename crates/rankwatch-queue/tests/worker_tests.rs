//! Worker pool and retry executor behaviour

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rankwatch_queue::{BackoffPolicy, BatchHandler, RetryExecutor, WorkerConfig, WorkerPool};

/// Records processing order and the peak number of items in flight
#[derive(Default)]
struct RecordingHandler {
    processed: Mutex<Vec<u32>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait::async_trait]
impl BatchHandler<u32> for RecordingHandler {
    async fn handle(&self, item: u32) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(5)).await;
        self.processed.lock().unwrap().push(item);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_single_worker_runs_batches_one_at_a_time() {
    let pool = WorkerPool::new(WorkerConfig {
        worker_count: 1,
        batch_size: 2,
    });
    let handler = Arc::new(RecordingHandler::default());

    let report = pool.process((1..=5).collect(), handler.clone()).await;

    assert_eq!(report.batches, 3);
    assert_eq!(report.items, 5);
    assert_eq!(report.aborted_batches, 0);
    assert_eq!(handler.peak.load(Ordering::SeqCst), 1);

    let processed = handler.processed.lock().unwrap().clone();
    assert_eq!(processed.len(), 5);
}

#[tokio::test]
async fn test_items_within_a_batch_run_in_order() {
    let pool = WorkerPool::new(WorkerConfig {
        worker_count: 4,
        batch_size: 10,
    });
    let handler = Arc::new(RecordingHandler::default());

    pool.process((1..=10).collect(), handler.clone()).await;

    let processed = handler.processed.lock().unwrap().clone();
    assert_eq!(processed, (1..=10).collect::<Vec<_>>());
    assert_eq!(handler.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_parallelism_bounded_by_worker_count() {
    let pool = WorkerPool::new(WorkerConfig {
        worker_count: 3,
        batch_size: 1,
    });
    let handler = Arc::new(RecordingHandler::default());

    let report = pool.process((1..=12).collect(), handler.clone()).await;

    assert_eq!(report.batches, 12);
    let peak = handler.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {} exceeded worker count", peak);
    assert_eq!(handler.processed.lock().unwrap().len(), 12);
}

#[tokio::test]
async fn test_empty_input_returns_immediately() {
    let pool = WorkerPool::new(WorkerConfig::default());
    let handler = Arc::new(RecordingHandler::default());

    let report = pool.process(Vec::new(), handler).await;
    assert_eq!(report.batches, 0);
    assert_eq!(report.items, 0);
}

#[tokio::test]
async fn test_always_failing_operation_runs_max_retries_plus_one() {
    let calls = AtomicU32::new(0);
    let counter = &calls;
    let retry = RetryExecutor::new(5, BackoffPolicy::none());

    let err = retry
        .execute(move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>("provider unavailable")
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 6);
    assert_eq!(err.attempts, 6);
    assert!(err.to_string().contains("after 6 attempts"));
    assert!(err.to_string().contains("provider unavailable"));
}

#[tokio::test]
async fn test_retry_recovers_after_transient_failures() {
    let retry = RetryExecutor::new(5, BackoffPolicy::none());
    let attempts_seen = Mutex::new(Vec::new());
    let seen = &attempts_seen;

    let value = retry
        .execute(move |attempt| async move {
            seen.lock().unwrap().push(attempt);
            if attempt < 2 {
                Err(format!("transient failure {}", attempt))
            } else {
                Ok("ranked")
            }
        })
        .await
        .unwrap();

    assert_eq!(value, "ranked");
    assert_eq!(*attempts_seen.lock().unwrap(), vec![0, 1, 2]);
}
