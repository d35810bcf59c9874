//! Task lifecycle around the retry loop
//!
//! A [`TaskRunner`] takes one pending task to a terminal state: it marks the
//! task running, retries the lookup with exponential backoff, records the
//! outcome on the task and counts it on the owning job.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use rankwatch_core::{IdGenerator, IdKind, Task, TaskOutcome, TaskStatus, TrackResult};
use rankwatch_persist::{JobStore, ResultStore, TaskStore, TrackingStore};
use rankwatch_queue::{BatchHandler, RetryExecutor};

use crate::executor::TaskExecutor;
use crate::notify::{deliver_task_status, NotificationSink, TaskStatusEvent};

/// Drives tasks through the [`TaskExecutor`] with retries
pub struct TaskRunner {
    store: Arc<dyn TrackingStore>,
    executor: Arc<TaskExecutor>,
    retry: RetryExecutor,
    sink: Arc<dyn NotificationSink>,
    ids: Arc<dyn IdGenerator>,
}

impl TaskRunner {
    /// `retry` supplies the backoff; each task's own `max_retries` bounds
    /// the attempts.
    pub fn new(
        store: Arc<dyn TrackingStore>,
        executor: Arc<TaskExecutor>,
        retry: RetryExecutor,
        sink: Arc<dyn NotificationSink>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            store,
            executor,
            retry,
            sink,
            ids,
        }
    }

    /// Run `task` to completion or exhaustion and return its outcome.
    ///
    /// Storage and notification failures along the way are logged; the
    /// outcome is still reported to the job.
    pub async fn run(&self, mut task: Task) -> TaskOutcome {
        task.status = TaskStatus::Running;
        task.updated_at = Utc::now();
        self.save(&task).await;
        deliver_task_status(self.sink.as_ref(), TaskStatusEvent::from_task(&task)).await;

        let attempts = AtomicU32::new(0);
        let result = {
            let attempts = &attempts;
            let running = &task;
            let store = self.store.as_ref();
            let executor = self.executor.as_ref();

            self.retry
                .with_max_retries(task.max_retries)
                .execute(move |attempt| async move {
                    attempts.store(attempt + 1, Ordering::SeqCst);
                    if attempt > 0 {
                        let mut retrying = running.clone();
                        retrying.retry_count = attempt;
                        retrying.updated_at = Utc::now();
                        if let Err(e) = store.update_task(&retrying).await {
                            warn!(
                                task_id = %running.id,
                                error = %e,
                                "Failed to persist retry count"
                            );
                        }
                    }
                    executor.execute(running).await
                })
                .await
        };

        let now = Utc::now();
        task.retry_count = attempts.load(Ordering::SeqCst).saturating_sub(1);
        task.updated_at = now;
        task.completed_at = Some(now);

        let outcome = match result {
            Ok(lookup) => {
                task.status = TaskStatus::Completed;
                task.error = None;
                info!(
                    task_id = %task.id,
                    job_id = %task.job_id,
                    rank = lookup.rank,
                    retries = task.retry_count,
                    "Task completed"
                );
                TaskOutcome::Completed
            }
            Err(e) => {
                let message = e.last_error.to_string();
                task.status = TaskStatus::Failed;
                task.error = Some(message.clone());
                warn!(
                    task_id = %task.id,
                    job_id = %task.job_id,
                    attempts = e.attempts,
                    error = %message,
                    "Task failed after retries"
                );

                let failure =
                    TrackResult::failure(self.ids.generate(IdKind::Result), &task, &message);
                if let Err(e) = self.store.append_result(&failure).await {
                    warn!(task_id = %task.id, error = %e, "Failed to record failure result");
                }
                TaskOutcome::Failed
            }
        };

        self.save(&task).await;
        deliver_task_status(self.sink.as_ref(), TaskStatusEvent::from_task(&task)).await;

        // A missed count is rebuilt from task states before the job is finalized
        if let Err(e) = self.store.record_task_outcome(&task.job_id, outcome).await {
            warn!(
                task_id = %task.id,
                job_id = %task.job_id,
                error = %e,
                "Failed to update job progress"
            );
        }

        outcome
    }

    async fn save(&self, task: &Task) {
        if let Err(e) = self.store.update_task(task).await {
            warn!(task_id = %task.id, status = %task.status, error = %e, "Failed to persist task");
        }
    }
}

#[async_trait]
impl BatchHandler<Task> for TaskRunner {
    async fn handle(&self, task: Task) {
        self.run(task).await;
    }
}
