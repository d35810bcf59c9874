//! Status notifications
//!
//! Task and job status changes are pushed to a [`NotificationSink`]. Delivery
//! is best effort: a failing sink is logged and never affects tracking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use rankwatch_core::{Job, JobId, JobStatus, Task, TaskId, TaskStatus};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification channel closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusEvent {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TaskStatusEvent {
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            job_id: task.job_id.clone(),
            status: task.status,
            retry_count: task.retry_count,
            error: task.error.clone(),
            timestamp: task.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    pub completed_tasks: u32,
    pub failed_tasks: u32,
    pub total_tasks: u32,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl JobStatusEvent {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            completed_tasks: job.completed_tasks,
            failed_tasks: job.failed_tasks,
            total_tasks: job.total_tasks,
            error: job.error.clone(),
            timestamp: job.updated_at,
        }
    }
}

/// Receiver of status changes
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn task_status(&self, event: TaskStatusEvent) -> Result<(), NotifyError>;

    async fn job_status(&self, event: JobStatusEvent) -> Result<(), NotifyError>;
}

/// Deliver a task event, logging instead of propagating failures
pub async fn deliver_task_status(sink: &dyn NotificationSink, event: TaskStatusEvent) {
    let task_id = event.task_id.clone();
    if let Err(e) = sink.task_status(event).await {
        warn!(task_id = %task_id, error = %e, "Task notification failed");
    }
}

/// Deliver a job event, logging instead of propagating failures
pub async fn deliver_job_status(sink: &dyn NotificationSink, event: JobStatusEvent) {
    let job_id = event.job_id.clone();
    if let Err(e) = sink.job_status(event).await {
        warn!(job_id = %job_id, error = %e, "Job notification failed");
    }
}

/// Writes every event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn task_status(&self, event: TaskStatusEvent) -> Result<(), NotifyError> {
        info!(
            task_id = %event.task_id,
            job_id = %event.job_id,
            status = %event.status,
            retry_count = event.retry_count,
            "Task status changed"
        );
        Ok(())
    }

    async fn job_status(&self, event: JobStatusEvent) -> Result<(), NotifyError> {
        info!(
            job_id = %event.job_id,
            status = %event.status,
            completed = event.completed_tasks,
            failed = event.failed_tasks,
            total = event.total_tasks,
            "Job status changed"
        );
        Ok(())
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl NotificationSink for NoopSink {
    async fn task_status(&self, _event: TaskStatusEvent) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn job_status(&self, _event: JobStatusEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Task(TaskStatusEvent),
    Job(JobStatusEvent),
}

/// Forwards events into an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn task_status(&self, event: TaskStatusEvent) -> Result<(), NotifyError> {
        self.tx
            .send(SinkEvent::Task(event))
            .map_err(|_| NotifyError::Closed)
    }

    async fn job_status(&self, event: JobStatusEvent) -> Result<(), NotifyError> {
        self.tx
            .send(SinkEvent::Job(event))
            .map_err(|_| NotifyError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rankwatch_core::{Source, TrackingParams};

    #[tokio::test]
    async fn test_channel_sink_forwards_events() {
        let (sink, mut rx) = ChannelSink::channel();
        let job = Job::new("job-1".into(), 1, Source::Google, 2);

        sink.job_status(JobStatusEvent::from_job(&job)).await.unwrap();

        match rx.recv().await {
            Some(SinkEvent::Job(event)) => {
                assert_eq!(event.job_id, "job-1");
                assert_eq!(event.total_tasks, 2);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_channel_is_not_fatal() {
        let (sink, rx) = ChannelSink::channel();
        drop(rx);

        let task = Task::new(
            "task-1".into(),
            "job-1".into(),
            1,
            1,
            Source::Google,
            TrackingParams::default(),
        );
        let event = TaskStatusEvent::from_task(&task);
        assert!(matches!(
            sink.task_status(event.clone()).await,
            Err(NotifyError::Closed)
        ));

        // Logged, not propagated
        deliver_task_status(&sink, event).await;
    }
}
