//! Job orchestration
//!
//! [`JobOrchestrator::start_tracking`] validates a request, persists one job
//! and one task per keyword, and returns the job id right away. The tasks are
//! then drained in the background by the worker pool; the job's terminal
//! status is derived from the stored outcome counters once every batch has
//! finished.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use rankwatch_core::{
    IdGenerator, IdKind, Job, JobFilter, JobId, JobPage, JobStatus, Pagination, ParamsError,
    Position, SiteId, Source, Task, TaskStatus, TrackResult, TrackingParams,
};
use rankwatch_persist::{
    JobStore, KeywordStore, PositionStore, ResultStore, SiteStore, StoreError, TaskStore,
    TrackingStore,
};
use rankwatch_queue::WorkerPool;

use crate::config::TrackerConfig;
use crate::executor::TaskExecutor;
use crate::notify::{
    deliver_job_status, deliver_task_status, JobStatusEvent, NotificationSink, TaskStatusEvent,
};
use crate::runner::TaskRunner;

#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(#[from] ParamsError),

    #[error("Site {site_id} not found")]
    SiteNotFound {
        site_id: SiteId,
        #[source]
        cause: Option<StoreError>,
    },

    #[error("Failed to fetch keywords: {0}")]
    KeywordFetchFailed(#[source] StoreError),

    #[error("Failed to create job: {0}")]
    JobCreationFailed(#[source] StoreError),

    #[error("Failed to create tasks for job {job_id}: {cause}")]
    TaskCreationFailed {
        job_id: JobId,
        #[source]
        cause: StoreError,
    },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Error stored on a task that was still open when its job's batches ended
pub const UNFINISHED_TASK: &str = "task did not finish";

/// A request to track every keyword of a site against one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingRequest {
    pub site_id: SiteId,
    pub source: Source,
    #[serde(default)]
    pub params: TrackingParams,
}

impl TrackingRequest {
    pub fn new(site_id: SiteId, source: Source) -> Self {
        Self {
            site_id,
            source,
            params: TrackingParams::default(),
        }
    }

    pub fn with_params(mut self, params: TrackingParams) -> Self {
        self.params = params;
        self
    }
}

/// Background run of one job
#[derive(Debug)]
pub struct TrackingHandle {
    job_id: JobId,
    handle: JoinHandle<Option<Job>>,
}

impl TrackingHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the run to end. Yields the terminal job, or `None` when the
    /// run could not bring the job to a terminal state.
    pub async fn wait(self) -> Result<Option<Job>, JoinError> {
        self.handle.await
    }
}

/// Decrements the active-run counter when a background run ends, even by panic
struct ActiveRun(Arc<AtomicUsize>);

impl ActiveRun {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Turns tracking requests into jobs and runs them in the background
#[derive(Clone)]
pub struct JobOrchestrator {
    config: TrackerConfig,
    store: Arc<dyn TrackingStore>,
    ids: Arc<dyn IdGenerator>,
    sink: Arc<dyn NotificationSink>,
    pool: WorkerPool,
    runner: Arc<TaskRunner>,
    active: Arc<AtomicUsize>,
}

impl JobOrchestrator {
    pub fn new(
        config: TrackerConfig,
        store: Arc<dyn TrackingStore>,
        executor: TaskExecutor,
        sink: Arc<dyn NotificationSink>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let runner = TaskRunner::new(
            store.clone(),
            Arc::new(executor),
            config.retry_executor(),
            sink.clone(),
            ids.clone(),
        );
        Self {
            pool: WorkerPool::new(config.worker_config()),
            runner: Arc::new(runner),
            active: Arc::new(AtomicUsize::new(0)),
            config,
            store,
            ids,
            sink,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Background runs currently in flight
    pub fn active_jobs(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Create a job for `request` and process it in the background.
    ///
    /// Returns as soon as the job and its tasks are persisted; the job's
    /// progress is observable through [`JobOrchestrator::job`].
    pub async fn start_tracking(&self, request: TrackingRequest) -> Result<JobId, TrackingError> {
        let handle = self.spawn_tracking(request).await?;
        Ok(handle.job_id)
    }

    /// Like [`JobOrchestrator::start_tracking`], keeping the background handle
    pub async fn spawn_tracking(
        &self,
        request: TrackingRequest,
    ) -> Result<TrackingHandle, TrackingError> {
        let job = self.create_job(&request).await?;
        let job_id = job.id.clone();

        let orchestrator = self.clone();
        let guard = ActiveRun::enter(&self.active);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            orchestrator.run_job(job).await
        });

        Ok(TrackingHandle { job_id, handle })
    }

    async fn create_job(&self, request: &TrackingRequest) -> Result<Job, TrackingError> {
        request.params.validate(self.config.max_pages)?;

        let site = match self.store.site(request.site_id).await {
            Ok(Some(site)) => site,
            Ok(None) => {
                return Err(TrackingError::SiteNotFound {
                    site_id: request.site_id,
                    cause: None,
                })
            }
            Err(e) => {
                return Err(TrackingError::SiteNotFound {
                    site_id: request.site_id,
                    cause: Some(e),
                })
            }
        };

        let keywords = self
            .store
            .keywords_for_site(site.id)
            .await
            .map_err(TrackingError::KeywordFetchFailed)?;

        let job = Job::new(
            self.ids.generate(IdKind::Job),
            site.id,
            request.source,
            task_total(keywords.len())?,
        );
        self.store
            .create_job(&job)
            .await
            .map_err(TrackingError::JobCreationFailed)?;

        // Tasks already written stay behind if a later insert fails
        for keyword in &keywords {
            let task = Task::new(
                self.ids.generate(IdKind::Task),
                job.id.clone(),
                keyword.id,
                site.id,
                request.source,
                request.params.clone(),
            )
            .with_max_retries(self.config.max_retries);

            self.store
                .create_task(&task)
                .await
                .map_err(|cause| TrackingError::TaskCreationFailed {
                    job_id: job.id.clone(),
                    cause,
                })?;
        }

        info!(
            job_id = %job.id,
            site_id = site.id,
            source = %request.source,
            tasks = job.total_tasks,
            "Job created"
        );
        Ok(job)
    }

    async fn run_job(&self, job: Job) -> Option<Job> {
        let running = match self.store.mark_job_running(&job.id, Utc::now()).await {
            Ok(running) => running,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to start job");
                return None;
            }
        };
        info!(job_id = %running.id, tasks = running.total_tasks, "Job running");
        deliver_job_status(self.sink.as_ref(), JobStatusEvent::from_job(&running)).await;

        let tasks = match self.store.tasks_for_job(&running.id).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(job_id = %running.id, error = %e, "Failed to load tasks");
                let message = format!("failed to load tasks: {}", e);
                return self.abort(&running.id, &message).await;
            }
        };

        let report = self.pool.process(tasks, self.runner.clone()).await;
        if report.aborted_batches > 0 {
            warn!(
                job_id = %running.id,
                aborted = report.aborted_batches,
                "Some batches did not finish"
            );
        }
        debug!(job_id = %running.id, batches = report.batches, "All batches finished");

        if let Err(e) = self.reconcile_outcomes(&running.id).await {
            error!(job_id = %running.id, error = %e, "Failed to reconcile task outcomes");
            let message = format!("failed to reconcile task outcomes: {}", e);
            return self.abort(&running.id, &message).await;
        }

        self.finish(self.store.finalize_job(&running.id, Utc::now()).await)
            .await
    }

    /// Rebuild the job's counters from its task states when some outcomes
    /// were never counted. Open tasks are failed; missing tasks count as
    /// failed.
    async fn reconcile_outcomes(&self, job_id: &str) -> Result<(), StoreError> {
        let job = self
            .store
            .job(job_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("job {}", job_id)))?;
        if job.finished_tasks() == job.total_tasks {
            return Ok(());
        }

        let now = Utc::now();
        let mut completed = 0u32;
        for mut task in self.store.tasks_for_job(job_id).await? {
            match task.status {
                TaskStatus::Completed => completed += 1,
                TaskStatus::Failed => {}
                TaskStatus::Pending | TaskStatus::Running => {
                    task.status = TaskStatus::Failed;
                    task.error = Some(UNFINISHED_TASK.to_string());
                    task.updated_at = now;
                    task.completed_at = Some(now);
                    self.store.update_task(&task).await?;
                    deliver_task_status(self.sink.as_ref(), TaskStatusEvent::from_task(&task))
                        .await;
                }
            }
        }

        let completed = completed.min(job.total_tasks);
        let failed = job.total_tasks - completed;
        warn!(
            job_id = %job_id,
            counted = job.finished_tasks(),
            completed = completed,
            failed = failed,
            "Rebuilding job progress from task states"
        );
        self.store
            .reconcile_job(job_id, completed, failed, now)
            .await?;
        Ok(())
    }

    async fn abort(&self, job_id: &str, message: &str) -> Option<Job> {
        self.finish(self.store.abort_job(job_id, message, Utc::now()).await)
            .await
    }

    async fn finish(&self, terminal: Result<Job, StoreError>) -> Option<Job> {
        match terminal {
            Ok(job) => {
                info!(
                    job_id = %job.id,
                    status = %job.status,
                    completed = job.completed_tasks,
                    failed = job.failed_tasks,
                    total = job.total_tasks,
                    "Job finished"
                );
                deliver_job_status(self.sink.as_ref(), JobStatusEvent::from_job(&job)).await;
                Some(job)
            }
            Err(e) => {
                error!(error = %e, "Failed to finalize job");
                None
            }
        }
    }

    pub async fn job(&self, id: &str) -> Result<Option<Job>, TrackingError> {
        Ok(self.store.job(id).await?)
    }

    pub async fn jobs_for_site(&self, site_id: SiteId) -> Result<Vec<Job>, TrackingError> {
        Ok(self.store.jobs_for_site(site_id).await?)
    }

    pub async fn jobs_with_status(&self, status: JobStatus) -> Result<Vec<Job>, TrackingError> {
        Ok(self.store.jobs_with_status(status).await?)
    }

    pub async fn list_jobs(
        &self,
        filter: &JobFilter,
        page: Pagination,
    ) -> Result<JobPage, TrackingError> {
        Ok(self.store.list_jobs(filter, page).await?)
    }

    pub async fn tasks_for_job(&self, job_id: &str) -> Result<Vec<Task>, TrackingError> {
        Ok(self.store.tasks_for_job(job_id).await?)
    }

    pub async fn results_for_job(&self, job_id: &str) -> Result<Vec<TrackResult>, TrackingError> {
        Ok(self.store.results_for_job(job_id).await?)
    }

    pub async fn positions_for_site(
        &self,
        site_id: SiteId,
        source: Source,
        date: NaiveDate,
    ) -> Result<Vec<Position>, TrackingError> {
        Ok(self.store.positions_for_site(site_id, source, date).await?)
    }

    /// Delete a job and its tasks; results and positions are kept
    pub async fn delete_job(&self, id: &str) -> Result<bool, TrackingError> {
        let deleted = self.store.delete_job(id).await?;
        if deleted {
            info!(job_id = %id, "Job deleted");
        }
        Ok(deleted)
    }

    pub async fn delete_jobs_for_site(&self, site_id: SiteId) -> Result<usize, TrackingError> {
        let deleted = self.store.delete_jobs_for_site(site_id).await?;
        info!(site_id = site_id, deleted = deleted, "Site jobs deleted");
        Ok(deleted)
    }
}

/// Task count of a new job, one task per keyword
fn task_total(keywords: usize) -> Result<u32, TrackingError> {
    u32::try_from(keywords).map_err(|_| {
        TrackingError::Store(StoreError::Invariant(format!(
            "{} keywords exceed the task limit of a job",
            keywords
        )))
    })
}
