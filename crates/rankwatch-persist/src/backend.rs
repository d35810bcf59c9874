//! Store traits and error types

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use rankwatch_core::{
    Job, JobFilter, JobPage, JobStatus, Keyword, KeywordId, Pagination, Position, Site, SiteId,
    Source, Task, TaskOutcome, TrackResult,
};

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Read access to tracked sites
#[async_trait]
pub trait SiteStore: Send + Sync {
    async fn site(&self, id: SiteId) -> Result<Option<Site>, StoreError>;
}

/// Read access to tracked keywords
#[async_trait]
pub trait KeywordStore: Send + Sync {
    async fn keyword(&self, id: KeywordId) -> Result<Option<Keyword>, StoreError>;

    /// Keywords of a site, ordered by id
    async fn keywords_for_site(&self, site_id: SiteId) -> Result<Vec<Keyword>, StoreError>;
}

/// Jobs and their progress counters.
///
/// `total_tasks` is written once by [`JobStore::create_job`]; no method
/// changes it afterwards.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &Job) -> Result<(), StoreError>;

    async fn job(&self, id: &str) -> Result<Option<Job>, StoreError>;

    /// Move a pending job to `running`
    async fn mark_job_running(&self, id: &str, at: DateTime<Utc>) -> Result<Job, StoreError>;

    /// Atomically count one task outcome and return the updated job.
    ///
    /// Fails with [`StoreError::Invariant`] when every task is already
    /// accounted for.
    async fn record_task_outcome(&self, id: &str, outcome: TaskOutcome)
        -> Result<Job, StoreError>;

    /// Overwrite the outcome counters of a non-terminal job, for runs whose
    /// counted outcomes fell behind the task states.
    ///
    /// Fails with [`StoreError::Invariant`] when `completed + failed` exceeds
    /// `total_tasks` or the job is already terminal.
    async fn reconcile_job(
        &self,
        id: &str,
        completed: u32,
        failed: u32,
        at: DateTime<Utc>,
    ) -> Result<Job, StoreError>;

    /// Derive the terminal status from the stored counters and persist it
    async fn finalize_job(&self, id: &str, at: DateTime<Utc>) -> Result<Job, StoreError>;

    /// Fail a non-terminal job with `error`, leaving its counters untouched
    async fn abort_job(&self, id: &str, error: &str, at: DateTime<Utc>)
        -> Result<Job, StoreError>;

    /// Newest first
    async fn jobs_for_site(&self, site_id: SiteId) -> Result<Vec<Job>, StoreError>;

    /// Newest first
    async fn jobs_with_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError>;

    async fn list_jobs(&self, filter: &JobFilter, page: Pagination)
        -> Result<JobPage, StoreError>;

    /// Delete a job together with its tasks
    async fn delete_job(&self, id: &str) -> Result<bool, StoreError>;

    /// Delete every job of a site (and their tasks); returns the number of jobs removed
    async fn delete_jobs_for_site(&self, site_id: SiteId) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, task: &Task) -> Result<(), StoreError>;

    async fn task(&self, id: &str) -> Result<Option<Task>, StoreError>;

    /// Tasks of a job in creation order
    async fn tasks_for_job(&self, job_id: &str) -> Result<Vec<Task>, StoreError>;

    /// Overwrite status, retry count, error and timestamps of an existing task
    async fn update_task(&self, task: &Task) -> Result<(), StoreError>;
}

/// Append-only lookup results
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn append_result(&self, result: &TrackResult) -> Result<(), StoreError>;

    /// Results of a job in insertion order
    async fn results_for_job(&self, job_id: &str) -> Result<Vec<TrackResult>, StoreError>;
}

/// Daily positions, one row per (keyword, site, source, date)
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Insert, or overwrite the row with the same key
    async fn create_or_update_today(&self, position: &Position) -> Result<(), StoreError>;

    async fn position(
        &self,
        keyword_id: KeywordId,
        site_id: SiteId,
        source: Source,
        date: NaiveDate,
    ) -> Result<Option<Position>, StoreError>;

    /// Positions of a site for one source and day, ordered by keyword id
    async fn positions_for_site(
        &self,
        site_id: SiteId,
        source: Source,
        date: NaiveDate,
    ) -> Result<Vec<Position>, StoreError>;
}

/// Everything the tracking runtime needs from storage
pub trait TrackingStore:
    SiteStore + KeywordStore + JobStore + TaskStore + ResultStore + PositionStore
{
}

impl<S> TrackingStore for S where
    S: SiteStore + KeywordStore + JobStore + TaskStore + ResultStore + PositionStore
{
}
