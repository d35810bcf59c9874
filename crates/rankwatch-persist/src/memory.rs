//! In-memory store

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use rankwatch_core::{
    Job, JobFilter, JobPage, JobStatus, Keyword, KeywordId, Pagination, Position, RunStatus, Site,
    SiteId, Source, Task, TaskOutcome, TrackResult,
};

use crate::backend::{
    JobStore, KeywordStore, PositionStore, ResultStore, SiteStore, StoreError, TaskStore,
};

type PositionKey = (KeywordId, SiteId, Source, NaiveDate);

/// Simulated storage failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    /// Every keyword read fails
    KeywordReads,
    /// Task inserts fail once `after` tasks have been stored
    TaskInserts { after: usize },
    /// Every read of a job's tasks fails
    TaskReads,
    /// The first `first` outcome writes fail
    OutcomeWrites { first: usize },
}

#[derive(Debug, Default)]
struct State {
    sites: HashMap<SiteId, Site>,
    keywords: BTreeMap<KeywordId, Keyword>,
    jobs: HashMap<String, Job>,
    tasks: HashMap<String, Task>,
    /// Task ids per job, in creation order
    job_tasks: HashMap<String, Vec<String>>,
    results: Vec<TrackResult>,
    positions: HashMap<PositionKey, Position>,
    failures: Vec<FailurePoint>,
    outcome_writes: usize,
}

impl State {
    fn job_mut(&mut self, id: &str) -> Result<&mut Job, StoreError> {
        self.jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("job {}", id)))
    }

    fn remove_job(&mut self, id: &str) -> bool {
        if self.jobs.remove(id).is_none() {
            return false;
        }
        for task_id in self.job_tasks.remove(id).unwrap_or_default() {
            self.tasks.remove(&task_id);
        }
        true
    }
}

/// Store backed by process memory. Counter updates happen under a single
/// write lock, so concurrent task outcomes are never lost.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_site(&self, site: Site) {
        self.state.write().await.sites.insert(site.id, site);
    }

    pub async fn add_keyword(&self, keyword: Keyword) {
        self.state.write().await.keywords.insert(keyword.id, keyword);
    }

    pub async fn inject_failure(&self, point: FailurePoint) {
        self.state.write().await.failures.push(point);
    }

    pub async fn clear_failures(&self) {
        self.state.write().await.failures.clear();
    }

    /// Number of stored results (all jobs)
    pub async fn result_count(&self) -> usize {
        self.state.read().await.results.len()
    }

    /// Number of stored position rows (all days)
    pub async fn position_count(&self) -> usize {
        self.state.read().await.positions.len()
    }
}

fn newest_first(mut jobs: Vec<Job>) -> Vec<Job> {
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
    jobs
}

#[async_trait]
impl SiteStore for MemoryStore {
    async fn site(&self, id: SiteId) -> Result<Option<Site>, StoreError> {
        Ok(self.state.read().await.sites.get(&id).cloned())
    }
}

#[async_trait]
impl KeywordStore for MemoryStore {
    async fn keyword(&self, id: KeywordId) -> Result<Option<Keyword>, StoreError> {
        let state = self.state.read().await;
        if state.failures.contains(&FailurePoint::KeywordReads) {
            return Err(StoreError::Connection("keyword store unavailable".into()));
        }
        Ok(state.keywords.get(&id).cloned())
    }

    async fn keywords_for_site(&self, site_id: SiteId) -> Result<Vec<Keyword>, StoreError> {
        let state = self.state.read().await;
        if state.failures.contains(&FailurePoint::KeywordReads) {
            return Err(StoreError::Connection("keyword store unavailable".into()));
        }
        Ok(state
            .keywords
            .values()
            .filter(|k| k.site_id == site_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(format!("job {}", job.id)));
        }
        state.jobs.insert(job.id.clone(), job.clone());
        state.job_tasks.entry(job.id.clone()).or_default();
        Ok(())
    }

    async fn job(&self, id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.state.read().await.jobs.get(id).cloned())
    }

    async fn mark_job_running(&self, id: &str, at: DateTime<Utc>) -> Result<Job, StoreError> {
        let mut state = self.state.write().await;
        let job = state.job_mut(id)?;
        if job.status != RunStatus::Pending {
            return Err(StoreError::Invariant(format!(
                "job {} is {}, expected pending",
                id, job.status
            )));
        }
        job.mark_running(at);
        Ok(job.clone())
    }

    async fn record_task_outcome(
        &self,
        id: &str,
        outcome: TaskOutcome,
    ) -> Result<Job, StoreError> {
        let mut state = self.state.write().await;
        let attempt = state.outcome_writes;
        state.outcome_writes += 1;
        let rejected = state.failures.iter().any(|point| {
            matches!(point, FailurePoint::OutcomeWrites { first } if attempt < *first)
        });
        if rejected {
            return Err(StoreError::Connection("job store unavailable".into()));
        }

        let job = state.job_mut(id)?;
        if !job.record_outcome(outcome, Utc::now()) {
            return Err(StoreError::Invariant(format!(
                "job {} already has all {} task outcomes",
                id, job.total_tasks
            )));
        }
        Ok(job.clone())
    }

    async fn reconcile_job(
        &self,
        id: &str,
        completed: u32,
        failed: u32,
        at: DateTime<Utc>,
    ) -> Result<Job, StoreError> {
        let mut state = self.state.write().await;
        let job = state.job_mut(id)?;
        if job.status.is_terminal() {
            return Err(StoreError::Invariant(format!(
                "job {} is already {}",
                id, job.status
            )));
        }
        if !job.set_outcomes(completed, failed, at) {
            return Err(StoreError::Invariant(format!(
                "job {} has only {} tasks",
                id, job.total_tasks
            )));
        }
        Ok(job.clone())
    }

    async fn finalize_job(&self, id: &str, at: DateTime<Utc>) -> Result<Job, StoreError> {
        let mut state = self.state.write().await;
        let job = state.job_mut(id)?;
        if job.status.is_terminal() {
            return Err(StoreError::Invariant(format!(
                "job {} is already {}",
                id, job.status
            )));
        }
        job.finalize(at);
        Ok(job.clone())
    }

    async fn abort_job(
        &self,
        id: &str,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<Job, StoreError> {
        let mut state = self.state.write().await;
        let job = state.job_mut(id)?;
        if job.status.is_terminal() {
            return Err(StoreError::Invariant(format!(
                "job {} is already {}",
                id, job.status
            )));
        }
        job.abort(error, at);
        Ok(job.clone())
    }

    async fn jobs_for_site(&self, site_id: SiteId) -> Result<Vec<Job>, StoreError> {
        let state = self.state.read().await;
        Ok(newest_first(
            state
                .jobs
                .values()
                .filter(|j| j.site_id == site_id)
                .cloned()
                .collect(),
        ))
    }

    async fn jobs_with_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        let state = self.state.read().await;
        Ok(newest_first(
            state
                .jobs
                .values()
                .filter(|j| j.status == status)
                .cloned()
                .collect(),
        ))
    }

    async fn list_jobs(
        &self,
        filter: &JobFilter,
        page: Pagination,
    ) -> Result<JobPage, StoreError> {
        let state = self.state.read().await;
        let matching = newest_first(
            state
                .jobs
                .values()
                .filter(|j| filter.matches(j))
                .cloned()
                .collect(),
        );
        let total = matching.len();
        let jobs = matching
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect();
        Ok(JobPage { jobs, total })
    }

    async fn delete_job(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.state.write().await.remove_job(id))
    }

    async fn delete_jobs_for_site(&self, site_id: SiteId) -> Result<usize, StoreError> {
        let mut state = self.state.write().await;
        let ids: Vec<String> = state
            .jobs
            .values()
            .filter(|j| j.site_id == site_id)
            .map(|j| j.id.clone())
            .collect();
        for id in &ids {
            state.remove_job(id);
        }
        Ok(ids.len())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let stored = state.tasks.len();
        for point in &state.failures {
            if let FailurePoint::TaskInserts { after } = point {
                if stored >= *after {
                    return Err(StoreError::Query("task insert rejected".into()));
                }
            }
        }
        if !state.jobs.contains_key(&task.job_id) {
            return Err(StoreError::NotFound(format!("job {}", task.job_id)));
        }
        if state.tasks.contains_key(&task.id) {
            return Err(StoreError::AlreadyExists(format!("task {}", task.id)));
        }
        state.tasks.insert(task.id.clone(), task.clone());
        state
            .job_tasks
            .entry(task.job_id.clone())
            .or_default()
            .push(task.id.clone());
        Ok(())
    }

    async fn task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self.state.read().await.tasks.get(id).cloned())
    }

    async fn tasks_for_job(&self, job_id: &str) -> Result<Vec<Task>, StoreError> {
        let state = self.state.read().await;
        if state.failures.contains(&FailurePoint::TaskReads) {
            return Err(StoreError::Connection("task store unavailable".into()));
        }
        let ids = match state.job_tasks.get(job_id) {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };
        Ok(ids
            .iter()
            .filter_map(|id| state.tasks.get(id).cloned())
            .collect())
    }

    async fn update_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let stored = state
            .tasks
            .get_mut(&task.id)
            .ok_or_else(|| StoreError::NotFound(format!("task {}", task.id)))?;
        stored.status = task.status;
        stored.retry_count = task.retry_count;
        stored.error = task.error.clone();
        stored.updated_at = task.updated_at;
        stored.completed_at = task.completed_at;
        Ok(())
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn append_result(&self, result: &TrackResult) -> Result<(), StoreError> {
        self.state.write().await.results.push(result.clone());
        Ok(())
    }

    async fn results_for_job(&self, job_id: &str) -> Result<Vec<TrackResult>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .results
            .iter()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PositionStore for MemoryStore {
    async fn create_or_update_today(&self, position: &Position) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .positions
            .insert(position.key(), position.clone());
        Ok(())
    }

    async fn position(
        &self,
        keyword_id: KeywordId,
        site_id: SiteId,
        source: Source,
        date: NaiveDate,
    ) -> Result<Option<Position>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .positions
            .get(&(keyword_id, site_id, source, date))
            .cloned())
    }

    async fn positions_for_site(
        &self,
        site_id: SiteId,
        source: Source,
        date: NaiveDate,
    ) -> Result<Vec<Position>, StoreError> {
        let state = self.state.read().await;
        let mut positions: Vec<Position> = state
            .positions
            .values()
            .filter(|p| p.site_id == site_id && p.source == source && p.date == date)
            .cloned()
            .collect();
        positions.sort_by_key(|p| p.keyword_id);
        Ok(positions)
    }
}
