//! Job types
//!
//! A [`Job`] is one tracking run for one site against one [`Source`]. Its
//! status is derived from the outcomes of the tasks it fans out into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::site::SiteId;
use crate::source::Source;

/// Opaque job identifier
pub type JobId = String;

/// Error message stored on a job whose every task failed
pub const ALL_TASKS_FAILED: &str = "All tasks failed";

/// Lifecycle shared by jobs and tasks: `pending -> running -> {completed, failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Created, not yet picked up
    Pending,
    /// Being processed
    Running,
    /// Finished successfully
    Completed,
    /// Finished unsuccessfully (including exhausted retries)
    Failed,
}

/// Job status
pub type JobStatus = RunStatus;

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("Invalid status: {}", other)),
        }
    }
}

/// Terminal outcome of a single task, as counted on its job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskOutcome {
    Completed,
    Failed,
}

impl TaskOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            Self::Completed => RunStatus::Completed,
            Self::Failed => RunStatus::Failed,
        }
    }
}

/// One tracking run for a site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub site_id: SiteId,
    pub source: Source,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set exactly when `status` is terminal
    pub completed_at: Option<DateTime<Utc>>,
    /// Fixed at creation
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub failed_tasks: u32,
    pub error: Option<String>,
}

impl Job {
    /// Create a pending job expecting `total_tasks` task outcomes
    pub fn new(id: JobId, site_id: SiteId, source: Source, total_tasks: u32) -> Self {
        let now = Utc::now();
        Self {
            id,
            site_id,
            source,
            status: RunStatus::Pending,
            created_at: now,
            updated_at: now,
            completed_at: None,
            total_tasks,
            completed_tasks: 0,
            failed_tasks: 0,
            error: None,
        }
    }

    /// Number of tasks that have reached a terminal state
    pub fn finished_tasks(&self) -> u32 {
        self.completed_tasks + self.failed_tasks
    }

    /// Number of tasks still outstanding
    pub fn remaining_tasks(&self) -> u32 {
        self.total_tasks.saturating_sub(self.finished_tasks())
    }

    /// Count one task outcome. Returns `false` (and changes nothing) when every
    /// task has already been accounted for.
    pub fn record_outcome(&mut self, outcome: TaskOutcome, at: DateTime<Utc>) -> bool {
        if self.remaining_tasks() == 0 {
            return false;
        }
        match outcome {
            TaskOutcome::Completed => self.completed_tasks += 1,
            TaskOutcome::Failed => self.failed_tasks += 1,
        }
        self.updated_at = at;
        true
    }

    /// Replace both outcome counters. Returns `false` (and changes nothing)
    /// when they would exceed `total_tasks`.
    pub fn set_outcomes(&mut self, completed: u32, failed: u32, at: DateTime<Utc>) -> bool {
        match completed.checked_add(failed) {
            Some(finished) if finished <= self.total_tasks => {
                self.completed_tasks = completed;
                self.failed_tasks = failed;
                self.updated_at = at;
                true
            }
            _ => false,
        }
    }

    /// Terminal status implied by the current counters.
    ///
    /// A job fails only when every one of its tasks failed; a job without
    /// tasks completes.
    pub fn terminal_status(&self) -> (JobStatus, Option<String>) {
        if self.total_tasks > 0 && self.failed_tasks == self.total_tasks {
            (RunStatus::Failed, Some(ALL_TASKS_FAILED.to_string()))
        } else {
            (RunStatus::Completed, None)
        }
    }

    /// Move the job into its terminal state
    pub fn finalize(&mut self, at: DateTime<Utc>) {
        let (status, error) = self.terminal_status();
        self.status = status;
        self.error = error;
        self.updated_at = at;
        self.completed_at = Some(at);
    }

    pub fn mark_running(&mut self, at: DateTime<Utc>) {
        self.status = RunStatus::Running;
        self.updated_at = at;
    }

    /// Fail the job without deriving status from its counters, for runs that
    /// could not start processing their tasks
    pub fn abort(&mut self, error: &str, at: DateTime<Utc>) {
        self.status = RunStatus::Failed;
        self.error = Some(error.to_string());
        self.updated_at = at;
        self.completed_at = Some(at);
    }
}

/// Optional filters for job listings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilter {
    pub site_id: Option<SiteId>,
    pub status: Option<JobStatus>,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        self.site_id.map_or(true, |id| id == job.site_id)
            && self.status.map_or(true, |status| status == job.status)
    }
}

/// Offset/limit window over a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 20,
        }
    }
}

impl Pagination {
    /// 1-based page number with a fixed page size
    pub fn page(page: usize, per_page: usize) -> Self {
        Self {
            offset: page.saturating_sub(1).saturating_mul(per_page),
            limit: per_page,
        }
    }
}

/// One page of jobs plus the total number of matches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub total: usize,
}
