//! Durable lookup records: append-only results and daily positions

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::site::{KeywordId, SiteId};
use crate::source::Source;
use crate::task::{QueryContext, Task, TaskId};

/// Outcome of one task execution, appended and never updated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackResult {
    pub id: String,
    pub task_id: TaskId,
    pub job_id: JobId,
    pub keyword_id: KeywordId,
    pub site_id: SiteId,
    pub source: Source,
    /// 1-based SERP position, or the frequency count for `Source::Wordstat`.
    /// Zero means the site was not found in the examined pages.
    pub rank: i64,
    pub url: String,
    pub title: String,
    pub context: QueryContext,
    pub date: NaiveDate,
    pub success: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TrackResult {
    /// Successful lookup for `task`
    pub fn success(id: String, task: &Task, rank: i64, url: &str, title: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            task_id: task.id.clone(),
            job_id: task.job_id.clone(),
            keyword_id: task.keyword_id,
            site_id: task.site_id,
            source: task.source,
            rank,
            url: url.to_string(),
            title: title.to_string(),
            context: task.params.context.clone(),
            date: now.date_naive(),
            success: true,
            error: None,
            created_at: now,
        }
    }

    /// Lookup that gave up with `error`
    pub fn failure(id: String, task: &Task, error: &str) -> Self {
        let mut result = Self::success(id, task, 0, "", "");
        result.success = false;
        result.error = Some(error.to_string());
        result
    }
}

/// Latest rank for a (keyword, site, source) triple on one calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub keyword_id: KeywordId,
    pub site_id: SiteId,
    pub source: Source,
    pub date: NaiveDate,
    pub rank: i64,
    pub url: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Today's position for the task's keyword
    pub fn today(task: &Task, rank: i64, url: &str, title: &str) -> Self {
        let now = Utc::now();
        Self {
            keyword_id: task.keyword_id,
            site_id: task.site_id,
            source: task.source,
            date: now.date_naive(),
            rank,
            url: url.to_string(),
            title: title.to_string(),
            updated_at: now,
        }
    }

    /// Upsert key; at most one row exists per key
    pub fn key(&self) -> (KeywordId, SiteId, Source, NaiveDate) {
        (self.keyword_id, self.site_id, self.source, self.date)
    }
}
