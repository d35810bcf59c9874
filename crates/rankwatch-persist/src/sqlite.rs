//! SQLite backend implementation

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::info;

use rankwatch_core::{
    Job, JobFilter, JobPage, JobStatus, Keyword, KeywordId, Pagination, Position, RunStatus, Site,
    SiteId, Source, Task, TaskOutcome, TrackResult, ALL_TASKS_FAILED,
};

use crate::backend::{
    JobStore, KeywordStore, PositionStore, ResultStore, SiteStore, StoreError, TaskStore,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS sites (
        id INTEGER PRIMARY KEY,
        domain TEXT NOT NULL,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS keywords (
        id INTEGER PRIMARY KEY,
        site_id INTEGER NOT NULL,
        phrase TEXT NOT NULL,
        region INTEGER
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_keywords_site ON keywords (site_id)",
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        site_id INTEGER NOT NULL,
        source TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        completed_at TEXT,
        total_tasks INTEGER NOT NULL,
        completed_tasks INTEGER NOT NULL DEFAULT 0,
        failed_tasks INTEGER NOT NULL DEFAULT 0,
        error TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_jobs_site ON jobs (site_id)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs (status)",
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        job_id TEXT NOT NULL REFERENCES jobs (id),
        keyword_id INTEGER NOT NULL,
        site_id INTEGER NOT NULL,
        source TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        completed_at TEXT,
        retry_count INTEGER NOT NULL DEFAULT 0,
        max_retries INTEGER NOT NULL,
        error TEXT,
        params TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tasks_job ON tasks (job_id)",
    r#"
    CREATE TABLE IF NOT EXISTS results (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL,
        task_id TEXT NOT NULL,
        job_id TEXT NOT NULL,
        keyword_id INTEGER NOT NULL,
        site_id INTEGER NOT NULL,
        source TEXT NOT NULL,
        rank INTEGER NOT NULL,
        url TEXT NOT NULL,
        title TEXT NOT NULL,
        context TEXT NOT NULL,
        date TEXT NOT NULL,
        success INTEGER NOT NULL,
        error TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_results_job ON results (job_id)",
    r#"
    CREATE TABLE IF NOT EXISTS positions (
        keyword_id INTEGER NOT NULL,
        site_id INTEGER NOT NULL,
        source TEXT NOT NULL,
        date TEXT NOT NULL,
        rank INTEGER NOT NULL,
        url TEXT NOT NULL,
        title TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (keyword_id, site_id, source, date)
    )
    "#,
];

const JOB_COLUMNS: &str = "id, site_id, source, status, created_at, updated_at, completed_at, \
                           total_tasks, completed_tasks, failed_tasks, error";

const TASK_COLUMNS: &str = "id, job_id, keyword_id, site_id, source, status, created_at, \
                            updated_at, completed_at, retry_count, max_retries, error, params";

/// SQLite configuration options
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database URL (e.g., "sqlite:rankwatch.db?mode=rwc" or "sqlite::memory:")
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Enable WAL journal mode for better concurrency
    pub wal_mode: bool,
    /// Busy timeout in seconds
    pub busy_timeout_secs: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:rankwatch.db?mode=rwc".to_string(),
            max_connections: 5,
            wal_mode: true,
            busy_timeout_secs: 30,
        }
    }
}

impl SqliteConfig {
    /// In-memory database (testing). A single connection, since every
    /// connection to `:memory:` opens its own database.
    pub fn memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            wal_mode: false,
            busy_timeout_secs: 5,
        }
    }
}

fn query_err(e: sqlx::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

fn parse_source(s: &str) -> Result<Source, StoreError> {
    Source::from_str(s).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn parse_status(s: &str) -> Result<RunStatus, StoreError> {
    RunStatus::from_str(s).map_err(StoreError::Serialization)
}

fn job_from_row(row: &SqliteRow) -> Result<Job, StoreError> {
    let source: String = row.try_get("source").map_err(query_err)?;
    let status: String = row.try_get("status").map_err(query_err)?;
    Ok(Job {
        id: row.try_get("id").map_err(query_err)?,
        site_id: row.try_get("site_id").map_err(query_err)?,
        source: parse_source(&source)?,
        status: parse_status(&status)?,
        created_at: row.try_get("created_at").map_err(query_err)?,
        updated_at: row.try_get("updated_at").map_err(query_err)?,
        completed_at: row.try_get("completed_at").map_err(query_err)?,
        total_tasks: row.try_get("total_tasks").map_err(query_err)?,
        completed_tasks: row.try_get("completed_tasks").map_err(query_err)?,
        failed_tasks: row.try_get("failed_tasks").map_err(query_err)?,
        error: row.try_get("error").map_err(query_err)?,
    })
}

fn task_from_row(row: &SqliteRow) -> Result<Task, StoreError> {
    let source: String = row.try_get("source").map_err(query_err)?;
    let status: String = row.try_get("status").map_err(query_err)?;
    let params: String = row.try_get("params").map_err(query_err)?;
    Ok(Task {
        id: row.try_get("id").map_err(query_err)?,
        job_id: row.try_get("job_id").map_err(query_err)?,
        keyword_id: row.try_get("keyword_id").map_err(query_err)?,
        site_id: row.try_get("site_id").map_err(query_err)?,
        source: parse_source(&source)?,
        status: parse_status(&status)?,
        created_at: row.try_get("created_at").map_err(query_err)?,
        updated_at: row.try_get("updated_at").map_err(query_err)?,
        completed_at: row.try_get("completed_at").map_err(query_err)?,
        retry_count: row.try_get("retry_count").map_err(query_err)?,
        max_retries: row.try_get("max_retries").map_err(query_err)?,
        error: row.try_get("error").map_err(query_err)?,
        params: serde_json::from_str(&params)?,
    })
}

fn result_from_row(row: &SqliteRow) -> Result<TrackResult, StoreError> {
    let source: String = row.try_get("source").map_err(query_err)?;
    let context: String = row.try_get("context").map_err(query_err)?;
    Ok(TrackResult {
        id: row.try_get("id").map_err(query_err)?,
        task_id: row.try_get("task_id").map_err(query_err)?,
        job_id: row.try_get("job_id").map_err(query_err)?,
        keyword_id: row.try_get("keyword_id").map_err(query_err)?,
        site_id: row.try_get("site_id").map_err(query_err)?,
        source: parse_source(&source)?,
        rank: row.try_get("rank").map_err(query_err)?,
        url: row.try_get("url").map_err(query_err)?,
        title: row.try_get("title").map_err(query_err)?,
        context: serde_json::from_str(&context)?,
        date: row.try_get("date").map_err(query_err)?,
        success: row.try_get("success").map_err(query_err)?,
        error: row.try_get("error").map_err(query_err)?,
        created_at: row.try_get("created_at").map_err(query_err)?,
    })
}

fn position_from_row(row: &SqliteRow) -> Result<Position, StoreError> {
    let source: String = row.try_get("source").map_err(query_err)?;
    Ok(Position {
        keyword_id: row.try_get("keyword_id").map_err(query_err)?,
        site_id: row.try_get("site_id").map_err(query_err)?,
        source: parse_source(&source)?,
        date: row.try_get("date").map_err(query_err)?,
        rank: row.try_get("rank").map_err(query_err)?,
        url: row.try_get("url").map_err(query_err)?,
        title: row.try_get("title").map_err(query_err)?,
        updated_at: row.try_get("updated_at").map_err(query_err)?,
    })
}

/// SQLite store
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect with default settings
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let config = SqliteConfig {
            url: url.to_string(),
            ..Default::default()
        };
        Self::connect(config).await
    }

    /// Connect and create the schema if missing
    pub async fn connect(config: SqliteConfig) -> Result<Self, StoreError> {
        let mut options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .pragma("foreign_keys", "ON")
            .pragma("busy_timeout", (config.busy_timeout_secs * 1000).to_string());

        if config.wal_mode {
            options = options.pragma("journal_mode", "WAL");
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!(url = %config.url, wal = config.wal_mode, "Connected to SQLite");

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Wrap an existing pool; the caller is responsible for [`SqliteStore::migrate`]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Query(format!("Migration failed: {}", e)))?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn add_site(&self, site: &Site) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO sites (id, domain, name) VALUES (?, ?, ?)")
            .bind(site.id)
            .bind(&site.domain)
            .bind(&site.name)
            .execute(&self.pool)
            .await
            .map_err(query_err)?;
        Ok(())
    }

    pub async fn add_keyword(&self, keyword: &Keyword) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO keywords (id, site_id, phrase, region) VALUES (?, ?, ?, ?)",
        )
        .bind(keyword.id)
        .bind(keyword.site_id)
        .bind(&keyword.phrase)
        .bind(keyword.region)
        .execute(&self.pool)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn job_exists(&self, id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err)?;
        Ok(row.is_some())
    }

    /// Error for an UPDATE ... RETURNING that matched no row
    async fn no_row_error(&self, id: &str, expectation: &str) -> StoreError {
        match self.job_exists(id).await {
            Ok(true) => StoreError::Invariant(format!("job {} {}", id, expectation)),
            Ok(false) => StoreError::NotFound(format!("job {}", id)),
            Err(e) => e,
        }
    }

    async fn fetch_jobs(&self, sql: &str, bind: JobBind<'_>) -> Result<Vec<Job>, StoreError> {
        let query = sqlx::query(sql);
        let query = match bind {
            JobBind::Site(site_id) => query.bind(site_id),
            JobBind::Status(status) => query.bind(status),
        };
        let rows = query.fetch_all(&self.pool).await.map_err(query_err)?;
        rows.iter().map(job_from_row).collect()
    }
}

enum JobBind<'a> {
    Site(SiteId),
    Status(&'a str),
}

#[async_trait]
impl SiteStore for SqliteStore {
    async fn site(&self, id: SiteId) -> Result<Option<Site>, StoreError> {
        let row = sqlx::query("SELECT id, domain, name FROM sites WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err)?;
        row.as_ref().map(site_from_row).transpose()
    }
}

fn site_from_row(row: &SqliteRow) -> Result<Site, StoreError> {
    Ok(Site {
        id: row.try_get("id").map_err(query_err)?,
        domain: row.try_get("domain").map_err(query_err)?,
        name: row.try_get("name").map_err(query_err)?,
    })
}

fn keyword_from_row(row: &SqliteRow) -> Result<Keyword, StoreError> {
    Ok(Keyword {
        id: row.try_get("id").map_err(query_err)?,
        site_id: row.try_get("site_id").map_err(query_err)?,
        phrase: row.try_get("phrase").map_err(query_err)?,
        region: row.try_get("region").map_err(query_err)?,
    })
}

#[async_trait]
impl KeywordStore for SqliteStore {
    async fn keyword(&self, id: KeywordId) -> Result<Option<Keyword>, StoreError> {
        let row = sqlx::query("SELECT id, site_id, phrase, region FROM keywords WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err)?;
        row.as_ref().map(keyword_from_row).transpose()
    }

    async fn keywords_for_site(&self, site_id: SiteId) -> Result<Vec<Keyword>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, site_id, phrase, region FROM keywords WHERE site_id = ? ORDER BY id",
        )
        .bind(site_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;
        rows.iter().map(keyword_from_row).collect()
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO jobs ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            JOB_COLUMNS
        ))
        .bind(&job.id)
        .bind(job.site_id)
        .bind(job.source.as_str())
        .bind(job.status.as_str())
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.completed_at)
        .bind(job.total_tasks)
        .bind(job.completed_tasks)
        .bind(job.failed_tasks)
        .bind(&job.error)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::AlreadyExists(format!("job {}", job.id))
            }
            other => query_err(other),
        })?;
        Ok(())
    }

    async fn job(&self, id: &str) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err)?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn mark_job_running(&self, id: &str, at: DateTime<Utc>) -> Result<Job, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE jobs SET status = 'running', updated_at = ? \
             WHERE id = ? AND status = 'pending' RETURNING {}",
            JOB_COLUMNS
        ))
        .bind(at)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err)?;

        match row {
            Some(row) => job_from_row(&row),
            None => Err(self.no_row_error(id, "is not pending").await),
        }
    }

    async fn record_task_outcome(
        &self,
        id: &str,
        outcome: TaskOutcome,
    ) -> Result<Job, StoreError> {
        let (completed, failed) = match outcome {
            TaskOutcome::Completed => (1_i64, 0_i64),
            TaskOutcome::Failed => (0, 1),
        };
        let row = sqlx::query(&format!(
            "UPDATE jobs SET completed_tasks = completed_tasks + ?, \
             failed_tasks = failed_tasks + ?, updated_at = ? \
             WHERE id = ? AND completed_tasks + failed_tasks < total_tasks RETURNING {}",
            JOB_COLUMNS
        ))
        .bind(completed)
        .bind(failed)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err)?;

        match row {
            Some(row) => job_from_row(&row),
            None => Err(self.no_row_error(id, "already has all task outcomes").await),
        }
    }

    async fn reconcile_job(
        &self,
        id: &str,
        completed: u32,
        failed: u32,
        at: DateTime<Utc>,
    ) -> Result<Job, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE jobs SET completed_tasks = ?, failed_tasks = ?, updated_at = ? \
             WHERE id = ? AND status NOT IN ('completed', 'failed') AND ? <= total_tasks \
             RETURNING {}",
            JOB_COLUMNS
        ))
        .bind(i64::from(completed))
        .bind(i64::from(failed))
        .bind(at)
        .bind(id)
        .bind(i64::from(completed) + i64::from(failed))
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err)?;

        match row {
            Some(row) => job_from_row(&row),
            None => Err(self
                .no_row_error(id, "is terminal or has fewer tasks than the outcomes")
                .await),
        }
    }

    async fn finalize_job(&self, id: &str, at: DateTime<Utc>) -> Result<Job, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE jobs SET \
               status = CASE WHEN total_tasks > 0 AND failed_tasks = total_tasks \
                        THEN 'failed' ELSE 'completed' END, \
               error = CASE WHEN total_tasks > 0 AND failed_tasks = total_tasks \
                       THEN ? ELSE NULL END, \
               completed_at = ?, updated_at = ? \
             WHERE id = ? AND status NOT IN ('completed', 'failed') RETURNING {}",
            JOB_COLUMNS
        ))
        .bind(ALL_TASKS_FAILED)
        .bind(at)
        .bind(at)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err)?;

        match row {
            Some(row) => job_from_row(&row),
            None => Err(self.no_row_error(id, "is already terminal").await),
        }
    }

    async fn abort_job(
        &self,
        id: &str,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<Job, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE jobs SET status = 'failed', error = ?, completed_at = ?, updated_at = ? \
             WHERE id = ? AND status NOT IN ('completed', 'failed') RETURNING {}",
            JOB_COLUMNS
        ))
        .bind(error)
        .bind(at)
        .bind(at)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err)?;

        match row {
            Some(row) => job_from_row(&row),
            None => Err(self.no_row_error(id, "is already terminal").await),
        }
    }

    async fn jobs_for_site(&self, site_id: SiteId) -> Result<Vec<Job>, StoreError> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE site_id = ? ORDER BY created_at DESC, id DESC",
            JOB_COLUMNS
        );
        self.fetch_jobs(&sql, JobBind::Site(site_id)).await
    }

    async fn jobs_with_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE status = ? ORDER BY created_at DESC, id DESC",
            JOB_COLUMNS
        );
        self.fetch_jobs(&sql, JobBind::Status(status.as_str())).await
    }

    async fn list_jobs(
        &self,
        filter: &JobFilter,
        page: Pagination,
    ) -> Result<JobPage, StoreError> {
        const WHERE: &str = "(?1 IS NULL OR site_id = ?1) AND (?2 IS NULL OR status = ?2)";
        let status = filter.status.map(|s| s.as_str());

        let total: i64 = sqlx::query(&format!("SELECT COUNT(*) AS total FROM jobs WHERE {}", WHERE))
            .bind(filter.site_id)
            .bind(status)
            .fetch_one(&self.pool)
            .await
            .map_err(query_err)?
            .try_get("total")
            .map_err(query_err)?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM jobs WHERE {} ORDER BY created_at DESC, id DESC LIMIT ?3 OFFSET ?4",
            JOB_COLUMNS, WHERE
        ))
        .bind(filter.site_id)
        .bind(status)
        .bind(page.limit as i64)
        .bind(page.offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;

        Ok(JobPage {
            jobs: rows.iter().map(job_from_row).collect::<Result<_, _>>()?,
            total: total as usize,
        })
    }

    async fn delete_job(&self, id: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(query_err)?;
        sqlx::query("DELETE FROM tasks WHERE job_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        let deleted = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        tx.commit().await.map_err(query_err)?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn delete_jobs_for_site(&self, site_id: SiteId) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await.map_err(query_err)?;
        sqlx::query("DELETE FROM tasks WHERE job_id IN (SELECT id FROM jobs WHERE site_id = ?)")
            .bind(site_id)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        let deleted = sqlx::query("DELETE FROM jobs WHERE site_id = ?")
            .bind(site_id)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        tx.commit().await.map_err(query_err)?;
        Ok(deleted.rows_affected() as usize)
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn create_task(&self, task: &Task) -> Result<(), StoreError> {
        let params = serde_json::to_string(&task.params)?;
        sqlx::query(&format!(
            "INSERT INTO tasks ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            TASK_COLUMNS
        ))
        .bind(&task.id)
        .bind(&task.job_id)
        .bind(task.keyword_id)
        .bind(task.site_id)
        .bind(task.source.as_str())
        .bind(task.status.as_str())
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.completed_at)
        .bind(task.retry_count)
        .bind(task.max_retries)
        .bind(&task.error)
        .bind(params)
        .execute(&self.pool)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err)?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn tasks_for_job(&self, job_id: &str) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE job_id = ? ORDER BY seq",
            TASK_COLUMNS
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;
        rows.iter().map(task_from_row).collect()
    }

    async fn update_task(&self, task: &Task) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE tasks SET status = ?, retry_count = ?, error = ?, updated_at = ?, \
             completed_at = ? WHERE id = ?",
        )
        .bind(task.status.as_str())
        .bind(task.retry_count)
        .bind(&task.error)
        .bind(task.updated_at)
        .bind(task.completed_at)
        .bind(&task.id)
        .execute(&self.pool)
        .await
        .map_err(query_err)?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("task {}", task.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl ResultStore for SqliteStore {
    async fn append_result(&self, result: &TrackResult) -> Result<(), StoreError> {
        let context = serde_json::to_string(&result.context)?;
        sqlx::query(
            "INSERT INTO results (id, task_id, job_id, keyword_id, site_id, source, rank, url, \
             title, context, date, success, error, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&result.id)
        .bind(&result.task_id)
        .bind(&result.job_id)
        .bind(result.keyword_id)
        .bind(result.site_id)
        .bind(result.source.as_str())
        .bind(result.rank)
        .bind(&result.url)
        .bind(&result.title)
        .bind(context)
        .bind(result.date)
        .bind(result.success)
        .bind(&result.error)
        .bind(result.created_at)
        .execute(&self.pool)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn results_for_job(&self, job_id: &str) -> Result<Vec<TrackResult>, StoreError> {
        let rows = sqlx::query("SELECT * FROM results WHERE job_id = ? ORDER BY seq")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await
            .map_err(query_err)?;
        rows.iter().map(result_from_row).collect()
    }
}

#[async_trait]
impl PositionStore for SqliteStore {
    async fn create_or_update_today(&self, position: &Position) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO positions \
             (keyword_id, site_id, source, date, rank, url, title, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (keyword_id, site_id, source, date) DO UPDATE SET \
             rank = excluded.rank, url = excluded.url, title = excluded.title, \
             updated_at = excluded.updated_at",
        )
        .bind(position.keyword_id)
        .bind(position.site_id)
        .bind(position.source.as_str())
        .bind(position.date)
        .bind(position.rank)
        .bind(&position.url)
        .bind(&position.title)
        .bind(position.updated_at)
        .execute(&self.pool)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn position(
        &self,
        keyword_id: KeywordId,
        site_id: SiteId,
        source: Source,
        date: NaiveDate,
    ) -> Result<Option<Position>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM positions \
             WHERE keyword_id = ? AND site_id = ? AND source = ? AND date = ?",
        )
        .bind(keyword_id)
        .bind(site_id)
        .bind(source.as_str())
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err)?;
        row.as_ref().map(position_from_row).transpose()
    }

    async fn positions_for_site(
        &self,
        site_id: SiteId,
        source: Source,
        date: NaiveDate,
    ) -> Result<Vec<Position>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM positions \
             WHERE site_id = ? AND source = ? AND date = ? ORDER BY keyword_id",
        )
        .bind(site_id)
        .bind(source.as_str())
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;
        rows.iter().map(position_from_row).collect()
    }
}
