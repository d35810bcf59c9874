//! Behaviour shared by every store backend

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use rankwatch_core::{
    Job, JobFilter, JobStatus, Pagination, Source, TaskOutcome, ALL_TASKS_FAILED,
};
use rankwatch_persist::{
    JobStore, MemoryStore, SqliteConfig, SqliteStore, StoreError, TrackingStore,
};

fn job(id: &str, site_id: i64, total: u32, minute: i64) -> Job {
    let mut job = Job::new(id.to_string(), site_id, Source::Google, total);
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::minutes(minute);
    job.created_at = at;
    job.updated_at = at;
    job
}

async fn concurrent_outcomes_stay_bounded<S: TrackingStore + 'static>(store: Arc<S>) {
    store.create_job(&job("job-c", 1, 10, 0)).await.unwrap();
    store
        .mark_job_running("job-c", Utc::now())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        let outcome = if i % 4 == 0 {
            TaskOutcome::Failed
        } else {
            TaskOutcome::Completed
        };
        handles.push(tokio::spawn(async move {
            store.record_task_outcome("job-c", outcome).await
        }));
    }

    let mut accepted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(StoreError::Invariant(_)) => rejected += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!(accepted, 10);
    assert_eq!(rejected, 6);

    let stored = store.job("job-c").await.unwrap().unwrap();
    assert_eq!(stored.completed_tasks + stored.failed_tasks, 10);
    assert_eq!(stored.status, JobStatus::Running);

    let finished = store.finalize_job("job-c", Utc::now()).await.unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
    assert!(finished.completed_at.is_some());
}

async fn listing_is_newest_first_and_paged<S: TrackingStore>(store: &S) {
    for (i, site) in [1, 1, 2, 1].iter().enumerate() {
        store
            .create_job(&job(&format!("job-{}", i), *site, 1, i as i64))
            .await
            .unwrap();
    }

    let first = store
        .list_jobs(
            &JobFilter {
                site_id: Some(1),
                status: None,
            },
            Pagination::page(1, 2),
        )
        .await
        .unwrap();
    assert_eq!(first.total, 3);
    let ids: Vec<&str> = first.jobs.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec!["job-3", "job-1"]);

    let second = store
        .list_jobs(
            &JobFilter {
                site_id: Some(1),
                status: None,
            },
            Pagination::page(2, 2),
        )
        .await
        .unwrap();
    assert_eq!(second.jobs.len(), 1);
    assert_eq!(second.jobs[0].id, "job-0");

    let pending = store.jobs_with_status(JobStatus::Pending).await.unwrap();
    assert_eq!(pending.len(), 4);
    assert_eq!(pending[0].id, "job-3");
}

async fn all_failed_job_and_abort<S: TrackingStore>(store: &S) {
    store.create_job(&job("job-f", 1, 2, 0)).await.unwrap();
    store.mark_job_running("job-f", Utc::now()).await.unwrap();
    store
        .record_task_outcome("job-f", TaskOutcome::Failed)
        .await
        .unwrap();
    store
        .record_task_outcome("job-f", TaskOutcome::Failed)
        .await
        .unwrap();
    let failed = store.finalize_job("job-f", Utc::now()).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some(ALL_TASKS_FAILED));

    store.create_job(&job("job-a", 1, 3, 1)).await.unwrap();
    let aborted = store
        .abort_job("job-a", "tasks unavailable", Utc::now())
        .await
        .unwrap();
    assert_eq!(aborted.status, JobStatus::Failed);
    assert_eq!(aborted.error.as_deref(), Some("tasks unavailable"));
    assert_eq!(aborted.failed_tasks, 0);

    assert!(matches!(
        store.finalize_job("job-a", Utc::now()).await,
        Err(StoreError::Invariant(_))
    ));
}

async fn reconciled_counters_drive_the_terminal_status<S: TrackingStore>(store: &S) {
    store.create_job(&job("job-r", 1, 3, 0)).await.unwrap();
    store.mark_job_running("job-r", Utc::now()).await.unwrap();
    store
        .record_task_outcome("job-r", TaskOutcome::Failed)
        .await
        .unwrap();

    assert!(matches!(
        store.reconcile_job("job-r", 2, 2, Utc::now()).await,
        Err(StoreError::Invariant(_))
    ));

    let reconciled = store.reconcile_job("job-r", 0, 3, Utc::now()).await.unwrap();
    assert_eq!(reconciled.finished_tasks(), 3);
    assert_eq!(reconciled.status, JobStatus::Running);

    let failed = store.finalize_job("job-r", Utc::now()).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some(ALL_TASKS_FAILED));

    assert!(matches!(
        store.reconcile_job("job-r", 3, 0, Utc::now()).await,
        Err(StoreError::Invariant(_))
    ));
    assert!(matches!(
        store.reconcile_job("missing", 0, 0, Utc::now()).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_memory_concurrent_outcomes() {
    concurrent_outcomes_stay_bounded(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn test_memory_listing() {
    listing_is_newest_first_and_paged(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_memory_terminal_states() {
    all_failed_job_and_abort(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_memory_reconcile() {
    reconciled_counters_drive_the_terminal_status(&MemoryStore::new()).await;
}

async fn sqlite() -> SqliteStore {
    SqliteStore::connect(SqliteConfig::memory()).await.unwrap()
}

#[tokio::test]
async fn test_sqlite_concurrent_outcomes() {
    concurrent_outcomes_stay_bounded(Arc::new(sqlite().await)).await;
}

#[tokio::test]
async fn test_sqlite_listing() {
    listing_is_newest_first_and_paged(&sqlite().await).await;
}

#[tokio::test]
async fn test_sqlite_terminal_states() {
    all_failed_job_and_abort(&sqlite().await).await;
}

#[tokio::test]
async fn test_sqlite_reconcile() {
    reconciled_counters_drive_the_terminal_status(&sqlite().await).await;
}
