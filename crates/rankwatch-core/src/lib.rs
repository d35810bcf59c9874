//! # Rankwatch Core
//!
//! Core types for rank tracking:
//! - [`Job`] - One tracking run for a site against a single [`Source`]
//! - [`Task`] - One keyword lookup owned by a job
//! - [`TrackResult`] - Append-only record of a lookup outcome
//! - [`Position`] - Latest daily rank (or frequency) per keyword, site and source
//! - [`IdGenerator`] - Collision-resistant identifiers for jobs, tasks and results

pub mod id;
pub mod job;
pub mod record;
pub mod site;
pub mod source;
pub mod task;

pub use id::{IdGenerator, IdKind, SequentialIdGenerator, UuidIdGenerator};
pub use job::{
    Job, JobFilter, JobId, JobPage, JobStatus, Pagination, RunStatus, TaskOutcome,
    ALL_TASKS_FAILED,
};
pub use record::{Position, TrackResult};
pub use site::{Keyword, KeywordId, Site, SiteId};
pub use source::{Source, UnknownSource};
pub use task::{
    Device, ParamsError, ProviderCredentials, QueryContext, Task, TaskId, TaskStatus,
    TrackingParams, DEFAULT_MAX_RETRIES,
};
