//! # Rankwatch Runtime
//!
//! Tokio-based tracking orchestration: a request for a site becomes a job,
//! the job fans out into one task per keyword, and the tasks are drained by a
//! bounded [`WorkerPool`](rankwatch_queue::WorkerPool) with retries.

pub mod config;
pub mod executor;
pub mod mock;
pub mod notify;
pub mod orchestrator;
pub mod paged;
pub mod provider;
pub mod runner;
pub mod telemetry;

pub use config::{ConfigError, TrackerConfig};
pub use executor::{
    ExecutionError, FrequencyExecutor, Lookup, OrganicExecutor, Providers, SourceExecutor,
    TaskExecutor,
};
pub use mock::{MockClientFactory, MockFrequencyProvider, MockSearchProvider, MockSerpPages};
pub use notify::{
    ChannelSink, JobStatusEvent, LogSink, NoopSink, NotificationSink, NotifyError, SinkEvent,
    TaskStatusEvent,
};
pub use orchestrator::{
    JobOrchestrator, TrackingError, TrackingHandle, TrackingRequest, UNFINISHED_TASK,
};
pub use paged::{absolute_position, PagedSearch, SerpItem, SerpPageSource};
pub use provider::{
    FrequencyProvider, ProviderError, SearchClientFactory, SearchHit, SearchProvider, SearchQuery,
};
pub use runner::TaskRunner;
pub use telemetry::{init_tracing, TelemetryConfig, TelemetryError};
