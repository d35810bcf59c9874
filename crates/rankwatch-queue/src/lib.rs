//! # Rankwatch Queue
//!
//! Bounded background execution for tracking jobs.
//!
//! Features:
//! - Exponential [`BackoffPolicy`]
//! - [`RetryExecutor`] wrapping any fallible async operation
//! - [`WorkerPool`] running fixed-size batches behind a concurrency ceiling

pub mod backoff;
pub mod retry;
pub mod worker;

pub use backoff::BackoffPolicy;
pub use retry::{RetryError, RetryExecutor};
pub use worker::{BatchHandler, ProcessReport, WorkerConfig, WorkerPool};
