//! # Rankwatch Persistence
//!
//! Storage for tracking jobs and everything they produce.
//!
//! Supports:
//! - In-memory (for testing and single-process use)
//! - SQLite (feature `sqlite`)

pub mod backend;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use backend::{
    JobStore, KeywordStore, PositionStore, ResultStore, SiteStore, StoreError, TaskStore,
    TrackingStore,
};
pub use memory::{FailurePoint, MemoryStore};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConfig, SqliteStore};
