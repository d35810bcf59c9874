//! Identifier generation

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// What an identifier is minted for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Job,
    Task,
    Result,
}

impl IdKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Job => "job",
            Self::Task => "task",
            Self::Result => "res",
        }
    }
}

/// Source of opaque identifiers for jobs, tasks and results
pub trait IdGenerator: Send + Sync + Debug {
    fn generate(&self, kind: IdKind) -> String;
}

/// Random v4 UUIDs with a kind prefix, e.g. `job_1f0c...`
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn generate(&self, kind: IdKind) -> String {
        format!("{}_{}", kind.prefix(), Uuid::new_v4().simple())
    }
}

/// Predictable `job-1`, `task-2`, ... identifiers (for tests)
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn generate(&self, kind: IdKind) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", kind.prefix(), n)
    }
}
