//! Retry backoff policy

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff: attempt `n >= 1` waits `base_delay * 2^(n-1)`.
///
/// Attempt 0 is the first try and never waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(10))
    }
}

impl BackoffPolicy {
    pub fn exponential(base_delay: Duration) -> Self {
        Self { base_delay }
    }

    /// Retries happen back to back
    pub fn none() -> Self {
        Self::exponential(Duration::ZERO)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2_u32.saturating_pow(attempt - 1);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
    }
}
