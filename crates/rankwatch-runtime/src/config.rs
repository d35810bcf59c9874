//! Tracker configuration
//!
//! Worker pool sizing, retry policy and lookup limits, loaded from the
//! environment with fallbacks to the built-in defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use rankwatch_queue::{BackoffPolicy, RetryExecutor, WorkerConfig};

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnvVar { var: &'static str, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime settings for the tracking engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Batches processed in parallel (env: RANKWATCH_WORKER_COUNT)
    pub worker_count: usize,
    /// Tasks per batch (env: RANKWATCH_BATCH_SIZE)
    pub batch_size: usize,
    /// First retry delay (env: RANKWATCH_RETRY_BASE_DELAY_MS)
    pub retry_base_delay: Duration,
    /// Retries per task after the first attempt (env: RANKWATCH_MAX_RETRIES)
    pub max_retries: u32,
    /// Upper bound for requested result pages (env: RANKWATCH_MAX_PAGES)
    pub max_pages: u32,
    /// Organic results per page (env: RANKWATCH_RESULTS_PER_PAGE)
    pub results_per_page: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            worker_count: 5,
            batch_size: 50,
            retry_base_delay: Duration::from_secs(10),
            max_retries: 5,
            max_pages: 10,
            results_per_page: 10,
        }
    }
}

impl TrackerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            worker_count: env_or("RANKWATCH_WORKER_COUNT", defaults.worker_count)?,
            batch_size: env_or("RANKWATCH_BATCH_SIZE", defaults.batch_size)?,
            retry_base_delay: env_or::<u64>(
                "RANKWATCH_RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay.as_millis() as u64,
            )
            .map(Duration::from_millis)?,
            max_retries: env_or("RANKWATCH_MAX_RETRIES", defaults.max_retries)?,
            max_pages: env_or("RANKWATCH_MAX_PAGES", defaults.max_pages)?,
            results_per_page: env_or("RANKWATCH_RESULTS_PER_PAGE", defaults.results_per_page)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::Invalid("worker_count must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.max_pages == 0 {
            return Err(ConfigError::Invalid("max_pages must be at least 1".into()));
        }
        if self.results_per_page == 0 {
            return Err(ConfigError::Invalid(
                "results_per_page must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            worker_count: self.worker_count,
            batch_size: self.batch_size,
        }
    }

    pub fn retry_executor(&self) -> RetryExecutor {
        RetryExecutor::new(
            self.max_retries,
            BackoffPolicy::exponential(self.retry_base_delay),
        )
    }
}

fn env_or<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnvVar { var, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.worker_count, 5);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.retry_base_delay, Duration::from_secs(10));
        assert_eq!(config.max_retries, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = TrackerConfig {
            worker_count: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_retry_executor_follows_config() {
        let config = TrackerConfig {
            max_retries: 2,
            retry_base_delay: Duration::from_millis(100),
            ..Default::default()
        };
        let retry = config.retry_executor();
        assert_eq!(retry.max_attempts(), 3);
        assert_eq!(retry.backoff().delay(2), Duration::from_millis(200));
    }

    #[test]
    fn test_env_or_parses_and_rejects() {
        // Unique variable names keep this independent of the process environment
        std::env::set_var("RANKWATCH_TEST_ENV_OR_OK", " 7 ");
        std::env::set_var("RANKWATCH_TEST_ENV_OR_BAD", "seven");

        assert_eq!(env_or::<u32>("RANKWATCH_TEST_ENV_OR_OK", 1).unwrap(), 7);
        assert!(matches!(
            env_or::<u32>("RANKWATCH_TEST_ENV_OR_BAD", 1),
            Err(ConfigError::InvalidEnvVar { .. })
        ));
        assert_eq!(env_or::<u32>("RANKWATCH_TEST_ENV_OR_MISSING", 3).unwrap(), 3);
    }
}
