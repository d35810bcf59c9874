//! Tracing subscriber setup

/// Log output configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
    pub with_target: bool,
    pub with_thread_ids: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_filter: "info,rankwatch=debug".to_string(),
            with_target: true,
            with_thread_ids: false,
        }
    }
}

impl TelemetryConfig {
    /// Verbose console output for local runs
    pub fn development() -> Self {
        Self {
            default_filter: "debug".to_string(),
            with_target: true,
            with_thread_ids: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to install tracing subscriber: {0}")]
pub struct TelemetryError(#[from] tracing_subscriber::util::TryInitError);

/// Install the global tracing subscriber.
///
/// Fails when a global subscriber is already set.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(config.with_target)
        .with_level(true)
        .with_thread_ids(config.with_thread_ids)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::debug!(filter = %config.default_filter, "Tracing initialized");
    Ok(())
}
