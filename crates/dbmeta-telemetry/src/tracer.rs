//! Subscriber setup

use crate::attributes::SERVICE_NAME;
use dbmeta_core::{Error, LogFormat, LoggingConfig, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "info";

/// Filter directives from `RUST_LOG`, falling back to [`DEFAULT_FILTER`]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber.
///
/// Everything is written to stderr; stdout belongs to the stdio transport.
/// Fails if a global subscriber is already installed.
///
/// # Example
///
/// ```rust,no_run
/// use dbmeta_core::LoggingConfig;
/// use dbmeta_telemetry::init_telemetry;
///
/// init_telemetry(&LoggingConfig::default()).unwrap();
/// ```
pub fn init_telemetry(config: &LoggingConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter());

    let installed = match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(false)
                    .with_line_number(true),
            )
            .try_init(),
    };

    installed.map_err(|e| Error::message(format!("failed to install tracing subscriber: {}", e)))?;

    tracing::debug!(service = SERVICE_NAME, format = ?config.format, "Telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig::default();
        let _ = init_telemetry(&config);
        assert!(init_telemetry(&config).is_err());
    }
}
