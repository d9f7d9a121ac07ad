//! Logging init: `tracing` subscriber writing to stderr as text or JSON lines.

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Build the level filter. `RUST_LOG` wins over the configured directive.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| Error::Config {
        message: format!("invalid log filter '{}': {e}", config.level),
        key: Some("logging.level".to_string()),
    })
}

/// Install the global subscriber.
///
/// Fails if the configured filter is invalid or a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let installed = match config.format {
        LogFormat::Text => builder.with_ansi(false).try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };

    installed.map_err(|e| Error::Other(format!("failed to install log subscriber: {e}")))?;

    tracing::debug!(level = %config.level, format = ?config.format, "logging initialized");
    Ok(())
}
