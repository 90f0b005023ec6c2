//! Logging initialization for the residency streamer.
//!
//! Hosts that already run a subscriber should keep it; this is for
//! binaries and harnesses that want the scheduler's decisions on stderr
//! with no ceremony. Format and filter follow `TEXSTREAM_LOG*` variables,
//! falling back to info-level output scoped to this crate.

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "texstream=info";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured lines.
    Json,
    /// Human-readable output for development.
    #[default]
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Filter directive, e.g. "info" or "texstream=trace".
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl LogConfig {
    /// Build from `TEXSTREAM_LOG` (filter directive) and
    /// `TEXSTREAM_LOG_FORMAT` ("json" or "pretty"). Missing or
    /// unrecognized values fall back to defaults.
    pub fn from_env() -> Self {
        let filter =
            std::env::var("TEXSTREAM_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());
        let format = match std::env::var("TEXSTREAM_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };
        Self { format, filter }
    }
}

/// Errors from logging initialization.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("invalid log filter {filter:?}: {reason}")]
    InvalidFilter { filter: String, reason: String },
    #[error("a global subscriber is already installed")]
    AlreadyInitialized,
}

/// Install a global subscriber for the given configuration. Call once at
/// startup; fails if another subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.filter).map_err(|e| LogError::InvalidFilter {
        filter: config.filter.clone(),
        reason: e.to_string(),
    })?;
    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    }
    .map_err(|_| LogError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_filter_is_rejected() {
        let config = LogConfig {
            filter: "not[a(filter".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            init_logging(&config),
            Err(LogError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn env_fallbacks_scope_to_this_crate() {
        std::env::remove_var("TEXSTREAM_LOG");
        std::env::remove_var("TEXSTREAM_LOG_FORMAT");
        let config = LogConfig::from_env();
        assert_eq!(config.filter, DEFAULT_FILTER);
        assert_eq!(config.format, LogFormat::Pretty);
    }
}
