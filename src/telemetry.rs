//! Logging configuration.
//!
//! # Basic Logging
//!
//! ```rust,no_run
//! use statelog::telemetry::{init_logging, LogFormat};
//!
//! // Pretty logging for development
//! init_logging(LogFormat::Pretty).expect("failed to init logging");
//!
//! // Or JSON logging for production
//! init_logging(LogFormat::Json).expect("failed to init logging");
//! ```
//!
//! # Environment Variables
//!
//! - `LOG_FORMAT`: set to `json` or `pretty` (default: `pretty`)
//! - `RUST_LOG`: control log levels (default: `info`)

use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::EnvFilter;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable output for development.
    #[default]
    Pretty,
    /// Newline-delimited JSON for log pipelines.
    Json,
}

impl LogFormat {
    /// Read the format from the `LOG_FORMAT` environment variable.
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT").as_deref() {
            Ok("json") | Ok("JSON") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install the global tracing subscriber.
///
/// Respects `RUST_LOG`, defaulting to `info`. Fails if a subscriber is
/// already installed.
pub fn init_logging(format: LogFormat) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_format_is_pretty() {
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }
}
