//! Structured logging initialization for acquire binaries and tests.
//!
//! Thin wrapper over `tracing-subscriber`: level from `ACQ_LOG` (or a
//! caller default), format selection via `ACQ_LOG_FORMAT`.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Logging output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-friendly output.
    Pretty,
    /// Compact single-line logs.
    Compact,
    /// JSON-formatted logs for machine parsing.
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "compact" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Safe to call more than once; later calls are no-ops so tests can all
/// request logging without coordinating.
pub fn init_logging(default_level: &str) -> Result<()> {
    let level = std::env::var("ACQ_LOG").unwrap_or_else(|_| default_level.to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));
    let format = std::env::var("ACQ_LOG_FORMAT")
        .ok()
        .and_then(|v| LogFormat::parse(&v))
        .unwrap_or(LogFormat::Compact);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = match format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    // Another subscriber already being installed is fine.
    let _ = result;
    Ok(())
}
