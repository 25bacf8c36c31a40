//! Subscriber setup for test binaries.
//!
//! The engine itself only emits `tracing` events. Test suites call
//! [`init_logging`] once (repeated calls are harmless) to see resolution,
//! tier and poll diagnostics on stderr. The filter comes from `HOLDFAST_LOG`,
//! then `RUST_LOG`, then the supplied default directive.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Environment variable consulted before `RUST_LOG`
pub const LOG_ENV: &str = "HOLDFAST_LOG";

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event, for CI log collectors
    Json,
}

/// Build the filter from the environment, falling back to `default_directive`
#[must_use]
pub fn env_filter(default_directive: &str) -> EnvFilter {
    std::env::var(LOG_ENV)
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive))
}

/// Install a stderr subscriber. Returns `false` if one was already set.
pub fn init_logging(default_directive: &str) -> bool {
    init_logging_with(default_directive, LogFormat::Pretty)
}

/// Install a stderr subscriber with an explicit format
pub fn init_logging_with(default_directive: &str, format: LogFormat) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .with_writer(std::io::stderr)
        .with_target(false);
    match format {
        LogFormat::Pretty => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let _ = init_logging("holdfast=debug");
        assert!(!init_logging("holdfast=debug"));
    }

    #[test]
    fn test_format_from_yaml() {
        let format: LogFormat = serde_yaml_ng::from_str("json").unwrap_or_default();
        assert_eq!(format, LogFormat::Json);
    }
}
