//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for tracing output.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Log level filter (tracing env-filter syntax).
    pub log_filter: String,

    /// Whether to emit JSON formatted logs (for log shippers).
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// - `FLUX_LOG` (or `RUST_LOG` as fallback): filter, default `info`
    /// - `FLUX_JSON_LOGS`: `1`/`true` to enable JSON output
    #[must_use]
    pub fn from_env() -> Self {
        let log_filter = env::var("FLUX_LOG")
            .or_else(|_| env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string());
        let json_logs = env::var("FLUX_JSON_LOGS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self {
            log_filter,
            json_logs,
        }
    }
}
