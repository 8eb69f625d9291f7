//! Tracing subscriber setup.
//!
//! Installs a global `tracing-subscriber` registry with an env-filter and
//! either a human-readable or JSON fmt layer. Intended to be called once
//! at process startup; a second call reports `AlreadyInitialized` instead
//! of panicking so tests can share a process.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Initialize the global tracing subscriber.
///
/// # Errors
///
/// - [`TelemetryError::InvalidFilter`] for an unparsable filter string.
/// - [`TelemetryError::AlreadyInitialized`] when a subscriber exists.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_new(&config.log_filter).map_err(|e| {
        TelemetryError::InvalidFilter {
            filter: config.log_filter.clone(),
            reason: e.to_string(),
        }
    })?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if config.json_logs {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false);
        registry.with(json_layer).try_init()
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
        registry.with(fmt_layer).try_init()
    };
    result.map_err(|_| TelemetryError::AlreadyInitialized)?;

    tracing::debug!(
        filter = %config.log_filter,
        json_logs = config.json_logs,
        "tracing initialized"
    );
    Ok(())
}
