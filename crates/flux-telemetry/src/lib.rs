//! # Flux Telemetry
//!
//! Tracing and structured-logging bootstrap shared by the Flux-Bus
//! binaries and test harnesses.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use flux_telemetry::{init_tracing, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     init_tracing(&config).expect("failed to init tracing");
//!     // tracing macros are now live
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `FLUX_LOG` | `info` | Log level filter (tracing env-filter syntax) |
//! | `FLUX_JSON_LOGS` | `false` | Emit JSON-formatted log lines |

mod config;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use tracing_setup::init_tracing;

use thiserror::Error;

/// Errors from telemetry initialization.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The log filter directive could not be parsed.
    #[error("invalid log filter {filter:?}: {reason}")]
    InvalidFilter {
        /// The offending filter string.
        filter: String,
        /// Parser error description.
        reason: String,
    },

    /// A global subscriber was already installed.
    #[error("tracing subscriber already initialized")]
    AlreadyInitialized,
}
