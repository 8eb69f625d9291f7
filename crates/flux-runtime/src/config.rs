//! Runtime configuration loaded from a TOML file.
//!
//! ```toml
//! [telemetry]
//! log_filter = "info,flux_pubsub=debug"
//! json_logs = false
//!
//! [publisher]
//! port = 14000
//! topics = ["home/status"]
//! heartbeat_secs = 5
//!
//! [subscriber]
//! ip = "127.0.0.1"
//! port = 14000
//! topics = ["home/"]
//! ```
//!
//! Security keys are optional and only honored in builds with the `curve`
//! feature; supplying them otherwise fails at startup rather than being
//! silently ignored.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// The offending path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config file {path}: {reason}")]
    Parse {
        /// The offending path.
        path: String,
        /// Parser error description.
        reason: String,
    },
}

/// Top-level node configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Tracing output settings.
    #[serde(default)]
    pub telemetry: TelemetrySection,
    /// Publisher role, absent to run subscribe-only.
    pub publisher: Option<PublisherSection>,
    /// Subscriber role, absent to run publish-only.
    pub subscriber: Option<SubscriberSection>,
}

/// Tracing output settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySection {
    /// Log level filter (tracing env-filter syntax).
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Emit JSON-formatted log lines.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            json_logs: false,
        }
    }
}

/// Publisher role settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublisherSection {
    /// Port to bind the send socket to (0 for ephemeral).
    pub port: u16,
    /// Topics the heartbeat is fanned out to; empty publishes untyped.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Heartbeat interval in seconds.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Z85 server secret key (requires the `curve` feature).
    pub server_private_key: Option<String>,
}

/// Subscriber role settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriberSection {
    /// Default publisher IP to connect to.
    pub ip: String,
    /// Default publisher port.
    pub port: u16,
    /// Topics to subscribe to; empty activates the all-topics
    /// subscription.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Z85 client secret key (requires the `curve` feature).
    pub client_private_key: Option<String>,
    /// Z85 client public key (requires the `curve` feature).
    pub client_public_key: Option<String>,
    /// Z85 trusted server public key (requires the `curve` feature).
    pub server_public_key: Option<String>,
}

impl RuntimeConfig {
    /// Load and parse a TOML configuration file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] or [`ConfigError::Parse`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_heartbeat_secs() -> u64 {
    5
}
