//! # Flux-Bus Node Runtime Library
//!
//! Configuration loading for the `flux-node` binary, exposed as a library
//! so the test suite can exercise it directly.

pub mod config;

pub use config::{ConfigError, PublisherSection, RuntimeConfig, SubscriberSection};
