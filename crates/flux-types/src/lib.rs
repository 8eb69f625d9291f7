//! # Flux Types Crate
//!
//! This crate contains the shared vocabulary of the Flux-Bus messaging
//! layer: topic strings and their matching rules, the tagged content
//! envelope, remote endpoints, security key material, and the closed
//! error taxonomy.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All types shared between the publisher
//!   and subscriber sides are defined here.
//! - **Closed Error Set**: Every expected failure mode maps to exactly one
//!   [`BusError`] variant; callers never see an unchecked crash for an
//!   expected failure.
//! - **Validation at the Boundary**: Topics and key material are validated
//!   when constructed, so downstream code only ever sees well-formed values.

pub mod endpoint;
pub mod envelope;
pub mod errors;
pub mod security;
pub mod topic;

pub use endpoint::Endpoint;
pub use envelope::{ByteData, ContentEnvelope, ContentType, DecodeError, EventRecord};
pub use errors::{BusError, BusResult};
pub use security::{KeyMaterial, SecretKeyMaterial, KEY_ENCODED_LEN, KEY_RAW_LEN};
pub use topic::{topic_matches, Topic, TopicSelector};
