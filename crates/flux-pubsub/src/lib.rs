//! # Flux PubSub - Topic-Routed Messaging over Sockets
//!
//! Implements the Flux-Bus pub/sub session and topic-routing protocol:
//! a [`Publisher`] binds a TCP port and fans messages out to zero or more
//! topic-filtered subscribers; a [`Subscriber`] connects to a publisher,
//! manages a set of logical subscriptions, and dispatches decoded messages
//! to the caller's callbacks.
//!
//! ## Topology
//!
//! ```text
//! ┌──────────────┐                         ┌──────────────┐
//! │  Publisher   │  publish(env, topic)    │ Subscriber A │──▶ plain cb
//! │  port 14000  │ ───────────────────────▶│  AllTopics   │
//! │              │        TCP fan-out      ├──────────────┤
//! │              │ ───────────────────────▶│ Subscriber B │──▶ topic cb
//! └──────────────┘                         │  "home/"     │
//!                                          └──────────────┘
//! ```
//!
//! Topic filtering happens on the subscriber side: every connected
//! subscriber receives every message, extracts the topic frame, and
//! matches it against its own subscription table.
//!
//! ## Architecture
//!
//! The crate follows the workspace's hexagonal layering:
//! - **Domain Layer:** subscription table and wire framing (pure logic)
//! - **Ports Layer:** narrow transport traits the services consume
//! - **Adapters Layer:** tokio TCP transport (feature `net`) and an
//!   in-process channel transport for deterministic tests
//! - **Services:** [`Publisher`] and [`Subscriber`]
//!
//! ## Security
//!
//! The optional `curve` feature layers public-key peer authentication and
//! per-session encryption under the same routing semantics. Without the
//! feature, every security setter uniformly returns
//! [`BusError::SecurityUnsupported`](flux_types::BusError::SecurityUnsupported).

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod publisher;
pub mod security;
pub mod subscriber;

// Re-export main types
pub use publisher::Publisher;
pub use security::SecurityContext;
pub use subscriber::{PlainCallback, Subscriber, TopicCallback};

// Re-export the shared vocabulary so callers need only this crate.
pub use flux_types::{
    BusError, BusResult, ByteData, ContentEnvelope, ContentType, Endpoint, EventRecord, Topic,
    TopicSelector,
};

/// Maximum messages buffered per subscriber session before backpressure.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Upper bound on a single wire message, guarding the length-prefix reads.
pub const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// Bounded wait applied when joining background receive loops on `stop()`.
pub const TEARDOWN_TIMEOUT_SECS: u64 = 5;
