//! # Error Types
//!
//! The closed error taxonomy for all bus operations.
//!
//! Configuration errors (bad topic, bad key, wrong call order) surface
//! synchronously as a [`BusError`] to the caller. Runtime receive-path
//! errors (decode failures on a live connection) are handled internally:
//! the message is dropped and counted, and nothing propagates into
//! unrelated operations.

use thiserror::Error;

use crate::envelope::DecodeError;

/// Convenience alias for bus operation results.
pub type BusResult<T> = Result<T, BusError>;

/// Errors that can occur in publisher and subscriber operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    /// Malformed or empty topic string, or an invalid topic-list member.
    #[error("invalid topic: {0:?}")]
    InvalidTopic(String),

    /// Operation requires `start()` to have been called first.
    #[error("operation requires a started instance")]
    NotStarted,

    /// Double start, restart after stop, or a security key set after start.
    #[error("instance already started")]
    AlreadyStarted,

    /// The send socket could not be bound to the requested port.
    #[error("failed to bind port {port}: {reason}")]
    Bind { port: u16, reason: String },

    /// The receive socket could not connect to the remote endpoint.
    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    /// Security API invoked but the `curve` capability is not compiled in.
    #[error("security capability not compiled in")]
    SecurityUnsupported,

    /// Security key set in the wrong order, with the wrong role, or with a
    /// malformed encoding.
    #[error("security misconfigured: {0}")]
    SecurityMisconfigured(String),

    /// Malformed content-type tag or payload.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A queried subscription entry does not exist.
    ///
    /// `unsubscribe` of an absent entry is a documented no-op and never
    /// returns this; it is reserved for explicit lookups.
    #[error("no such subscription: {0:?}")]
    NotFound(String),
}
