//! # Transport Ports
//!
//! The interfaces the publisher and subscriber services **require** from a
//! transport implementation.
//!
//! # Thread Safety
//!
//! Implementations must be `Send + Sync`; the subscriber's transport is
//! moved into the background receive loop, and the publisher's is shared
//! behind the service's state lock.

use async_trait::async_trait;
use bytes::Bytes;
use flux_types::Endpoint;
use thiserror::Error;

/// Errors from transport operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The listener could not be bound.
    #[error("failed to bind port {port}: {reason}")]
    Bind {
        /// Requested port.
        port: u16,
        /// Error description.
        reason: String,
    },

    /// The connection to a remote endpoint failed or timed out.
    #[error("failed to connect to {endpoint}: {reason}")]
    Connect {
        /// Remote endpoint.
        endpoint: String,
        /// Error description.
        reason: String,
    },

    /// Message exceeds the maximum allowed size.
    #[error("message of {len} bytes exceeds the {max} byte limit")]
    MessageTooLarge {
        /// Offending message length.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// The security handshake with the peer failed.
    #[error("security handshake failed: {0}")]
    Handshake(String),

    /// The transport is closed.
    #[error("transport closed")]
    Closed,
}

impl From<TransportError> for flux_types::BusError {
    fn from(err: TransportError) -> Self {
        use flux_types::envelope::DecodeError;
        match err {
            TransportError::Bind { port, reason } => Self::Bind { port, reason },
            TransportError::Connect { endpoint, reason } => Self::Connect { endpoint, reason },
            TransportError::Handshake(reason) => {
                Self::SecurityMisconfigured(format!("handshake failed: {reason}"))
            }
            TransportError::MessageTooLarge { len, max } => Self::Decode(DecodeError::Framing(
                format!("message of {len} bytes exceeds the {max} byte limit"),
            )),
            TransportError::Closed => Self::NotStarted,
        }
    }
}

/// Send-side transport: owns one listening socket and fans every message
/// out to all connected subscriber sessions.
#[async_trait]
pub trait PublisherTransport: Send + Sync {
    /// Bind the listening socket and start accepting sessions.
    ///
    /// Returns the bound port (useful when binding port 0).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Bind`] when the port is unavailable.
    async fn bind(&mut self, port: u16) -> Result<u16, TransportError>;

    /// Enqueue one encoded wire message to every connected session.
    ///
    /// Returns the number of sessions the message was enqueued to; zero
    /// when nobody is connected (the message is dropped, as pub/sub
    /// semantics dictate).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::MessageTooLarge`] for oversized messages.
    fn broadcast(&self, message: Bytes) -> Result<usize, TransportError>;

    /// Number of live subscriber sessions.
    fn session_count(&self) -> usize;

    /// Stop accepting, close all sessions, and release the socket.
    async fn shutdown(&mut self);
}

/// Receive-side transport: one connection to one remote publisher.
#[async_trait]
pub trait SubscriberTransport: Send + Sync {
    /// Connect to the remote endpoint (and run the security handshake in
    /// secured mode).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] or [`TransportError::Handshake`].
    async fn connect(&mut self, endpoint: &Endpoint) -> Result<(), TransportError>;

    /// Receive the next complete wire message.
    ///
    /// Returns `None` once the connection is closed. Messages that fail
    /// session decryption are dropped internally and reception continues.
    async fn recv(&mut self) -> Option<Bytes>;

    /// Close the connection.
    async fn shutdown(&mut self);
}

/// Lifecycle callbacks a publisher owner may register to observe
/// subscriber sessions coming and going.
pub trait PublisherEvents: Send + Sync {
    /// A subscriber session completed its connection (and handshake).
    fn on_session_connected(&self, peer: Endpoint);

    /// A subscriber session disconnected or was torn down.
    fn on_session_disconnected(&self, peer: Endpoint);
}
