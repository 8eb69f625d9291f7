//! # Domain Layer
//!
//! Pure protocol logic with no I/O: the subscription table consulted by
//! the dispatch path, and the length-delimited wire framing shared by all
//! transports.

pub mod subscription;
pub mod wire;

pub use subscription::{DispatchTarget, SubscriptionTable};
pub use wire::{decode_message, encode_message, WireMessage};

/// Lifecycle of a publisher or subscriber instance.
///
/// Strictly linear: `Created -> Started -> Stopped`. Restart after stop is
/// not supported and fails with `AlreadyStarted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed, socket not yet bound/connected.
    Created,
    /// Socket active, background loops running.
    Started,
    /// Torn down; the instance cannot be reused.
    Stopped,
}
