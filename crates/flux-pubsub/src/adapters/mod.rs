//! # Adapters Layer
//!
//! Concrete transport implementations behind the ports:
//!
//! - `tcp` (feature `net`): production tokio TCP transport
//! - `memory`: in-process channel transport for testing without sockets

pub mod memory;

#[cfg(feature = "net")]
pub mod tcp;

pub use memory::{MemoryInjector, MemoryPublisherTransport, MemorySubscriberTransport};

#[cfg(feature = "net")]
pub use tcp::{TcpClientConfig, TcpPublisherTransport, TcpServerConfig, TcpSubscriberTransport};
