//! # Ports Layer
//!
//! Narrow interfaces through which the services consume the concrete
//! socket transport. The transport itself is an external collaborator;
//! adapters provide tokio TCP and in-process implementations.

pub mod transport;

pub use transport::{
    PublisherEvents, PublisherTransport, SubscriberTransport, TransportError,
};
