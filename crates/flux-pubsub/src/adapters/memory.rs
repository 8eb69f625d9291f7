//! # In-Process Transport
//!
//! Channel-backed transport implementations for testing the services
//! without network dependencies. All operations succeed but no packets
//! leave the process.

use async_trait::async_trait;
use bytes::Bytes;
use flux_types::Endpoint;
use tokio::sync::{broadcast, mpsc};

use crate::ports::{PublisherTransport, SubscriberTransport, TransportError};
use crate::{DEFAULT_CHANNEL_CAPACITY, MAX_MESSAGE_LEN};

/// Publisher transport backed by a broadcast channel.
pub struct MemoryPublisherTransport {
    bus: broadcast::Sender<Bytes>,
}

impl MemoryPublisherTransport {
    /// Create an unbound in-process publisher transport.
    #[must_use]
    pub fn new() -> Self {
        let (bus, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self { bus }
    }

    /// Create a subscriber transport wired to this publisher.
    #[must_use]
    pub fn attach(&self) -> MemorySubscriberTransport {
        MemorySubscriberTransport {
            source: Some(MemorySource::Broadcast(self.bus.subscribe())),
        }
    }
}

impl Default for MemoryPublisherTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PublisherTransport for MemoryPublisherTransport {
    async fn bind(&mut self, port: u16) -> Result<u16, TransportError> {
        // Ephemeral-port requests get a stable placeholder.
        Ok(if port == 0 { 1 } else { port })
    }

    fn broadcast(&self, message: Bytes) -> Result<usize, TransportError> {
        if message.len() > MAX_MESSAGE_LEN {
            return Err(TransportError::MessageTooLarge {
                len: message.len(),
                max: MAX_MESSAGE_LEN,
            });
        }
        Ok(self.bus.send(message).unwrap_or(0))
    }

    fn session_count(&self) -> usize {
        self.bus.receiver_count()
    }

    async fn shutdown(&mut self) {}
}

enum MemorySource {
    Broadcast(broadcast::Receiver<Bytes>),
    Queue(mpsc::UnboundedReceiver<Bytes>),
}

/// Subscriber transport fed either by a [`MemoryPublisherTransport`] or by
/// a test's [`MemoryInjector`].
pub struct MemorySubscriberTransport {
    source: Option<MemorySource>,
}

impl MemorySubscriberTransport {
    /// Create a transport plus an injector handle that pushes raw wire
    /// messages into it, for driving dispatch tests deterministically.
    #[must_use]
    pub fn pair() -> (MemoryInjector, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            MemoryInjector { tx },
            Self {
                source: Some(MemorySource::Queue(rx)),
            },
        )
    }
}

#[async_trait]
impl SubscriberTransport for MemorySubscriberTransport {
    async fn connect(&mut self, _endpoint: &Endpoint) -> Result<(), TransportError> {
        if self.source.is_none() {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<Bytes> {
        loop {
            match self.source.as_mut()? {
                MemorySource::Broadcast(rx) => match rx.recv().await {
                    Ok(message) => return Some(message),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
                MemorySource::Queue(rx) => return rx.recv().await,
            }
        }
    }

    async fn shutdown(&mut self) {
        self.source = None;
    }
}

/// Test handle feeding raw wire messages into a paired subscriber
/// transport.
#[derive(Clone)]
pub struct MemoryInjector {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl MemoryInjector {
    /// Push one raw wire message. Returns `false` once the transport is
    /// gone.
    pub fn inject(&self, message: impl Into<Bytes>) -> bool {
        self.tx.send(message.into()).is_ok()
    }
}
