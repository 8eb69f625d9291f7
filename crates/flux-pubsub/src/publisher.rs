//! # Publisher
//!
//! The send side of the bus: owns one listening socket bound to a port and
//! fans messages out to every connected subscriber session, optionally
//! tagged with a topic or a topic set.
//!
//! ## Lifecycle
//!
//! `Created -> Started -> Stopped`, strictly linear. `start()` binds the
//! socket; `stop()` tears it down; a stopped publisher cannot be
//! restarted. Security keys must be configured before `start()`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::{debug, info};

use flux_types::{BusError, BusResult, ContentEnvelope, TopicSelector};

use crate::domain::{encode_message, Lifecycle};
use crate::ports::{PublisherEvents, PublisherTransport};
use crate::security::SecurityContext;
use crate::MAX_MESSAGE_LEN;

#[cfg(feature = "net")]
use crate::adapters::tcp::{TcpPublisherTransport, TcpServerConfig};

struct Inner {
    state: Lifecycle,
    security: SecurityContext,
    transport: Option<Box<dyn PublisherTransport>>,
    bound_port: Option<u16>,
    events: Option<Arc<dyn PublisherEvents>>,
}

/// The send side of the bus.
///
/// All methods take `&self`; internal state is guarded so that `publish`
/// may run concurrently with publishes on other instances, while
/// `start`/`stop` are serialized against everything on this instance.
pub struct Publisher {
    port: u16,
    inner: RwLock<Inner>,
    published: AtomicU64,
    send_errors: AtomicU64,
}

impl Publisher {
    /// Create a publisher for the given port. Port 0 requests an ephemeral
    /// port, reported by [`Publisher::local_port`] after `start()`.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self::build(port, None, None)
    }

    /// Create a publisher with session lifecycle callbacks.
    #[must_use]
    pub fn with_events(port: u16, events: Arc<dyn PublisherEvents>) -> Self {
        Self::build(port, Some(events), None)
    }

    /// Create a publisher over an injected transport (testing).
    ///
    /// Injected transports manage their own security; the context setters
    /// still validate and store keys but the transport decides what to do
    /// with them.
    #[must_use]
    pub fn with_transport(port: u16, transport: Box<dyn PublisherTransport>) -> Self {
        Self::build(port, None, Some(transport))
    }

    fn build(
        port: u16,
        events: Option<Arc<dyn PublisherEvents>>,
        transport: Option<Box<dyn PublisherTransport>>,
    ) -> Self {
        Self {
            port,
            inner: RwLock::new(Inner {
                state: Lifecycle::Created,
                security: SecurityContext::new(),
                transport,
                bound_port: None,
                events,
            }),
            published: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
        }
    }

    /// Configure the publisher identity secret key (Z85, 40 characters).
    ///
    /// # Errors
    ///
    /// - [`BusError::AlreadyStarted`] once `start()` has run; the active
    ///   security state is left untouched.
    /// - [`BusError::SecurityUnsupported`] without the `curve` feature.
    /// - [`BusError::SecurityMisconfigured`] for malformed keys.
    pub async fn set_server_private_key(&self, private_key: &str) -> BusResult<()> {
        let mut inner = self.inner.write().await;
        if inner.state != Lifecycle::Created {
            return Err(BusError::AlreadyStarted);
        }
        inner.security.set_server_private_key(private_key)
    }

    /// Bind the send socket and start accepting subscriber sessions.
    ///
    /// # Errors
    ///
    /// - [`BusError::AlreadyStarted`] on double start or restart after stop.
    /// - [`BusError::Bind`] when the port is in use or privileges are
    ///   insufficient.
    pub async fn start(&self) -> BusResult<()> {
        let mut inner = self.inner.write().await;
        if inner.state != Lifecycle::Created {
            return Err(BusError::AlreadyStarted);
        }

        if inner.transport.is_none() {
            #[cfg(feature = "net")]
            {
                let config = TcpServerConfig {
                    security: inner.security.server_link(),
                    events: inner.events.clone(),
                    ..Default::default()
                };
                inner.transport = Some(Box::new(TcpPublisherTransport::new(config)));
            }
            #[cfg(not(feature = "net"))]
            {
                return Err(BusError::Bind {
                    port: self.port,
                    reason: "no transport available: enable the `net` feature or inject one"
                        .to_string(),
                });
            }
        }

        let transport = inner.transport.as_mut().expect("transport present");
        let bound = transport.bind(self.port).await.map_err(BusError::from)?;
        inner.bound_port = Some(bound);
        inner.state = Lifecycle::Started;
        info!(port = bound, secured = inner.security.is_secured_server(), "publisher started");
        Ok(())
    }

    /// Publish without a topic frame: delivered to all-topics
    /// subscriptions only.
    ///
    /// Returns the number of subscriber sessions the message was enqueued
    /// to; zero sessions is not an error.
    ///
    /// # Errors
    ///
    /// [`BusError::NotStarted`] before `start()` or after `stop()`.
    pub async fn publish(&self, envelope: &ContentEnvelope) -> BusResult<usize> {
        self.publish_to(envelope, &TopicSelector::None).await
    }

    /// Publish with a single topic frame.
    ///
    /// # Errors
    ///
    /// [`BusError::InvalidTopic`] or [`BusError::NotStarted`].
    pub async fn publish_topic(&self, envelope: &ContentEnvelope, topic: &str) -> BusResult<usize> {
        let selector = TopicSelector::from_strings(&[topic])?;
        self.publish_to(envelope, &selector).await
    }

    /// Publish the same envelope once per topic in the set.
    ///
    /// Validation and encoding are atomic from the caller's perspective:
    /// if any member is invalid or any encoded message oversized, the call
    /// fails before anything is sent.
    ///
    /// # Errors
    ///
    /// [`BusError::InvalidTopic`] or [`BusError::NotStarted`].
    pub async fn publish_topics(
        &self,
        envelope: &ContentEnvelope,
        topics: &[&str],
    ) -> BusResult<usize> {
        let selector = TopicSelector::from_strings(topics)?;
        self.publish_to(envelope, &selector).await
    }

    /// Publish with an already-resolved topic selector.
    ///
    /// # Errors
    ///
    /// [`BusError::NotStarted`] before `start()` or after `stop()`.
    pub async fn publish_to(
        &self,
        envelope: &ContentEnvelope,
        selector: &TopicSelector,
    ) -> BusResult<usize> {
        let inner = self.inner.read().await;
        if inner.state != Lifecycle::Started {
            return Err(BusError::NotStarted);
        }
        let transport = inner.transport.as_ref().ok_or(BusError::NotStarted)?;

        let payload = envelope.encode();
        let messages: Vec<Bytes> = match selector {
            TopicSelector::None => vec![encode_message(None, &payload)],
            TopicSelector::One(topic) => vec![encode_message(Some(topic), &payload)],
            TopicSelector::Many(topics) => topics
                .iter()
                .map(|topic| encode_message(Some(topic), &payload))
                .collect(),
        };
        // Fan-out atomicity: every message checked before any is enqueued.
        for message in &messages {
            if message.len() > MAX_MESSAGE_LEN {
                return Err(BusError::Decode(flux_types::envelope::DecodeError::Framing(
                    format!(
                        "message of {} bytes exceeds the {MAX_MESSAGE_LEN} byte limit",
                        message.len()
                    ),
                )));
            }
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        let mut reached = 0;
        for message in messages {
            reached = reached.max(transport.broadcast(message).map_err(BusError::from)?);
        }
        if reached == 0 {
            self.send_errors.fetch_add(1, Ordering::Relaxed);
            debug!("message dropped: no subscriber sessions");
        }
        Ok(reached)
    }

    /// The bound port, valid only while started.
    ///
    /// # Errors
    ///
    /// [`BusError::NotStarted`] before `start()` or after `stop()`.
    pub async fn local_port(&self) -> BusResult<u16> {
        let inner = self.inner.read().await;
        if inner.state != Lifecycle::Started {
            return Err(BusError::NotStarted);
        }
        Ok(inner.bound_port.expect("bound while started"))
    }

    /// Close the socket and all subscriber sessions.
    ///
    /// Subsequent `publish` calls fail with [`BusError::NotStarted`].
    ///
    /// # Errors
    ///
    /// [`BusError::NotStarted`] when not currently started.
    pub async fn stop(&self) -> BusResult<()> {
        let mut inner = self.inner.write().await;
        if inner.state != Lifecycle::Started {
            return Err(BusError::NotStarted);
        }
        if let Some(transport) = inner.transport.as_mut() {
            transport.shutdown().await;
        }
        inner.state = Lifecycle::Stopped;
        info!("publisher stopped");
        Ok(())
    }

    /// Number of live subscriber sessions.
    pub async fn session_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.transport.as_ref().map_or(0, |t| t.session_count())
    }

    /// Total `publish` calls attempted on a started publisher.
    #[must_use]
    pub fn messages_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Publishes that reached zero subscriber sessions.
    #[must_use]
    pub fn send_error_count(&self) -> u64 {
        self.send_errors.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryPublisherTransport;
    use crate::ports::SubscriberTransport;
    use flux_types::{ByteData, EventRecord};

    fn envelope() -> ContentEnvelope {
        ContentEnvelope::Bytes(ByteData::new(b"payload".to_vec()))
    }

    #[tokio::test]
    async fn test_publish_before_start_fails() {
        let publisher = Publisher::new(0);
        assert_eq!(
            publisher.publish(&envelope()).await,
            Err(BusError::NotStarted)
        );
        assert_eq!(publisher.local_port().await, Err(BusError::NotStarted));
    }

    #[tokio::test]
    async fn test_double_start_fails() {
        let publisher =
            Publisher::with_transport(7000, Box::new(MemoryPublisherTransport::new()));
        publisher.start().await.unwrap();
        assert_eq!(publisher.start().await, Err(BusError::AlreadyStarted));
    }

    #[tokio::test]
    async fn test_local_port_reports_bound_port() {
        let publisher =
            Publisher::with_transport(7123, Box::new(MemoryPublisherTransport::new()));
        publisher.start().await.unwrap();
        assert_eq!(publisher.local_port().await.unwrap(), 7123);
    }

    #[tokio::test]
    async fn test_stop_then_publish_fails() {
        let publisher =
            Publisher::with_transport(7000, Box::new(MemoryPublisherTransport::new()));
        publisher.start().await.unwrap();
        publisher.stop().await.unwrap();
        assert_eq!(
            publisher.publish(&envelope()).await,
            Err(BusError::NotStarted)
        );
        // Restart is a hard error.
        assert_eq!(publisher.start().await, Err(BusError::AlreadyStarted));
    }

    #[tokio::test]
    async fn test_publish_counts_and_zero_session_drop() {
        let publisher =
            Publisher::with_transport(7000, Box::new(MemoryPublisherTransport::new()));
        publisher.start().await.unwrap();
        assert_eq!(publisher.publish(&envelope()).await.unwrap(), 0);
        assert_eq!(publisher.messages_published(), 1);
        assert_eq!(publisher.send_error_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_topic_fails_atomically() {
        let transport = MemoryPublisherTransport::new();
        let mut session = transport.attach();
        let publisher = Publisher::with_transport(7000, Box::new(transport));
        publisher.start().await.unwrap();

        let err = publisher
            .publish_topics(&envelope(), &["good/", "bad topic"])
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::InvalidTopic(_)));
        // Nothing was enqueued for the valid member either.
        assert_eq!(publisher.messages_published(), 0);
        tokio::select! {
            biased;
            _ = session.recv() => panic!("partial fan-out leaked a message"),
            _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {}
        }
    }

    #[tokio::test]
    async fn test_topic_fan_out_sends_one_message_per_topic() {
        let transport = MemoryPublisherTransport::new();
        let mut session = transport.attach();
        let publisher = Publisher::with_transport(7000, Box::new(transport));
        publisher.start().await.unwrap();

        let reached = publisher
            .publish_topics(&envelope(), &["home/", "office/"])
            .await
            .unwrap();
        assert_eq!(reached, 1);

        let first = session.recv().await.unwrap();
        let second = session.recv().await.unwrap();
        let first = crate::domain::decode_message(&first).unwrap();
        let second = crate::domain::decode_message(&second).unwrap();
        assert_eq!(first.topic.as_deref(), Some("home/"));
        assert_eq!(second.topic.as_deref(), Some("office/"));
        assert_eq!(first.payload, second.payload);
    }

    #[tokio::test]
    async fn test_untyped_publish_has_no_topic_frame() {
        let transport = MemoryPublisherTransport::new();
        let mut session = transport.attach();
        let publisher = Publisher::with_transport(7000, Box::new(transport));
        publisher.start().await.unwrap();

        let event = ContentEnvelope::Event(EventRecord::new("ping", serde_json::json!({})));
        publisher.publish(&event).await.unwrap();
        let raw = session.recv().await.unwrap();
        let message = crate::domain::decode_message(&raw).unwrap();
        assert_eq!(message.topic, None);
        assert_eq!(ContentEnvelope::decode(&message.payload).unwrap(), event);
    }

    #[cfg(not(feature = "curve"))]
    #[tokio::test]
    async fn test_security_unsupported_without_capability() {
        let publisher = Publisher::new(0);
        assert_eq!(
            publisher.set_server_private_key("irrelevant").await,
            Err(BusError::SecurityUnsupported)
        );
    }

    #[cfg(feature = "curve")]
    #[tokio::test]
    async fn test_set_key_after_start_fails_and_preserves_state() {
        let (secret, _public) = crate::security::generate_keypair();
        let publisher =
            Publisher::with_transport(7000, Box::new(MemoryPublisherTransport::new()));
        publisher.start().await.unwrap();

        assert_eq!(
            publisher.set_server_private_key(&secret).await,
            Err(BusError::AlreadyStarted)
        );
        // The unsecured state was not altered.
        let inner = publisher.inner.read().await;
        assert!(!inner.security.is_secured_server());
    }
}
