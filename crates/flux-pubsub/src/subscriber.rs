//! # Subscriber
//!
//! The receive side of the bus: one connection to a default publisher
//! endpoint, optional direct connections to additional publishers, a set
//! of active subscriptions, and two caller-supplied callbacks.
//!
//! ## Dispatch
//!
//! A background receive loop extracts each message's topic frame and
//! consults the subscription table: the plain callback fires for an
//! all-topics match, the topic-aware callback fires once per matching
//! topic subscription with the **subscribed** topic. The table's read lock
//! is held across callback invocation, so a subscription removed before a
//! message's arrival is never delivered to, and one added before arrival
//! never misses it.
//!
//! Callbacks run on the receive loop and must not invoke subscription
//! operations on the same instance.
//!
//! ## Lifecycle
//!
//! `Created -> Started -> Stopped`, strictly linear. Subscriptions may be
//! registered before `start()`; `stop()` tears down every connection,
//! clears the table, and joins the receive loops within a bounded wait.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Duration;

use tokio::sync::{watch, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use flux_types::{BusError, BusResult, ContentEnvelope, Endpoint, Topic};

use crate::domain::{decode_message, DispatchTarget, Lifecycle, SubscriptionTable};
use crate::ports::SubscriberTransport;
use crate::security::SecurityContext;
use crate::TEARDOWN_TIMEOUT_SECS;

#[cfg(feature = "net")]
use crate::adapters::tcp::{TcpClientConfig, TcpSubscriberTransport};

/// Callback for untyped deliveries (all-topics subscription matches).
pub type PlainCallback = Arc<dyn Fn(ContentEnvelope) + Send + Sync>;

/// Callback for topic deliveries; receives the subscribed topic, which is
/// not necessarily the exact topic on the wire.
pub type TopicCallback = Arc<dyn Fn(&Topic, ContentEnvelope) + Send + Sync>;

struct Callbacks {
    plain: PlainCallback,
    topical: TopicCallback,
}

struct Inner {
    security: SecurityContext,
    shutdown_tx: Option<watch::Sender<bool>>,
    loops: Vec<JoinHandle<()>>,
    injected: Option<Box<dyn SubscriberTransport>>,
}

/// The receive side of the bus.
pub struct Subscriber {
    target: Endpoint,
    callbacks: Arc<Callbacks>,
    table: Arc<StdRwLock<SubscriptionTable>>,
    /// Lifecycle mirror for the synchronous subscription operations.
    state: StdMutex<Lifecycle>,
    /// Serializes start/stop/security/endpoint-subscribe bodies.
    inner: TokioMutex<Inner>,
    decode_errors: Arc<AtomicU64>,
}

impl Subscriber {
    /// Create a subscriber targeting a default publisher endpoint.
    #[must_use]
    pub fn new(target: Endpoint, on_message: PlainCallback, on_topic_message: TopicCallback) -> Self {
        Self::build(target, on_message, on_topic_message, None)
    }

    /// Create a subscriber over an injected default-connection transport
    /// (testing). Injected transports manage their own security.
    #[must_use]
    pub fn with_transport(
        target: Endpoint,
        transport: Box<dyn SubscriberTransport>,
        on_message: PlainCallback,
        on_topic_message: TopicCallback,
    ) -> Self {
        Self::build(target, on_message, on_topic_message, Some(transport))
    }

    fn build(
        target: Endpoint,
        plain: PlainCallback,
        topical: TopicCallback,
        injected: Option<Box<dyn SubscriberTransport>>,
    ) -> Self {
        Self {
            target,
            callbacks: Arc::new(Callbacks { plain, topical }),
            table: Arc::new(StdRwLock::new(SubscriptionTable::new())),
            state: StdMutex::new(Lifecycle::Created),
            inner: TokioMutex::new(Inner {
                security: SecurityContext::new(),
                shutdown_tx: None,
                loops: Vec::new(),
                injected,
            }),
            decode_errors: Arc::new(AtomicU64::new(0)),
        }
    }

    /// IP of the default connection target, valid from construction.
    #[must_use]
    pub fn ip(&self) -> IpAddr {
        self.target.ip
    }

    /// Port of the default connection target, valid from construction.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.target.port
    }

    /// Configure the subscriber identity key pair (Z85, 40 characters).
    ///
    /// # Errors
    ///
    /// - [`BusError::AlreadyStarted`] once `start()` has run; the active
    ///   security state is left untouched.
    /// - [`BusError::SecurityUnsupported`] without the `curve` feature.
    /// - [`BusError::SecurityMisconfigured`] for malformed keys.
    pub async fn set_client_keys(&self, private_key: &str, public_key: &str) -> BusResult<()> {
        let mut inner = self.inner.lock().await;
        if self.current_state() != Lifecycle::Created {
            return Err(BusError::AlreadyStarted);
        }
        inner.security.set_client_keys(private_key, public_key)
    }

    /// Configure the trusted public key of the remote publisher.
    ///
    /// Must precede any call that creates a direct connection in secured
    /// mode; a violation is caught at that subscribe (or `start()`) as
    /// [`BusError::SecurityMisconfigured`], never silently ignored.
    ///
    /// # Errors
    ///
    /// - [`BusError::AlreadyStarted`] after `stop()`.
    /// - [`BusError::SecurityUnsupported`] without the `curve` feature.
    /// - [`BusError::SecurityMisconfigured`] for malformed keys.
    pub async fn set_server_public_key(&self, public_key: &str) -> BusResult<()> {
        let mut inner = self.inner.lock().await;
        if self.current_state() == Lifecycle::Stopped {
            return Err(BusError::AlreadyStarted);
        }
        inner.security.set_server_public_key(public_key)
    }

    /// Connect the receive socket to the default target and start the
    /// background receive loop.
    ///
    /// # Errors
    ///
    /// - [`BusError::AlreadyStarted`] on double start or restart.
    /// - [`BusError::SecurityMisconfigured`] in secured mode without a
    ///   trusted server key.
    /// - [`BusError::Connect`] on transport failure.
    pub async fn start(&self) -> BusResult<()> {
        let mut inner = self.inner.lock().await;
        if self.current_state() != Lifecycle::Created {
            return Err(BusError::AlreadyStarted);
        }

        let injected = inner.injected.take();
        let mut transport: Box<dyn SubscriberTransport> = match injected {
            Some(transport) => transport,
            None => self.build_net_transport(&inner.security)?,
        };
        transport
            .connect(&self.target)
            .await
            .map_err(BusError::from)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        inner.loops.push(tokio::spawn(run_receive_loop(
            transport,
            Arc::clone(&self.table),
            Arc::clone(&self.callbacks),
            Arc::clone(&self.decode_errors),
            shutdown_rx,
        )));
        inner.shutdown_tx = Some(shutdown_tx);
        self.set_state(Lifecycle::Started);
        debug!(target = %self.target, "subscriber started");
        Ok(())
    }

    /// Activate the all-topics subscription: every inbound message
    /// triggers the plain callback.
    ///
    /// # Errors
    ///
    /// [`BusError::NotStarted`] after `stop()`.
    pub fn subscribe(&self) -> BusResult<()> {
        self.check_not_stopped()?;
        self.table.write().expect("table lock").insert_all();
        Ok(())
    }

    /// Activate a single-topic subscription. The topic is auto-normalized
    /// with a trailing `/` when missing.
    ///
    /// # Errors
    ///
    /// [`BusError::InvalidTopic`] or [`BusError::NotStarted`].
    pub fn subscribe_topic(&self, topic: &str) -> BusResult<()> {
        let topic = Topic::new(topic)?;
        self.check_not_stopped()?;
        self.table.write().expect("table lock").insert_topic(topic);
        Ok(())
    }

    /// Activate one subscription per topic in the list, atomically: if any
    /// member is invalid, no subscription state changes.
    ///
    /// # Errors
    ///
    /// [`BusError::InvalidTopic`] or [`BusError::NotStarted`].
    pub fn subscribe_topics(&self, topics: &[&str]) -> BusResult<()> {
        let validated = topics
            .iter()
            .map(|raw| Topic::new(raw))
            .collect::<BusResult<Vec<_>>>()?;
        self.check_not_stopped()?;
        let mut table = self.table.write().expect("table lock");
        for topic in validated {
            table.insert_topic(topic);
        }
        Ok(())
    }

    /// Open an additional direct connection to a specific remote publisher
    /// for one topic, independent of the default connection.
    ///
    /// In secured mode [`Subscriber::set_server_public_key`] must have
    /// been called first.
    ///
    /// # Errors
    ///
    /// - [`BusError::InvalidTopic`] for a malformed topic.
    /// - [`BusError::NotStarted`] unless currently started.
    /// - [`BusError::SecurityMisconfigured`] in secured mode without a
    ///   trusted server key.
    /// - [`BusError::Connect`] on transport failure.
    pub async fn subscribe_endpoint(&self, endpoint: Endpoint, topic: &str) -> BusResult<()> {
        let topic = Topic::new(topic)?;
        let mut inner = self.inner.lock().await;
        if self.current_state() != Lifecycle::Started {
            return Err(BusError::NotStarted);
        }

        let mut transport = self.build_net_transport(&inner.security)?;
        transport.connect(&endpoint).await.map_err(BusError::from)?;

        let shutdown_rx = inner
            .shutdown_tx
            .as_ref()
            .expect("shutdown channel exists while started")
            .subscribe();
        // Register before pumping so the first message already dispatches.
        self.table
            .write()
            .expect("table lock")
            .insert_remote(topic, endpoint);
        inner.loops.push(tokio::spawn(run_receive_loop(
            transport,
            Arc::clone(&self.table),
            Arc::clone(&self.callbacks),
            Arc::clone(&self.decode_errors),
            shutdown_rx,
        )));
        debug!(endpoint = %endpoint, "direct subscription connected");
        Ok(())
    }

    /// Deactivate the all-topics subscription. Removing it when absent is
    /// a no-op, not an error.
    ///
    /// # Errors
    ///
    /// [`BusError::NotStarted`] after `stop()`.
    pub fn unsubscribe(&self) -> BusResult<()> {
        self.check_not_stopped()?;
        self.table.write().expect("table lock").remove_all();
        Ok(())
    }

    /// Deactivate a topic subscription. Removing an absent entry is a
    /// no-op, not an error.
    ///
    /// # Errors
    ///
    /// [`BusError::InvalidTopic`] or [`BusError::NotStarted`].
    pub fn unsubscribe_topic(&self, topic: &str) -> BusResult<()> {
        let topic = Topic::new(topic)?;
        self.check_not_stopped()?;
        self.table.write().expect("table lock").remove_topic(&topic);
        Ok(())
    }

    /// Deactivate one subscription per topic in the list, atomically
    /// validated. Absent entries are skipped silently.
    ///
    /// # Errors
    ///
    /// [`BusError::InvalidTopic`] or [`BusError::NotStarted`].
    pub fn unsubscribe_topics(&self, topics: &[&str]) -> BusResult<()> {
        let validated = topics
            .iter()
            .map(|raw| Topic::new(raw))
            .collect::<BusResult<Vec<_>>>()?;
        self.check_not_stopped()?;
        let mut table = self.table.write().expect("table lock");
        for topic in &validated {
            table.remove_topic(topic);
        }
        Ok(())
    }

    /// Tear down all connections (default and per-endpoint), clear every
    /// subscription, and join the receive loops within a bounded wait.
    ///
    /// # Errors
    ///
    /// [`BusError::NotStarted`] unless currently started.
    pub async fn stop(&self) -> BusResult<()> {
        let mut inner = self.inner.lock().await;
        if self.current_state() != Lifecycle::Started {
            return Err(BusError::NotStarted);
        }

        if let Some(shutdown_tx) = inner.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        for handle in inner.loops.drain(..) {
            if tokio::time::timeout(Duration::from_secs(TEARDOWN_TIMEOUT_SECS), handle)
                .await
                .is_err()
            {
                warn!("receive loop exceeded the teardown bound; detaching");
            }
        }
        self.table.write().expect("table lock").clear();
        self.set_state(Lifecycle::Stopped);
        debug!(target = %self.target, "subscriber stopped");
        Ok(())
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.table.read().expect("table lock").len()
    }

    /// Messages dropped because their frames or payload failed decoding.
    #[must_use]
    pub fn decode_error_count(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    fn build_net_transport(
        &self,
        security: &SecurityContext,
    ) -> BusResult<Box<dyn SubscriberTransport>> {
        #[cfg(feature = "net")]
        {
            let config = TcpClientConfig {
                security: security.client_link()?,
                ..Default::default()
            };
            Ok(Box::new(TcpSubscriberTransport::new(config)))
        }
        #[cfg(not(feature = "net"))]
        {
            let _ = security;
            Err(BusError::Connect {
                endpoint: self.target.to_string(),
                reason: "no transport available: enable the `net` feature or inject one"
                    .to_string(),
            })
        }
    }

    fn current_state(&self) -> Lifecycle {
        *self.state.lock().expect("state lock")
    }

    fn set_state(&self, state: Lifecycle) {
        *self.state.lock().expect("state lock") = state;
    }

    fn check_not_stopped(&self) -> BusResult<()> {
        if self.current_state() == Lifecycle::Stopped {
            return Err(BusError::NotStarted);
        }
        Ok(())
    }
}

/// Pump one transport until shutdown or remote close, dispatching each
/// message against the shared subscription table.
async fn run_receive_loop(
    mut transport: Box<dyn SubscriberTransport>,
    table: Arc<StdRwLock<SubscriptionTable>>,
    callbacks: Arc<Callbacks>,
    decode_errors: Arc<AtomicU64>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                transport.shutdown().await;
                break;
            }
            received = transport.recv() => match received {
                Some(raw) => dispatch_message(&raw, &table, &callbacks, &decode_errors),
                None => {
                    debug!("connection closed by remote");
                    break;
                }
            },
        }
    }
}

fn dispatch_message(
    raw: &[u8],
    table: &StdRwLock<SubscriptionTable>,
    callbacks: &Callbacks,
    decode_errors: &AtomicU64,
) {
    let message = match decode_message(raw) {
        Ok(message) => message,
        Err(e) => {
            decode_errors.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "dropping message with malformed framing");
            return;
        }
    };

    // The read guard is held across callback invocation: table mutation
    // and dispatch are mutually exclusive.
    let guard = table.read().expect("table lock");
    let targets = guard.dispatch_targets(message.topic.as_deref());
    if targets.is_empty() {
        trace!(topic = ?message.topic, "no matching subscription; message dropped");
        return;
    }

    let envelope = match ContentEnvelope::decode(&message.payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            decode_errors.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, topic = ?message.topic, "dropping undecodable payload");
            return;
        }
    };

    for target in targets {
        match target {
            DispatchTarget::Plain => (callbacks.plain)(envelope.clone()),
            DispatchTarget::Topical(topic) => (callbacks.topical)(&topic, envelope.clone()),
        }
    }
}
