//! # TCP Transport
//!
//! Production transport over tokio TCP (feature `net`).
//!
//! ## Stream Format
//!
//! Every wire message is carried as `[len: u32 BE][body]`. In secured mode
//! the body is the CURVE-sealed form (`nonce || ciphertext`) of the framed
//! message; in plain mode it is the framed message itself.
//!
//! ## Publisher Side
//!
//! `bind` starts an accept loop; each accepted subscriber session runs its
//! own writer task draining a shared broadcast bus, so one slow subscriber
//! lags (and drops) without stalling the others. A watch channel fans the
//! shutdown signal out to every task.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use flux_types::Endpoint;

use crate::ports::{PublisherEvents, PublisherTransport, SubscriberTransport, TransportError};
use crate::security::{ClientLink, ServerLink};
use crate::{DEFAULT_CHANNEL_CAPACITY, MAX_MESSAGE_LEN};

#[cfg(feature = "curve")]
use crate::security::session::{CurveClient, CurveServer, SessionCipher, HANDSHAKE_KEY_LEN};

/// How long either side waits for the peer's handshake key.
#[cfg(feature = "curve")]
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Publisher-side transport configuration.
pub struct TcpServerConfig {
    /// Messages buffered per session before a slow subscriber lags.
    pub capacity: usize,
    /// Link security resolved from the owning publisher's context.
    pub security: ServerLink,
    /// Optional session lifecycle callbacks.
    pub events: Option<Arc<dyn PublisherEvents>>,
}

impl Default for TcpServerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CHANNEL_CAPACITY,
            security: ServerLink::Plain,
            events: None,
        }
    }
}

/// Subscriber-side transport configuration.
pub struct TcpClientConfig {
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Link security resolved from the owning subscriber's context.
    pub security: ClientLink,
}

impl Default for TcpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            security: ClientLink::Plain,
        }
    }
}

// =============================================================================
// SESSION CIPHER WRAPPER
// =============================================================================

/// Per-link cipher state, keeping the `curve` feature gate in one place.
enum LinkCipher {
    Plain,
    #[cfg(feature = "curve")]
    Curve(SessionCipher),
}

impl LinkCipher {
    /// Seal an outbound message. `None` means the message must be dropped.
    fn seal(&self, message: &Bytes) -> Option<Bytes> {
        match self {
            Self::Plain => Some(message.clone()),
            #[cfg(feature = "curve")]
            Self::Curve(cipher) => match cipher.seal(message) {
                Ok(sealed) => Some(Bytes::from(sealed)),
                Err(e) => {
                    warn!(error = %e, "failed to seal outbound message");
                    None
                }
            },
        }
    }

    /// Open an inbound message. `None` means the message must be dropped.
    fn open(&self, body: Vec<u8>) -> Option<Bytes> {
        match self {
            Self::Plain => Some(Bytes::from(body)),
            #[cfg(feature = "curve")]
            Self::Curve(cipher) => match cipher.open(&body) {
                Ok(plain) => Some(Bytes::from(plain)),
                Err(e) => {
                    warn!(error = %e, "dropping message that failed session decryption");
                    None
                }
            },
        }
    }
}

// =============================================================================
// PUBLISHER TRANSPORT
// =============================================================================

/// TCP publisher transport: listener, accept loop, one writer task per
/// subscriber session.
pub struct TcpPublisherTransport {
    config: TcpServerConfig,
    bus: broadcast::Sender<Bytes>,
    shutdown_tx: watch::Sender<bool>,
    accept_task: Option<JoinHandle<()>>,
    sessions: Arc<AtomicUsize>,
}

impl TcpPublisherTransport {
    /// Create an unbound transport.
    #[must_use]
    pub fn new(config: TcpServerConfig) -> Self {
        let (bus, _) = broadcast::channel(config.capacity.max(1));
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            bus,
            shutdown_tx,
            accept_task: None,
            sessions: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl PublisherTransport for TcpPublisherTransport {
    async fn bind(&mut self, port: u16) -> Result<u16, TransportError> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|e| TransportError::Bind {
                port,
                reason: e.to_string(),
            })?;
        let local_port = listener
            .local_addr()
            .map_err(|e| TransportError::Bind {
                port,
                reason: e.to_string(),
            })?
            .port();

        let bus = self.bus.clone();
        let sessions = Arc::clone(&self.sessions);
        let security = self.config.security.clone();
        let events = self.config.events.clone();
        let shutdown_tx = self.shutdown_tx.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        self.accept_task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            tokio::spawn(run_session(
                                stream,
                                peer,
                                bus.subscribe(),
                                security.clone(),
                                events.clone(),
                                Arc::clone(&sessions),
                                shutdown_tx.subscribe(),
                            ));
                        }
                        Err(e) => warn!(error = %e, "failed to accept subscriber session"),
                    },
                }
            }
            debug!(port = local_port, "publisher accept loop stopped");
        }));

        Ok(local_port)
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
        self.sessions.load(Ordering::Relaxed)
    }

    async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.accept_task.take() {
            let _ = task.await;
        }
    }
}

/// One subscriber session: optional handshake, then drain the bus into the
/// socket until disconnect or shutdown.
async fn run_session(
    stream: TcpStream,
    peer: SocketAddr,
    mut rx: broadcast::Receiver<Bytes>,
    security: ServerLink,
    events: Option<Arc<dyn PublisherEvents>>,
    sessions: Arc<AtomicUsize>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let _ = stream.set_nodelay(true);
    let (mut read_half, mut write_half) = stream.into_split();

    let cipher = match &security {
        ServerLink::Plain => LinkCipher::Plain,
        #[cfg(feature = "curve")]
        ServerLink::Curve(server) => {
            match server_handshake(server, &mut read_half, &mut write_half).await {
                Ok(cipher) => LinkCipher::Curve(cipher),
                Err(e) => {
                    warn!(peer = %peer, error = %e, "dropping session after failed handshake");
                    return;
                }
            }
        }
    };

    let endpoint = Endpoint::from(peer);
    sessions.fetch_add(1, Ordering::Relaxed);
    if let Some(events) = &events {
        events.on_session_connected(endpoint);
    }
    debug!(peer = %peer, "subscriber session connected");

    let mut probe = [0u8; 8];
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            // Subscribers never send after the handshake: a completed read
            // is EOF or a broken connection either way.
            read = read_half.read(&mut probe) => match read {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            },
            msg = rx.recv() => match msg {
                Ok(message) => {
                    let Some(on_wire) = cipher.seal(&message) else { continue };
                    if write_message(&mut write_half, &on_wire).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(peer = %peer, skipped, "slow subscriber session; messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    sessions.fetch_sub(1, Ordering::Relaxed);
    if let Some(events) = &events {
        events.on_session_disconnected(endpoint);
    }
    debug!(peer = %peer, "subscriber session closed");
}

async fn write_message(writer: &mut OwnedWriteHalf, message: &[u8]) -> std::io::Result<()> {
    writer.write_all(&(message.len() as u32).to_be_bytes()).await?;
    writer.write_all(message).await
}

#[cfg(feature = "curve")]
async fn server_handshake(
    server: &CurveServer,
    read_half: &mut OwnedReadHalf,
    write_half: &mut OwnedWriteHalf,
) -> Result<SessionCipher, TransportError> {
    let mut client_public = [0u8; HANDSHAKE_KEY_LEN];
    tokio::time::timeout(HANDSHAKE_TIMEOUT, read_half.read_exact(&mut client_public))
        .await
        .map_err(|_| TransportError::Handshake("timed out waiting for client key".to_string()))?
        .map_err(|e| TransportError::Handshake(e.to_string()))?;

    write_half
        .write_all(&server.public_bytes())
        .await
        .map_err(|e| TransportError::Handshake(e.to_string()))?;

    Ok(server.session(client_public))
}

// =============================================================================
// SUBSCRIBER TRANSPORT
// =============================================================================

/// TCP subscriber transport: one connection to one publisher.
pub struct TcpSubscriberTransport {
    config: TcpClientConfig,
    reader: Option<OwnedReadHalf>,
    writer: Option<OwnedWriteHalf>,
    cipher: LinkCipher,
}

impl TcpSubscriberTransport {
    /// Create an unconnected transport.
    #[must_use]
    pub fn new(config: TcpClientConfig) -> Self {
        Self {
            config,
            reader: None,
            writer: None,
            cipher: LinkCipher::Plain,
        }
    }
}

#[async_trait]
impl SubscriberTransport for TcpSubscriberTransport {
    async fn connect(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(endpoint.socket_addr()),
        )
        .await
        .map_err(|_| TransportError::Connect {
            endpoint: endpoint.to_string(),
            reason: "connect timed out".to_string(),
        })?
        .map_err(|e| TransportError::Connect {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        let _ = stream.set_nodelay(true);

        #[allow(unused_mut)]
        let (mut read_half, mut write_half) = stream.into_split();

        self.cipher = match &self.config.security {
            ClientLink::Plain => LinkCipher::Plain,
            #[cfg(feature = "curve")]
            ClientLink::Curve(client) => LinkCipher::Curve(
                client_handshake(client, &mut read_half, &mut write_half).await?,
            ),
        };

        self.reader = Some(read_half);
        self.writer = Some(write_half);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Bytes> {
        loop {
            let reader = self.reader.as_mut()?;
            let mut len_buf = [0u8; 4];
            if reader.read_exact(&mut len_buf).await.is_err() {
                return None;
            }
            let len = u32::from_be_bytes(len_buf) as usize;
            if len > MAX_MESSAGE_LEN {
                warn!(len, max = MAX_MESSAGE_LEN, "oversized inbound message; closing");
                return None;
            }
            let mut body = vec![0u8; len];
            if reader.read_exact(&mut body).await.is_err() {
                return None;
            }
            // A decryption failure drops the message, not the connection.
            if let Some(plain) = self.cipher.open(body) {
                return Some(plain);
            }
        }
    }

    async fn shutdown(&mut self) {
        self.reader = None;
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
    }
}

#[cfg(feature = "curve")]
async fn client_handshake(
    client: &CurveClient,
    read_half: &mut OwnedReadHalf,
    write_half: &mut OwnedWriteHalf,
) -> Result<SessionCipher, TransportError> {
    write_half
        .write_all(&client.public_bytes())
        .await
        .map_err(|e| TransportError::Handshake(e.to_string()))?;

    let mut server_public = [0u8; HANDSHAKE_KEY_LEN];
    tokio::time::timeout(HANDSHAKE_TIMEOUT, read_half.read_exact(&mut server_public))
        .await
        .map_err(|_| TransportError::Handshake("timed out waiting for server key".to_string()))?
        .map_err(|e| TransportError::Handshake(e.to_string()))?;

    client
        .verify_and_session(server_public)
        .map_err(TransportError::Handshake)
}
