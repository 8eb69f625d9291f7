//! # Security Context
//!
//! Holds local and peer key material and gates transport setup.
//!
//! Keys are 40-character Z85 strings (see `flux_types::security`). All
//! setters must run before the owning socket starts; the services enforce
//! that ordering and this module enforces role, format, and capability.
//!
//! ## Capability Gate
//!
//! The cryptographic capability is compiled in via the `curve` cargo
//! feature. Without it, every setter uniformly returns
//! [`BusError::SecurityUnsupported`] rather than silently succeeding,
//! matching the workspace's feature-gated adapter convention.

#[cfg(feature = "curve")]
pub mod session;

use flux_types::{BusError, BusResult, KeyMaterial, SecretKeyMaterial};

/// Security settings resolved for a publisher (server-side) link.
#[derive(Clone)]
pub enum ServerLink {
    /// No encryption; messages travel in the clear.
    Plain,
    /// CURVE handshake and per-session encryption.
    #[cfg(feature = "curve")]
    Curve(session::CurveServer),
}

/// Security settings resolved for a subscriber (client-side) link.
#[derive(Clone)]
pub enum ClientLink {
    /// No encryption; messages travel in the clear.
    Plain,
    /// CURVE handshake and per-session encryption.
    #[cfg(feature = "curve")]
    Curve(session::CurveClient),
}

impl std::fmt::Debug for ClientLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => f.write_str("Plain"),
            #[cfg(feature = "curve")]
            Self::Curve(_) => f.write_str("Curve"),
        }
    }
}

/// Per-instance key material for a publisher or subscriber.
///
/// The role split is enforced by the service API surface: publishers only
/// expose the server-private setter, subscribers only the client-pair and
/// trusted-server setters.
#[derive(Debug, Default)]
pub struct SecurityContext {
    client_secret: Option<SecretKeyMaterial>,
    client_public: Option<KeyMaterial>,
    server_secret: Option<SecretKeyMaterial>,
    trusted_server: Option<KeyMaterial>,
}

impl SecurityContext {
    /// Create an empty (unsecured) context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the subscriber identity key pair.
    ///
    /// # Errors
    ///
    /// [`BusError::SecurityUnsupported`] without the `curve` feature;
    /// [`BusError::SecurityMisconfigured`] for malformed keys.
    pub fn set_client_keys(&mut self, private_key: &str, public_key: &str) -> BusResult<()> {
        capability_check()?;
        let secret = SecretKeyMaterial::parse(private_key)?;
        let public = KeyMaterial::parse(public_key)?;
        self.client_secret = Some(secret);
        self.client_public = Some(public);
        Ok(())
    }

    /// Store the publisher identity secret key.
    ///
    /// # Errors
    ///
    /// [`BusError::SecurityUnsupported`] without the `curve` feature;
    /// [`BusError::SecurityMisconfigured`] for malformed keys.
    pub fn set_server_private_key(&mut self, private_key: &str) -> BusResult<()> {
        capability_check()?;
        self.server_secret = Some(SecretKeyMaterial::parse(private_key)?);
        Ok(())
    }

    /// Store the public key of the remote publisher this subscriber must
    /// trust.
    ///
    /// # Errors
    ///
    /// [`BusError::SecurityUnsupported`] without the `curve` feature;
    /// [`BusError::SecurityMisconfigured`] for malformed keys.
    pub fn set_server_public_key(&mut self, public_key: &str) -> BusResult<()> {
        capability_check()?;
        self.trusted_server = Some(KeyMaterial::parse(public_key)?);
        Ok(())
    }

    /// Whether client identity keys are present (secured subscriber mode).
    #[must_use]
    pub fn is_secured_client(&self) -> bool {
        self.client_secret.is_some()
    }

    /// Whether a server secret is present (secured publisher mode).
    #[must_use]
    pub fn is_secured_server(&self) -> bool {
        self.server_secret.is_some()
    }

    /// Whether the trusted server public key has been supplied.
    #[must_use]
    pub fn has_trusted_server(&self) -> bool {
        self.trusted_server.is_some()
    }

    /// Resolve the link security for a publisher socket.
    pub fn server_link(&self) -> ServerLink {
        #[cfg(feature = "curve")]
        if let Some(secret) = &self.server_secret {
            return ServerLink::Curve(session::CurveServer::new(*secret.raw()));
        }
        ServerLink::Plain
    }

    /// Resolve the link security for a subscriber connection.
    ///
    /// # Errors
    ///
    /// [`BusError::SecurityMisconfigured`] when client keys are set but no
    /// trusted server public key was supplied; an unauthenticated secured
    /// connection would be a silent downgrade.
    pub fn client_link(&self) -> BusResult<ClientLink> {
        #[cfg(feature = "curve")]
        if let Some(secret) = &self.client_secret {
            let trusted = self.trusted_server.as_ref().ok_or_else(|| {
                BusError::SecurityMisconfigured(
                    "server public key must be set before connecting in secured mode".to_string(),
                )
            })?;
            return Ok(ClientLink::Curve(session::CurveClient::new(
                *secret.raw(),
                *trusted.raw(),
            )));
        }
        Ok(ClientLink::Plain)
    }
}

fn capability_check() -> BusResult<()> {
    #[cfg(feature = "curve")]
    {
        Ok(())
    }
    #[cfg(not(feature = "curve"))]
    {
        Err(BusError::SecurityUnsupported)
    }
}

/// Generate a fresh x25519 key pair in Z85 encoding: `(secret, public)`.
#[cfg(feature = "curve")]
#[must_use]
pub fn generate_keypair() -> (String, String) {
    use flux_types::security::z85_encode_key;
    use x25519_dalek::{PublicKey, StaticSecret};

    let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
    let public = PublicKey::from(&secret);
    (
        z85_encode_key(&secret.to_bytes()),
        z85_encode_key(public.as_bytes()),
    )
}
