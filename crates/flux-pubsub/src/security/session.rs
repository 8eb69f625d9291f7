//! # CURVE Sessions
//!
//! Static-static x25519 key agreement plus XChaCha20-Poly1305 message
//! sealing for one transport session.
//!
//! ## Handshake Wire Format
//!
//! Immediately after connecting:
//! - client -> server: client static public key (32 raw bytes)
//! - server -> client: server static public key (32 raw bytes)
//!
//! The client rejects a server whose announced key differs from the
//! trusted key configured via `set_server_public_key`. Both sides then
//! derive the shared session key with x25519 and seal every wire message
//! as `nonce (24 bytes) || ciphertext`.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

/// Raw key length on the handshake wire.
pub const HANDSHAKE_KEY_LEN: usize = 32;

/// Nonce length prepended to every sealed message.
pub const NONCE_LEN: usize = 24;

/// Errors from sealing or opening a session message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The sealed message is shorter than a nonce.
    #[error("sealed message too short ({0} bytes)")]
    TooShort(usize),
    /// Authentication failed: wrong key or tampered ciphertext.
    #[error("message failed authenticated decryption")]
    Decrypt,
    /// Encryption failed.
    #[error("message encryption failed")]
    Encrypt,
}

/// Server-side CURVE state: the publisher's static secret.
#[derive(Clone)]
pub struct CurveServer {
    secret: StaticSecret,
}

impl CurveServer {
    /// Build from the decoded 32-byte server secret key.
    #[must_use]
    pub fn new(secret: [u8; HANDSHAKE_KEY_LEN]) -> Self {
        Self {
            secret: StaticSecret::from(secret),
        }
    }

    /// The public key announced to clients during the handshake.
    #[must_use]
    pub fn public_bytes(&self) -> [u8; HANDSHAKE_KEY_LEN] {
        *PublicKey::from(&self.secret).as_bytes()
    }

    /// Derive the session cipher for a client that announced this key.
    #[must_use]
    pub fn session(&self, client_public: [u8; HANDSHAKE_KEY_LEN]) -> SessionCipher {
        let shared = self.secret.diffie_hellman(&PublicKey::from(client_public));
        SessionCipher::from_key(*shared.as_bytes())
    }
}

/// Client-side CURVE state: the subscriber's static secret and the server
/// key it trusts.
#[derive(Clone)]
pub struct CurveClient {
    secret: StaticSecret,
    trusted_server: [u8; HANDSHAKE_KEY_LEN],
}

impl CurveClient {
    /// Build from the decoded client secret and trusted server public key.
    #[must_use]
    pub fn new(secret: [u8; HANDSHAKE_KEY_LEN], trusted_server: [u8; HANDSHAKE_KEY_LEN]) -> Self {
        Self {
            secret: StaticSecret::from(secret),
            trusted_server,
        }
    }

    /// The public key sent to the server during the handshake.
    #[must_use]
    pub fn public_bytes(&self) -> [u8; HANDSHAKE_KEY_LEN] {
        *PublicKey::from(&self.secret).as_bytes()
    }

    /// Verify the server's announced key and derive the session cipher.
    ///
    /// # Errors
    ///
    /// Returns `Err` when the announced key does not match the trusted
    /// server public key.
    pub fn verify_and_session(
        &self,
        announced_server: [u8; HANDSHAKE_KEY_LEN],
    ) -> Result<SessionCipher, String> {
        if announced_server != self.trusted_server {
            return Err("server public key does not match the trusted key".to_string());
        }
        let shared = self
            .secret
            .diffie_hellman(&PublicKey::from(announced_server));
        Ok(SessionCipher::from_key(*shared.as_bytes()))
    }
}

/// Per-session authenticated encryption.
#[derive(Clone)]
pub struct SessionCipher {
    cipher: XChaCha20Poly1305,
}

impl SessionCipher {
    fn from_key(key: [u8; 32]) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(&key.into()),
        }
    }

    /// Seal a plaintext message: random 24-byte nonce prepended to the
    /// ciphertext (safe with XChaCha20's 192-bit nonce space).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Encrypt`] if encryption fails.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, SessionError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| SessionError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Open a sealed message.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TooShort`] or [`SessionError::Decrypt`].
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, SessionError> {
        if sealed.len() < NONCE_LEN {
            return Err(SessionError::TooShort(sealed.len()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| SessionError::Decrypt)
    }
}
