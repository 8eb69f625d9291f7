//! # Security Key Material
//!
//! Public/secret key strings in the transport's standard binary-to-text
//! encoding (Z85): 40 characters decoding to 32 raw key bytes.
//!
//! Callers supply keys already in this encoding; no format conversion is
//! performed here beyond decoding for the transport layer. Secret material
//! is zeroized on drop.
//!
//! ## Z85 Wire Encoding
//!
//! - 5 text characters encode 4 bytes (base 85, big-endian groups)
//! - A 32-byte key is therefore exactly 40 characters
//! - Alphabet: `0-9 a-z A-Z . - : + = ^ ! / * ? & < > ( ) [ ] { } @ % $ #`

use zeroize::Zeroize;

use crate::errors::BusError;

/// Length of an encoded key string.
pub const KEY_ENCODED_LEN: usize = 40;

/// Length of a decoded raw key.
pub const KEY_RAW_LEN: usize = 32;

const Z85_ALPHABET: &[u8; 85] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ.-:+=^!/*?&<>()[]{}@%$#";

/// A validated public key in Z85 encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    encoded: String,
    raw: [u8; KEY_RAW_LEN],
}

impl KeyMaterial {
    /// Validate and decode a 40-character Z85 key string.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::SecurityMisconfigured`] when the string is not
    /// exactly 40 characters of the Z85 alphabet.
    pub fn parse(encoded: &str) -> Result<Self, BusError> {
        let raw = z85_decode_key(encoded)?;
        Ok(Self {
            encoded: encoded.to_string(),
            raw,
        })
    }

    /// The encoded form as supplied by the caller.
    #[must_use]
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// The decoded 32 raw key bytes.
    #[must_use]
    pub fn raw(&self) -> &[u8; KEY_RAW_LEN] {
        &self.raw
    }
}

/// A validated secret key in Z85 encoding, zeroized on drop.
#[derive(Clone)]
pub struct SecretKeyMaterial {
    encoded: String,
    raw: [u8; KEY_RAW_LEN],
}

impl SecretKeyMaterial {
    /// Validate and decode a 40-character Z85 secret key string.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::SecurityMisconfigured`] when the string is not
    /// exactly 40 characters of the Z85 alphabet.
    pub fn parse(encoded: &str) -> Result<Self, BusError> {
        let raw = z85_decode_key(encoded)?;
        Ok(Self {
            encoded: encoded.to_string(),
            raw,
        })
    }

    /// The decoded 32 raw key bytes.
    #[must_use]
    pub fn raw(&self) -> &[u8; KEY_RAW_LEN] {
        &self.raw
    }
}

impl Drop for SecretKeyMaterial {
    fn drop(&mut self) {
        self.encoded.zeroize();
        self.raw.zeroize();
    }
}

impl std::fmt::Debug for SecretKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secret material never appears in logs.
        f.write_str("SecretKeyMaterial(..)")
    }
}

/// Encode 32 raw key bytes into the 40-character Z85 form.
#[must_use]
pub fn z85_encode_key(raw: &[u8; KEY_RAW_LEN]) -> String {
    let mut out = String::with_capacity(KEY_ENCODED_LEN);
    for chunk in raw.chunks_exact(4) {
        let mut value = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as u64;
        let mut group = [0u8; 5];
        for slot in group.iter_mut().rev() {
            *slot = Z85_ALPHABET[(value % 85) as usize];
            value /= 85;
        }
        out.push_str(std::str::from_utf8(&group).expect("alphabet is ascii"));
    }
    out
}

fn z85_decode_key(encoded: &str) -> Result<[u8; KEY_RAW_LEN], BusError> {
    if encoded.len() != KEY_ENCODED_LEN {
        return Err(BusError::SecurityMisconfigured(format!(
            "key must be {KEY_ENCODED_LEN} Z85 characters, got {}",
            encoded.len()
        )));
    }
    let mut raw = [0u8; KEY_RAW_LEN];
    for (group, out) in encoded.as_bytes().chunks_exact(5).zip(raw.chunks_exact_mut(4)) {
        let mut value: u64 = 0;
        for &c in group {
            let digit = Z85_ALPHABET.iter().position(|&a| a == c).ok_or_else(|| {
                BusError::SecurityMisconfigured(format!(
                    "key contains a character outside the Z85 alphabet: {:?}",
                    c as char
                ))
            })?;
            value = value * 85 + digit as u64;
        }
        if value > u64::from(u32::MAX) {
            return Err(BusError::SecurityMisconfigured(
                "key group overflows the Z85 encoding".to_string(),
            ));
        }
        out.copy_from_slice(&(value as u32).to_be_bytes());
    }
    Ok(raw)
}
