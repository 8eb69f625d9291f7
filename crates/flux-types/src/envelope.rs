//! # Content Envelope
//!
//! The tagged container distinguishing structured events from raw byte
//! payloads.
//!
//! ## Wire Layout
//!
//! The payload frame is a 1-byte content-type tag followed by the payload
//! body:
//!
//! - Byte 0: content type (`0` = structured event, `1` = byte data)
//! - Bytes 1..: the payload body
//!
//! Structured events are encoded through serde_json (the schema engine is
//! an external capability; this crate only delegates to it). Byte payloads
//! pass through untouched. The tag must be interpreted before the body;
//! unknown tags are a decode error, never silently ignored.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Content-type discriminator carried at byte 0 of the payload frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ContentType {
    /// Structured event record (schema-engine encoded).
    Event = 0,
    /// Opaque byte payload.
    Bytes = 1,
}

impl ContentType {
    /// Decode a wire tag.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownTag`] for unrecognized values.
    pub fn from_tag(tag: u8) -> Result<Self, DecodeError> {
        match tag {
            0 => Ok(Self::Event),
            1 => Ok(Self::Bytes),
            other => Err(DecodeError::UnknownTag(other)),
        }
    }

    /// The wire tag for this content type.
    #[must_use]
    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// A structured event record.
///
/// The record's `data` is an arbitrary schema-engine document; this layer
/// never inspects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Event name, used by receivers to select a handler.
    pub name: String,
    /// Schema-engine payload.
    pub data: serde_json::Value,
}

impl EventRecord {
    /// Create a new event record.
    #[must_use]
    pub fn new(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// An opaque byte payload.
///
/// The bytes pass through the bus untouched. The optional `type_hint` is
/// caller-side metadata for the receiving application and is not
/// serialized onto the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ByteData {
    /// The raw payload.
    pub bytes: Bytes,
    /// Optional local annotation of what the bytes contain.
    pub type_hint: Option<String>,
}

impl ByteData {
    /// Wrap raw bytes without a type hint.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            type_hint: None,
        }
    }

    /// Wrap raw bytes with a type hint.
    #[must_use]
    pub fn with_hint(bytes: impl Into<Bytes>, hint: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            type_hint: Some(hint.into()),
        }
    }
}

/// The discriminated message payload: either a structured event or raw
/// bytes, tagged so that a single channel can carry both.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentEnvelope {
    /// A structured event record.
    Event(EventRecord),
    /// An opaque byte payload.
    Bytes(ByteData),
}

impl ContentEnvelope {
    /// The content type of this envelope.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Event(_) => ContentType::Event,
            Self::Bytes(_) => ContentType::Bytes,
        }
    }

    /// Encode the envelope into a payload frame: tag byte + body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        match self {
            Self::Event(record) => {
                // serde_json serialization of an in-memory Value cannot fail.
                let body = serde_json::to_vec(record).expect("event record serializes");
                let mut frame = BytesMut::with_capacity(1 + body.len());
                frame.put_u8(ContentType::Event.tag());
                frame.put_slice(&body);
                frame.freeze()
            }
            Self::Bytes(data) => {
                let mut frame = BytesMut::with_capacity(1 + data.bytes.len());
                frame.put_u8(ContentType::Bytes.tag());
                frame.put_slice(&data.bytes);
                frame.freeze()
            }
        }
    }

    /// Decode a payload frame.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::MissingTag`] for an empty frame.
    /// - [`DecodeError::UnknownTag`] for an unrecognized discriminator.
    /// - [`DecodeError::Event`] when the body cannot be parsed as its
    ///   declared type.
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        let (&tag, body) = frame.split_first().ok_or(DecodeError::MissingTag)?;
        match ContentType::from_tag(tag)? {
            ContentType::Event => {
                let record: EventRecord = serde_json::from_slice(body)
                    .map_err(|e| DecodeError::Event(e.to_string()))?;
                Ok(Self::Event(record))
            }
            ContentType::Bytes => Ok(Self::Bytes(ByteData::new(body.to_vec()))),
        }
    }
}

/// Errors raised while decoding a payload frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame was empty: no content-type tag to interpret.
    #[error("payload frame is missing the content-type tag")]
    MissingTag,

    /// The content-type tag is not in the known set.
    #[error("unknown content-type tag {0}")]
    UnknownTag(u8),

    /// The body could not be parsed as a structured event.
    #[error("malformed event payload: {0}")]
    Event(String),

    /// Frame boundaries inconsistent with the message length, or an
    /// unexpected number of frames.
    #[error("malformed wire framing: {0}")]
    Framing(String),
}
