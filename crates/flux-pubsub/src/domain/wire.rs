//! # Wire Framing
//!
//! Length-delimited multi-frame message codec shared by every transport.
//!
//! ## Wire Format
//!
//! A message is a sequence of frames; each frame is:
//! - Byte 0: continuation flag (`1` = another frame follows, `0` = last)
//! - Bytes 1-4: frame length (u32, big-endian)
//! - Bytes 5..: frame body
//!
//! Two shapes are valid:
//! - One frame: the payload alone (untyped broadcast, no topic)
//! - Two frames: a topic frame, then the payload frame
//!
//! The payload frame's first byte is the content-type tag (see
//! `flux_types::envelope`). The transport prefixes each complete message
//! with its own u32 length; this module only deals with the frames inside.

use bytes::{BufMut, Bytes, BytesMut};
use flux_types::{envelope::DecodeError, Topic};

/// A decoded wire message: optional topic frame plus the payload frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    /// Topic string from the topic frame, absent for untyped broadcasts.
    pub topic: Option<String>,
    /// The raw payload frame (content-type tag + body).
    pub payload: Bytes,
}

/// Encode a message: optional topic frame followed by the payload frame.
#[must_use]
pub fn encode_message(topic: Option<&Topic>, payload: &[u8]) -> Bytes {
    let topic_bytes = topic.map(|t| t.as_str().as_bytes());
    let capacity =
        topic_bytes.map_or(0, |t| 5 + t.len()) + 5 + payload.len();
    let mut out = BytesMut::with_capacity(capacity);
    if let Some(t) = topic_bytes {
        put_frame(&mut out, t, true);
    }
    put_frame(&mut out, payload, false);
    out.freeze()
}

/// Decode a message into its topic and payload frames.
///
/// # Errors
///
/// Returns [`DecodeError::Framing`] for truncated frames, trailing bytes,
/// a missing terminal frame, more than two frames, or a non-UTF-8 topic
/// frame.
pub fn decode_message(mut input: &[u8]) -> Result<WireMessage, DecodeError> {
    let mut frames: Vec<(&[u8], bool)> = Vec::with_capacity(2);
    loop {
        let (body, more, rest) = take_frame(input)?;
        frames.push((body, more));
        input = rest;
        if !more {
            break;
        }
        if frames.len() == 2 {
            return Err(DecodeError::Framing("more than two frames".into()));
        }
    }
    if !input.is_empty() {
        return Err(DecodeError::Framing(format!(
            "{} trailing bytes after final frame",
            input.len()
        )));
    }

    match frames.as_slice() {
        [(payload, _)] => Ok(WireMessage {
            topic: None,
            payload: Bytes::copy_from_slice(payload),
        }),
        [(topic, _), (payload, _)] => {
            let topic = std::str::from_utf8(topic)
                .map_err(|_| DecodeError::Framing("topic frame is not UTF-8".into()))?;
            Ok(WireMessage {
                topic: Some(topic.to_string()),
                payload: Bytes::copy_from_slice(payload),
            })
        }
        _ => unreachable!("frame count bounded above"),
    }
}

fn put_frame(out: &mut BytesMut, body: &[u8], more: bool) {
    out.put_u8(u8::from(more));
    out.put_u32(body.len() as u32);
    out.put_slice(body);
}

fn take_frame(input: &[u8]) -> Result<(&[u8], bool, &[u8]), DecodeError> {
    if input.len() < 5 {
        return Err(DecodeError::Framing("truncated frame header".into()));
    }
    let more = match input[0] {
        0 => false,
        1 => true,
        other => {
            return Err(DecodeError::Framing(format!(
                "invalid continuation flag {other}"
            )))
        }
    };
    let len = u32::from_be_bytes([input[1], input[2], input[3], input[4]]) as usize;
    let rest = &input[5..];
    if rest.len() < len {
        return Err(DecodeError::Framing(format!(
            "frame body truncated: need {len}, have {}",
            rest.len()
        )));
    }
    Ok((&rest[..len], more, &rest[len..]))
}
