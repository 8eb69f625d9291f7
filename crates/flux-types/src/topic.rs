//! # Topics
//!
//! Topic strings, validation, normalization, and hierarchical matching.
//!
//! A topic is a non-empty path-like string over `[a-zA-Z0-9_.\-/]`,
//! normalized to end with `/`. Matching is a `/`-boundary prefix test:
//! a subscription to `home/` receives messages published on
//! `home/livingroom/`, but not the other way around.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::BusError;

/// A validated, normalized topic.
///
/// Construction via [`Topic::new`] is the only way to obtain one, so every
/// `Topic` in the system is well-formed and ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    /// Validate and normalize a topic string.
    ///
    /// Appends a trailing `/` when absent. Normalization is idempotent:
    /// `Topic::new(t.as_str())` on an existing topic yields the same value.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidTopic`] for empty strings or any character
    /// outside `[a-zA-Z0-9_.\-/]`.
    pub fn new(raw: &str) -> Result<Self, BusError> {
        if !is_valid_topic(raw) {
            return Err(BusError::InvalidTopic(raw.to_string()));
        }
        Ok(Self(normalize(raw)))
    }

    /// The normalized topic string (always ends with `/`).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether a message published on `candidate` is covered by a
    /// subscription to `self`.
    ///
    /// True iff `candidate` equals this topic or begins with it. Because
    /// both sides are normalized with a trailing `/`, a plain prefix test
    /// is exactly the `/`-boundary rule.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        topic_matches(candidate, &self.0)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Topic {
    type Error = BusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Topic::new(&value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0
    }
}

/// Topic selection for a publish call, resolved once at the call boundary.
///
/// `None` sends without a topic frame (untyped broadcast), `One` sends a
/// single topic frame, `Many` fans the same envelope out once per topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicSelector {
    /// No topic frame: delivered to all-topics subscriptions only.
    None,
    /// A single topic frame.
    One(Topic),
    /// One send per topic, atomically validated as a set.
    Many(Vec<Topic>),
}

impl TopicSelector {
    /// Build a selector from raw topic strings, validating member-by-member.
    ///
    /// If any member is invalid the whole call fails and no partial state
    /// is produced.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidTopic`] naming the first invalid member.
    pub fn from_strings(topics: &[&str]) -> Result<Self, BusError> {
        let mut validated = Vec::with_capacity(topics.len());
        for raw in topics {
            validated.push(Topic::new(raw)?);
        }
        Ok(match validated.len() {
            0 => Self::None,
            1 => Self::One(validated.remove(0)),
            _ => Self::Many(validated),
        })
    }
}

/// Check whether `candidate` is covered by `subscribed`.
///
/// An empty `subscribed` string means "match everything" (the all-topics
/// marker). Both strings are expected in normalized form; [`Topic`] values
/// always are.
#[must_use]
pub fn topic_matches(candidate: &str, subscribed: &str) -> bool {
    subscribed.is_empty() || candidate.starts_with(subscribed)
}

/// Validate a raw topic string: non-empty, charset `[a-zA-Z0-9_.\-/]`.
#[must_use]
pub fn is_valid_topic(raw: &str) -> bool {
    !raw.is_empty()
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-' | b'/'))
}

fn normalize(raw: &str) -> String {
    if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    }
}
