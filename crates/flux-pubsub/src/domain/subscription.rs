//! # Subscription Table
//!
//! The set of active subscriptions held by one subscriber, keyed by topic
//! string plus the special all-topics marker.
//!
//! The table itself is pure data; the subscriber service wraps it in a
//! read-write lock so that dispatch lookups and subscribe/unsubscribe
//! mutations are mutually exclusive.

use std::collections::HashMap;

use flux_types::{Endpoint, Topic};

/// One table entry for a topic-keyed subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TopicEntry {
    topic: Topic,
    /// Set for per-endpoint subscriptions opened via a direct connection.
    endpoint: Option<Endpoint>,
}

/// Where a matched message must be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchTarget {
    /// The all-topics subscription matched: invoke the plain callback.
    Plain,
    /// A topic subscription matched: invoke the topic-aware callback with
    /// the **subscribed** topic (not the wire topic).
    Topical(Topic),
}

/// The set of active subscriptions for one subscriber.
///
/// Keys are topic strings (normalized) or the all-topics marker, so a
/// repeated subscribe to the same topic replaces rather than duplicates.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    all: bool,
    topics: HashMap<String, TopicEntry>,
}

impl SubscriptionTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate the all-topics subscription.
    pub fn insert_all(&mut self) {
        self.all = true;
    }

    /// Activate a single-topic subscription.
    pub fn insert_topic(&mut self, topic: Topic) {
        self.topics.insert(
            topic.as_str().to_string(),
            TopicEntry {
                topic,
                endpoint: None,
            },
        );
    }

    /// Activate a per-endpoint subscription, keyed by its topic like any
    /// other topic subscription.
    pub fn insert_remote(&mut self, topic: Topic, endpoint: Endpoint) {
        self.topics.insert(
            topic.as_str().to_string(),
            TopicEntry {
                topic,
                endpoint: Some(endpoint),
            },
        );
    }

    /// Deactivate the all-topics subscription. Returns whether it was set.
    pub fn remove_all(&mut self) -> bool {
        std::mem::take(&mut self.all)
    }

    /// Deactivate a topic subscription. Removing an absent key is a no-op
    /// returning `false`.
    pub fn remove_topic(&mut self, topic: &Topic) -> bool {
        self.topics.remove(topic.as_str()).is_some()
    }

    /// Drop every subscription.
    pub fn clear(&mut self) {
        self.all = false;
        self.topics.clear();
    }

    /// Whether the all-topics subscription is active.
    #[must_use]
    pub fn has_all(&self) -> bool {
        self.all
    }

    /// Whether a subscription for exactly this topic key is active.
    #[must_use]
    pub fn has_topic(&self, topic: &Topic) -> bool {
        self.topics.contains_key(topic.as_str())
    }

    /// Number of active subscriptions (topic entries plus the all marker).
    #[must_use]
    pub fn len(&self) -> usize {
        self.topics.len() + usize::from(self.all)
    }

    /// Whether no subscription is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.all && self.topics.is_empty()
    }

    /// Resolve the dispatch targets for an inbound message.
    ///
    /// An absent wire topic is an untyped broadcast and only the
    /// all-topics subscription matches it. A present wire topic matches
    /// the all-topics subscription plus every topic entry whose topic is
    /// a `/`-boundary prefix of it. One target per matching subscription.
    #[must_use]
    pub fn dispatch_targets(&self, wire_topic: Option<&str>) -> Vec<DispatchTarget> {
        let mut targets = Vec::new();
        if self.all {
            targets.push(DispatchTarget::Plain);
        }
        if let Some(candidate) = wire_topic {
            for entry in self.topics.values() {
                if entry.topic.matches(candidate) {
                    targets.push(DispatchTarget::Topical(entry.topic.clone()));
                }
            }
        }
        targets
    }

    /// Endpoints of active per-endpoint subscriptions.
    #[must_use]
    pub fn remote_endpoints(&self) -> Vec<Endpoint> {
        self.topics
            .values()
            .filter_map(|entry| entry.endpoint)
            .collect()
    }
}
