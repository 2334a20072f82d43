use crate::transport::SubscriptionId;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

/// Callback invoked with the parsed payload of each inbound message
pub type MessageCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// One active subscription: the transport handle plus the caller's callback
#[derive(Clone)]
pub struct SubscriptionEntry {
    pub id: SubscriptionId,
    pub callback: MessageCallback,
}

/// Active topic subscriptions. Invariant: at most one entry per topic.
pub struct SubscriptionRegistry {
    entries: DashMap<String, SubscriptionEntry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.entries.contains_key(topic)
    }

    pub fn insert(&self, topic: String, id: SubscriptionId, callback: MessageCallback) {
        self.entries.insert(topic, SubscriptionEntry { id, callback });
    }

    pub fn remove(&self, topic: &str) -> Option<SubscriptionEntry> {
        self.entries.remove(topic).map(|(_, entry)| entry)
    }

    /// Callback for a topic, cloned out so no map guard is held while the
    /// callback runs.
    pub fn callback(&self, topic: &str) -> Option<MessageCallback> {
        self.entries
            .get(topic)
            .map(|entry| Arc::clone(&entry.callback))
    }

    /// Replace the transport handle after a resubscribe
    pub fn set_id(&self, topic: &str, id: SubscriptionId) {
        if let Some(mut entry) = self.entries.get_mut(topic) {
            entry.id = id;
        }
    }

    /// Snapshot of the subscribed topic names
    pub fn topics(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Remove every entry, returning them for transport teardown
    pub fn drain(&self) -> Vec<(String, SubscriptionEntry)> {
        let topics = self.topics();
        topics
            .into_iter()
            .filter_map(|topic| self.remove(&topic).map(|entry| (topic, entry)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
