//! The three subscription registries plus the subscriber-stream table.
//!
//! Grounded on `pubsub_structs.go`'s `Service` fields and
//! `pubsub/utilities.go`'s key-building helpers. Each map has its own
//! `std::sync::RwLock` (`spec.md` §4.5.2, §5); no lock is ever held across
//! an `.await`.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::{mpsc, oneshot};

use crate::model::ObjectId;

/// What a subscription matches against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionType {
    Bucket,
    Object,
    Prefix,
}

/// A publication's kind, carried alongside the mutated object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PublicationType {
    CreateObject,
    UpdateObject,
    DeleteObject,
    CreateUpdateObject,
}

#[derive(Clone, Debug)]
pub struct Publication {
    pub object: crate::model::Object,
    pub publication_type: PublicationType,
}

/// A single item delivered down a subscriber's stream.
#[derive(Clone, Debug, serde::Serialize)]
pub struct StreamEvent {
    pub object: crate::model::Object,
    pub publication_type: PublicationType,
}

/// Builds the registry key for BUCKET/OBJECT subscriptions:
/// `bucket` for BUCKET, `bucket + "/" + key` for OBJECT and PREFIX.
/// Mirrors `createSubscriptionKey` in `pubsub/utilities.go`.
pub fn subscription_item_id(bucket: &str, key: &str, kind: SubscriptionType) -> String {
    match kind {
        SubscriptionType::Bucket => bucket.to_string(),
        SubscriptionType::Object | SubscriptionType::Prefix => format!("{bucket}/{key}"),
    }
}

/// Builds the matching key for a mutated object: always `bucket + "/" + key`,
/// regardless of which subscription type will be compared against it.
/// Mirrors `createSubscriptionKeyForMatching`.
pub fn matching_id(id: &ObjectId) -> String {
    format!("{}/{}", id.bucket, id.key)
}

/// The live handle for one subscriber's long-lived stream.
struct SubscriberStream {
    sender: Option<mpsc::Sender<StreamEvent>>,
    finished: Option<oneshot::Sender<()>>,
    subscriptions: u64,
}

impl SubscriberStream {
    fn new() -> Self {
        Self {
            sender: None,
            finished: None,
            subscriptions: 0,
        }
    }
}

/// The pub/sub subscription state: two match registries plus the
/// subscriber-stream table, each behind its own lock (`spec.md` §4.5.2).
///
/// Lock ordering, enforced by call order in every method here:
/// `subscriber_streams` → `subscribed_items` → `subscribed_prefix`
/// (`spec.md` §5), so no two call sites can deadlock against each other.
pub struct Registry {
    subscribed_items: RwLock<HashMap<String, Vec<String>>>,
    subscribed_prefix: RwLock<HashMap<String, HashMap<String, Vec<String>>>>,
    subscriber_streams: RwLock<HashMap<String, SubscriberStream>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            subscribed_items: RwLock::new(HashMap::new()),
            subscribed_prefix: RwLock::new(HashMap::new()),
            subscriber_streams: RwLock::new(HashMap::new()),
        }
    }

    /// `Subscribe` (`spec.md` §4.5.3).
    pub fn subscribe(&self, subscriber_id: &str, bucket: &str, key: &str, kind: SubscriptionType) {
        match kind {
            SubscriptionType::Bucket | SubscriptionType::Object => {
                let item_id = subscription_item_id(bucket, key, kind);
                let mut items = self.subscribed_items.write().expect("subscribed_items lock poisoned");
                items.entry(item_id).or_default().push(subscriber_id.to_string());
            }
            SubscriptionType::Prefix => {
                let item_id = subscription_item_id(bucket, key, kind);
                let mut prefixes = self
                    .subscribed_prefix
                    .write()
                    .expect("subscribed_prefix lock poisoned");
                prefixes
                    .entry(bucket.to_string())
                    .or_default()
                    .entry(item_id)
                    .or_default()
                    .push(subscriber_id.to_string());
            }
        }

        let mut streams = self
            .subscriber_streams
            .write()
            .expect("subscriber_streams lock poisoned");
        streams
            .entry(subscriber_id.to_string())
            .or_insert_with(SubscriberStream::new)
            .subscriptions += 1;
    }

    /// `Unsubscribe` (`spec.md` §4.5.6): returns `true` if the subscriber
    /// had an entry to remove from (mapped to `NOT_FOUND` otherwise by the
    /// caller).
    ///
    /// Writes the filtered list back to the registry map. The original
    /// Go helper reassigns a local slice variable after a swap-with-last
    /// and never writes it back, so the removal silently fails to
    /// persist; this implementation fixes that (`spec.md` §9 open
    /// question #2).
    pub fn unsubscribe(&self, subscriber_id: &str, bucket: &str, key: &str, kind: SubscriptionType) -> bool {
        let item_id = subscription_item_id(bucket, key, kind);
        let removed = match kind {
            SubscriptionType::Bucket | SubscriptionType::Object => {
                let mut items = self.subscribed_items.write().expect("subscribed_items lock poisoned");
                remove_from_list(&mut items, &item_id, subscriber_id)
            }
            SubscriptionType::Prefix => {
                let mut prefixes = self
                    .subscribed_prefix
                    .write()
                    .expect("subscribed_prefix lock poisoned");
                match prefixes.get_mut(bucket) {
                    Some(by_item) => remove_from_list(by_item, &item_id, subscriber_id),
                    None => false,
                }
            }
        };

        if !removed {
            return false;
        }

        let mut streams = self
            .subscriber_streams
            .write()
            .expect("subscriber_streams lock poisoned");
        if let Some(stream) = streams.get_mut(subscriber_id) {
            stream.subscriptions = stream.subscriptions.saturating_sub(1);
            if stream.subscriptions == 0 {
                tear_down_locked(stream);
                streams.remove(subscriber_id);
            }
        }
        true
    }

    /// `SubscribeStream` (`spec.md` §4.5.4): installs a fresh stream,
    /// tearing down any prior one for the same subscriber first, and
    /// returns the receiver to hand to the adapter plus the `finished`
    /// signal the caller must wait on before returning from the RPC.
    pub fn open_stream(&self, subscriber_id: &str) -> (mpsc::Receiver<StreamEvent>, oneshot::Receiver<()>) {
        let (tx, rx) = mpsc::channel(64);
        let (finished_tx, finished_rx) = oneshot::channel();

        let mut streams = self
            .subscriber_streams
            .write()
            .expect("subscriber_streams lock poisoned");
        let entry = streams
            .entry(subscriber_id.to_string())
            .or_insert_with(SubscriberStream::new);
        tear_down_locked(entry);
        entry.sender = Some(tx);
        entry.finished = Some(finished_tx);

        (rx, finished_rx)
    }

    /// Subscribers matching a publication on `id`, de-duplicated
    /// first-send-wins across subscription types (`spec.md` §4.5.5).
    pub fn matching_subscribers(&self, id: &ObjectId) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut matched = Vec::new();

        {
            let items = self.subscribed_items.read().expect("subscribed_items lock poisoned");
            if let Some(list) = items.get(&id.bucket) {
                for subscriber in list {
                    if seen.insert(subscriber.clone()) {
                        matched.push(subscriber.clone());
                    }
                }
            }
            let object_item_id = matching_id(id);
            if let Some(list) = items.get(&object_item_id) {
                for subscriber in list {
                    if seen.insert(subscriber.clone()) {
                        matched.push(subscriber.clone());
                    }
                }
            }
        }

        {
            let prefixes = self.subscribed_prefix.read().expect("subscribed_prefix lock poisoned");
            if let Some(by_item) = prefixes.get(&id.bucket) {
                let full = matching_id(id);
                for (prefix_item_id, list) in by_item {
                    if full.starts_with(prefix_item_id.as_str()) {
                        for subscriber in list {
                            if seen.insert(subscriber.clone()) {
                                matched.push(subscriber.clone());
                            }
                        }
                    }
                }
            }
        }

        matched
    }

    /// Sends one event to a subscriber's active stream, tearing the
    /// stream down on failure. Returns `false` if no stream was
    /// registered or the send failed. Never holds the lock across the
    /// `.await`.
    pub async fn send_to(&self, subscriber_id: &str, event: StreamEvent) -> bool {
        let sender = {
            let streams = self.subscriber_streams.read().expect("subscriber_streams lock poisoned");
            streams.get(subscriber_id).and_then(|s| s.sender.clone())
        };
        let Some(sender) = sender else {
            return false;
        };
        match sender.send(event).await {
            Ok(()) => true,
            Err(_) => {
                let mut streams = self
                    .subscriber_streams
                    .write()
                    .expect("subscriber_streams lock poisoned");
                if let Some(stream) = streams.get_mut(subscriber_id) {
                    tear_down_locked(stream);
                }
                false
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn remove_from_list(map: &mut HashMap<String, Vec<String>>, item_id: &str, subscriber_id: &str) -> bool {
    let Some(list) = map.get_mut(item_id) else {
        return false;
    };
    let before = list.len();
    list.retain(|s| s != subscriber_id);
    let removed = list.len() != before;
    if list.is_empty() {
        map.remove(item_id);
    }
    removed
}

fn tear_down_locked(stream: &mut SubscriberStream) {
    stream.sender = None;
    if let Some(finished) = stream.finished.take() {
        let _ = finished.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Object, ObjectInfo};

    fn obj(bucket: &str, key: &str) -> Object {
        Object {
            id: ObjectId::new(bucket, key),
            info: ObjectInfo {
                location: "geds://x".into(),
                size: 1,
                sealed_offset: 1,
            },
        }
    }

    // Scenario D, spec.md §8: de-duplication across subscription types.
    #[test]
    fn matching_subscribers_deduplicates_across_types() {
        let registry = Registry::new();
        registry.subscribe("uuid1", "bucket3", "photos/2006/february/sample1.jpg", SubscriptionType::Object);
        registry.subscribe("uuid1", "bucket3", "", SubscriptionType::Bucket);
        registry.subscribe("uuid1", "bucket3", "photos/2006/february/", SubscriptionType::Prefix);

        let o = obj("bucket3", "photos/2006/february/sample1.jpg");
        let matched = registry.matching_subscribers(&o.id);
        assert_eq!(matched, vec!["uuid1".to_string()]);
    }

    #[test]
    fn unsubscribe_then_resubscribe_starts_clean() {
        let registry = Registry::new();
        registry.subscribe("s1", "b", "", SubscriptionType::Bucket);
        assert!(registry.unsubscribe("s1", "b", "", SubscriptionType::Bucket));
        assert!(registry.matching_subscribers(&ObjectId::new("b", "k")).is_empty());
        assert!(!registry.unsubscribe("s1", "b", "", SubscriptionType::Bucket));
    }

    #[tokio::test]
    async fn reopening_stream_signals_the_prior_one_finished() {
        let registry = Registry::new();
        let (_rx1, finished1) = registry.open_stream("s1");
        let (_rx2, _finished2) = registry.open_stream("s1");
        finished1.await.expect("first stream must be signalled finished");
    }
}
