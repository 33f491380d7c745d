//! The pub/sub engine: a bounded publication queue, a dispatcher that
//! spawns one matcher task per publication, and the public
//! Subscribe/SubscribeStream/Unsubscribe surface over [`Registry`].
//!
//! Grounded on `pubsub.go`'s `InitService`, `runPubSubEventListeners` and
//! `matchPubSub` (`spec.md` §4.5.5).

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::errors::PubSubError;
use crate::pubsub::registry::{
    matching_id, Publication, PublicationType, Registry, StreamEvent, SubscriptionType,
};

pub const DEFAULT_PUBLICATION_CAPACITY: usize = 500;

pub struct PubSubService {
    registry: Arc<Registry>,
    publish_tx: mpsc::Sender<Publication>,
}

impl PubSubService {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_PUBLICATION_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let registry = Arc::new(Registry::new());
        let (publish_tx, publish_rx) = mpsc::channel(capacity);
        tokio::spawn(run_dispatcher(registry.clone(), publish_rx));
        Self { registry, publish_tx }
    }

    pub fn subscribe(
        &self,
        subscriber_id: &str,
        bucket: &str,
        key: &str,
        kind: SubscriptionType,
    ) -> Result<(), PubSubError> {
        self.registry.subscribe(subscriber_id, bucket, key, kind);
        Ok(())
    }

    pub fn unsubscribe(
        &self,
        subscriber_id: &str,
        bucket: &str,
        key: &str,
        kind: SubscriptionType,
    ) -> Result<(), PubSubError> {
        if self.registry.unsubscribe(subscriber_id, bucket, key, kind) {
            Ok(())
        } else {
            Err(PubSubError::SubscriberNotFound(subscriber_id.to_string()))
        }
    }

    /// Installs a fresh stream for `subscriber_id` and returns the
    /// receiver the adapter turns into a server-push stream, plus the
    /// `finished` signal. The adapter's handler must not return the RPC
    /// until `finished` resolves or its own context is cancelled
    /// (`spec.md` §4.5.4, §9).
    pub fn open_stream(&self, subscriber_id: &str) -> (mpsc::Receiver<StreamEvent>, oneshot::Receiver<()>) {
        self.registry.open_stream(subscriber_id)
    }

    /// Enqueues a publication. Called by the processor façade after a
    /// successful mutation, never by the adapter directly.
    pub async fn publish(&self, object: crate::model::Object, publication_type: PublicationType) {
        if self
            .publish_tx
            .send(Publication {
                object,
                publication_type,
            })
            .await
            .is_err()
        {
            warn!("pub/sub dispatcher is gone, dropping publication");
        }
    }
}

impl Default for PubSubService {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_dispatcher(registry: Arc<Registry>, mut publish_rx: mpsc::Receiver<Publication>) {
    while let Some(publication) = publish_rx.recv().await {
        let registry = registry.clone();
        tokio::spawn(async move {
            match_and_send(&registry, publication).await;
        });
    }
}

/// Matches one publication against the registries and delivers it to
/// every unique subscriber, serially (`spec.md` §4.5.5). Concurrency
/// across publications comes from `run_dispatcher` spawning one of these
/// per publication, not from parallelism within this function.
async fn match_and_send(registry: &Registry, publication: Publication) {
    let subscribers = registry.matching_subscribers(&publication.object.id);
    if subscribers.is_empty() {
        return;
    }

    let event = StreamEvent {
        object: publication.object.clone(),
        publication_type: publication.publication_type,
    };

    for subscriber_id in subscribers {
        if !registry.send_to(&subscriber_id, event.clone()).await {
            warn!(
                subscriber = %subscriber_id,
                object = %matching_id(&publication.object.id),
                "publication not delivered, subscriber stream unavailable"
            );
        }
    }
}
