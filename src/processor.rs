//! The processor façade: aggregates the key-value service and the
//! pub/sub engine, enqueuing a publication after every successful
//! mutation when pub/sub is enabled (`spec.md` §4.6).
//!
//! Grounded on `mdsprocessor.go`'s `Service`, which wraps `pubsub` and
//! `kvStore` the same way and gates every `s.pubsub.Publication <- …`
//! send on `config.Config.PubSubEnabled`.

use crate::errors::KvError;
use crate::kv::prefixtree::ListResult;
use crate::kv::KvService;
use crate::model::{Object, ObjectId, ObjectStoreConfig};
use crate::pubsub::{PublicationType, PubSubService};

pub struct Processor {
    kv: KvService,
    pubsub: PubSubService,
    pubsub_enabled: bool,
}

impl Processor {
    pub fn new(kv: KvService, pubsub: PubSubService, pubsub_enabled: bool) -> Self {
        Self {
            kv,
            pubsub,
            pubsub_enabled,
        }
    }

    pub fn kv(&self) -> &KvService {
        &self.kv
    }

    pub fn pubsub(&self) -> &PubSubService {
        &self.pubsub
    }

    pub async fn register_object_store(&self, config: ObjectStoreConfig) -> Result<(), KvError> {
        self.kv.register_object_store(config).await
    }

    pub async fn list_object_stores(&self) -> Result<Vec<ObjectStoreConfig>, KvError> {
        self.kv.list_object_stores().await
    }

    pub async fn create_bucket(&self, name: &str) -> Result<(), KvError> {
        self.kv.create_bucket(name).await
    }

    pub async fn delete_bucket(&self, name: &str) -> Result<(), KvError> {
        self.kv.delete_bucket(name).await
    }

    pub async fn list_buckets(&self) -> Result<Vec<String>, KvError> {
        self.kv.list_buckets().await
    }

    pub async fn lookup_bucket(&self, name: &str) -> Result<(), KvError> {
        self.kv.lookup_bucket(name).await
    }

    pub async fn create_object(&self, object: Object) -> Result<(), KvError> {
        self.kv.create_object(object.clone()).await?;
        self.publish(object, PublicationType::CreateObject).await;
        Ok(())
    }

    pub async fn update_object(&self, object: Object) -> Result<(), KvError> {
        self.kv.update_object(object.clone()).await?;
        self.publish(object, PublicationType::UpdateObject).await;
        Ok(())
    }

    pub async fn delete_object(&self, id: &ObjectId) -> Result<(), KvError> {
        let object = self.kv.lookup_object(id).await;
        self.kv.delete_object(id).await?;
        if let Ok(object) = object {
            self.publish(object, PublicationType::DeleteObject).await;
        }
        Ok(())
    }

    /// One publication per deleted object (`spec.md` §4.6).
    pub async fn delete_object_prefix(&self, prefix_id: &ObjectId) -> Result<(), KvError> {
        let deleted = self.kv.delete_object_prefix(prefix_id).await?;
        for object in deleted {
            self.publish(object, PublicationType::DeleteObject).await;
        }
        Ok(())
    }

    pub async fn lookup_object(&self, id: &ObjectId) -> Result<Object, KvError> {
        self.kv.lookup_object(id).await
    }

    pub async fn list_objects(
        &self,
        prefix_id: &ObjectId,
        delimiter: Option<char>,
    ) -> Result<ListResult, KvError> {
        self.kv.list_objects(prefix_id, delimiter).await
    }

    async fn publish(&self, object: Object, publication_type: PublicationType) {
        if self.pubsub_enabled {
            self.pubsub.publish(object, publication_type).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectInfo;
    use crate::pubsub::SubscriptionType;

    fn obj(bucket: &str, key: &str) -> Object {
        Object {
            id: ObjectId::new(bucket, key),
            info: ObjectInfo {
                location: format!("geds://{key}"),
                size: 1,
                sealed_offset: 1,
            },
        }
    }

    // Scenario D, spec.md §8: a subscriber with overlapping BUCKET/OBJECT/
    // PREFIX subscriptions receives exactly one publication per mutation.
    #[tokio::test]
    async fn subscriber_receives_one_publication_per_object_despite_triple_match() {
        let processor = Processor::new(KvService::in_memory(), PubSubService::new(), true);
        processor
            .pubsub()
            .subscribe(
                "uuid1",
                "bucket3",
                "photos/2006/february/sample1.jpg",
                SubscriptionType::Object,
            )
            .unwrap();
        processor.pubsub().subscribe("uuid1", "bucket3", "", SubscriptionType::Bucket).unwrap();
        processor
            .pubsub()
            .subscribe("uuid1", "bucket3", "photos/2006/february/", SubscriptionType::Prefix)
            .unwrap();

        let (mut rx, _finished) = processor.pubsub().open_stream("uuid1");

        for i in 1..=5 {
            processor
                .create_object(obj("bucket3", &format!("photos/2006/february/sample{i}.jpg")))
                .await
                .unwrap();
        }

        let mut received = 0;
        for _ in 0..5 {
            assert!(tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
                .await
                .expect("publication should arrive promptly")
                .is_some());
            received += 1;
        }
        assert_eq!(received, 5);
    }

    #[tokio::test]
    async fn disabled_pubsub_never_enqueues_publications() {
        let processor = Processor::new(KvService::in_memory(), PubSubService::new(), false);
        processor.pubsub().subscribe("s1", "b", "", SubscriptionType::Bucket).unwrap();
        let (mut rx, _finished) = processor.pubsub().open_stream("s1");

        processor.create_object(obj("b", "k")).await.unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_millis(100), rx.recv()).await;
        assert!(result.is_err(), "no publication should have been sent while disabled");
    }
}
