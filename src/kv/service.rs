//! The key-value service: bucket/object CRUD and listing, dispatching
//! between in-memory tree state and the durable backend depending on
//! `PersistentStorageEnabled` (`spec.md` §4.4.3-§4.4.5).
//!
//! Grounded on `keyvaluestore.go`'s `Service` struct and its
//! `config.Config.PersistentStorageEnabled` branch taken by every method.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use crate::errors::KvError;
use crate::kv::bucket::BucketContainer;
use crate::kv::prefixtree::ListResult;
use crate::model::{Bucket, Object, ObjectId, ObjectStoreConfig};
use crate::persistence::{DurableStore, PersistencePipeline};

/// Durable-mode collaborators: the write-through queue plus direct read
/// access to the backend it drains into.
#[derive(Clone)]
struct Durable {
    pipeline: PersistencePipeline,
    store: DurableStore,
}

pub struct KvService {
    configs: RwLock<HashMap<String, ObjectStoreConfig>>,
    buckets: RwLock<HashMap<String, Arc<BucketContainer>>>,
    durable: Option<Durable>,
}

impl KvService {
    pub fn in_memory() -> Self {
        Self {
            configs: RwLock::new(HashMap::new()),
            buckets: RwLock::new(HashMap::new()),
            durable: None,
        }
    }

    pub fn persistent(pipeline: PersistencePipeline, store: DurableStore) -> Self {
        Self {
            configs: RwLock::new(HashMap::new()),
            buckets: RwLock::new(HashMap::new()),
            durable: Some(Durable { pipeline, store }),
        }
    }

    fn is_persistent(&self) -> bool {
        self.durable.is_some()
    }

    /// `newBucketIfNotExist` (`spec.md` §4.4.2): acquires the top-level
    /// write lock unconditionally, so every object-plane operation sees a
    /// live container regardless of whether the bucket pre-existed.
    fn new_bucket_if_not_exist(&self, name: &str) -> (Arc<BucketContainer>, bool) {
        let mut buckets = self.buckets.write().expect("buckets lock poisoned");
        if let Some(existing) = buckets.get(name) {
            return (existing.clone(), true);
        }
        let container = Arc::new(BucketContainer::new());
        buckets.insert(name.to_string(), container.clone());
        (container, false)
    }

    // --- Object store configs ---

    pub async fn register_object_store(&self, config: ObjectStoreConfig) -> Result<(), KvError> {
        if let Some(durable) = &self.durable {
            match durable.store.get_config(&config.bucket).await {
                Ok(_) => return Err(KvError::ConfigAlreadyExists(config.bucket)),
                Err(crate::persistence::PersistenceError::NotFound) => {}
                Err(err) => return Err(err.into()),
            }
            durable.pipeline.put_config(config).await;
            return Ok(());
        }
        let mut configs = self.configs.write().expect("configs lock poisoned");
        if configs.contains_key(&config.bucket) {
            return Err(KvError::ConfigAlreadyExists(config.bucket));
        }
        configs.insert(config.bucket.clone(), config);
        Ok(())
    }

    pub async fn list_object_stores(&self) -> Result<Vec<ObjectStoreConfig>, KvError> {
        if let Some(durable) = &self.durable {
            return Ok(durable.store.iterate_configs().await?);
        }
        let configs = self.configs.read().expect("configs lock poisoned");
        Ok(configs.values().cloned().collect())
    }

    // --- Buckets ---

    pub async fn create_bucket(&self, name: &str) -> Result<(), KvError> {
        if let Some(durable) = &self.durable {
            if durable.store.lookup_bucket(name).await.is_ok() {
                return Err(KvError::BucketAlreadyExists(name.to_string()));
            }
            durable.pipeline.put_bucket(Bucket::new(name)).await;
            return Ok(());
        }
        let (_, existed) = self.new_bucket_if_not_exist(name);
        if existed {
            return Err(KvError::BucketAlreadyExists(name.to_string()));
        }
        Ok(())
    }

    pub async fn delete_bucket(&self, name: &str) -> Result<(), KvError> {
        if let Some(durable) = &self.durable {
            if durable.store.lookup_bucket(name).await.is_err() {
                return Err(KvError::BucketNotFound(name.to_string()));
            }
            durable.pipeline.delete_bucket(name.to_string()).await;
            return Ok(());
        }
        let mut buckets = self.buckets.write().expect("buckets lock poisoned");
        if buckets.remove(name).is_none() {
            return Err(KvError::BucketNotFound(name.to_string()));
        }
        Ok(())
    }

    pub async fn list_buckets(&self) -> Result<Vec<String>, KvError> {
        if let Some(durable) = &self.durable {
            let buckets = durable.store.iterate_buckets().await?;
            return Ok(buckets.into_iter().map(|b| b.name).collect());
        }
        let buckets = self.buckets.read().expect("buckets lock poisoned");
        Ok(buckets.keys().cloned().collect())
    }

    pub async fn lookup_bucket(&self, name: &str) -> Result<(), KvError> {
        if let Some(durable) = &self.durable {
            return durable
                .store
                .lookup_bucket(name)
                .await
                .map_err(|_| KvError::BucketNotFound(name.to_string()));
        }
        let buckets = self.buckets.read().expect("buckets lock poisoned");
        if buckets.contains_key(name) {
            Ok(())
        } else {
            Err(KvError::BucketNotFound(name.to_string()))
        }
    }

    // --- Objects ---

    /// `Create`: fails with `ALREADY_EXISTS` if the object is already
    /// present (§6 interface table). Unlike `Update`, this checks first.
    pub async fn create_object(&self, object: Object) -> Result<(), KvError> {
        if let Some(durable) = &self.durable {
            if durable.store.get_object(&object.id).await.is_ok() {
                return Err(KvError::ObjectAlreadyExists {
                    bucket: object.id.bucket,
                    key: object.id.key,
                });
            }
            durable.pipeline.put_object(object).await;
            return Ok(());
        }
        let (container, _) = self.new_bucket_if_not_exist(&object.id.bucket);
        if container.lookup_object(&object.id).is_some() {
            return Err(KvError::ObjectAlreadyExists {
                bucket: object.id.bucket,
                key: object.id.key,
            });
        }
        container.put_object(object);
        Ok(())
    }

    /// `Update`: no pre-existence check, last write wins (§4.4.4).
    pub async fn update_object(&self, object: Object) -> Result<(), KvError> {
        if let Some(durable) = &self.durable {
            durable.pipeline.put_object(object).await;
            return Ok(());
        }
        let (container, _) = self.new_bucket_if_not_exist(&object.id.bucket);
        container.put_object(object);
        Ok(())
    }

    pub async fn delete_object(&self, id: &ObjectId) -> Result<(), KvError> {
        if let Some(durable) = &self.durable {
            if durable.store.get_object(id).await.is_err() {
                return Err(KvError::ObjectNotFound {
                    bucket: id.bucket.clone(),
                    key: id.key.clone(),
                });
            }
            durable.pipeline.delete_object(id.clone()).await;
            return Ok(());
        }
        let container = {
            let buckets = self.buckets.read().expect("buckets lock poisoned");
            buckets.get(&id.bucket).cloned()
        };
        let container = container.ok_or_else(|| KvError::ObjectNotFound {
            bucket: id.bucket.clone(),
            key: id.key.clone(),
        })?;
        if container.lookup_object(id).is_none() {
            return Err(KvError::ObjectNotFound {
                bucket: id.bucket.clone(),
                key: id.key.clone(),
            });
        }
        container.delete_object(id);
        Ok(())
    }

    /// Returns every deleted object, for publication fan-out in the
    /// processor façade (`spec.md` §4.6).
    pub async fn delete_object_prefix(&self, prefix_id: &ObjectId) -> Result<Vec<Object>, KvError> {
        if let Some(durable) = &self.durable {
            if durable.store.lookup_bucket(&prefix_id.bucket).await.is_err() {
                return Err(KvError::BucketNotFound(prefix_id.bucket.clone()));
            }
            let matched = durable
                .store
                .iterate_prefix(&prefix_id.bucket, &scan_prefix(&prefix_id.key))
                .await?;
            for object in &matched {
                durable.pipeline.delete_object(object.id.clone()).await;
            }
            return Ok(matched);
        }
        let container = {
            let buckets = self.buckets.read().expect("buckets lock poisoned");
            buckets.get(&prefix_id.bucket).cloned()
        };
        let container = container.ok_or_else(|| KvError::BucketNotFound(prefix_id.bucket.clone()))?;
        Ok(container.delete_object_prefix(prefix_id))
    }

    pub async fn lookup_object(&self, id: &ObjectId) -> Result<Object, KvError> {
        if let Some(durable) = &self.durable {
            return durable.store.get_object(id).await.map_err(|_| KvError::ObjectNotFound {
                bucket: id.bucket.clone(),
                key: id.key.clone(),
            });
        }
        let container = {
            let buckets = self.buckets.read().expect("buckets lock poisoned");
            buckets.get(&id.bucket).cloned()
        };
        container
            .and_then(|c| c.lookup_object(id))
            .ok_or_else(|| KvError::ObjectNotFound {
                bucket: id.bucket.clone(),
                key: id.key.clone(),
            })
    }

    /// A missing bucket lists as empty rather than erroring, so that a
    /// list issued right after `DeleteBucket` observes an empty result
    /// (`spec.md` §8 property 5) instead of surfacing `NOT_FOUND`.
    pub async fn list_objects(
        &self,
        prefix_id: &ObjectId,
        delimiter: Option<char>,
    ) -> Result<ListResult, KvError> {
        if let Some(durable) = &self.durable {
            return Ok(list_objects_durable(&durable.store, prefix_id, delimiter).await?);
        }
        let container = {
            let buckets = self.buckets.read().expect("buckets lock poisoned");
            buckets.get(&prefix_id.bucket).cloned()
        };
        Ok(container
            .map(|c| c.list_objects(prefix_id, delimiter))
            .unwrap_or_default())
    }
}

/// A non-empty key prefix must be scanned with a trailing delimiter so
/// that `"photos/2006"` cannot also match a sibling key like
/// `"photos/20069/x"` — `ObjectId` normalization strips the trailing
/// delimiter a caller may have supplied, so it has to be restored here.
fn scan_prefix(key: &str) -> String {
    if key.is_empty() {
        String::new()
    } else {
        format!("{key}/")
    }
}

/// Emulates `CommonPrefixes` grouping over a flat durable keyspace
/// (`spec.md` §4.4.5), since the backend has no tree structure to walk.
async fn list_objects_durable(
    store: &DurableStore,
    prefix_id: &ObjectId,
    delimiter: Option<char>,
) -> Result<ListResult, crate::persistence::PersistenceError> {
    let matched = store
        .iterate_prefix(&prefix_id.bucket, &scan_prefix(&prefix_id.key))
        .await?;

    let delimiter = match delimiter {
        Some(c) if c != '/' => return Ok(ListResult::default()),
        d => d,
    };
    if delimiter.is_none() {
        return Ok(ListResult {
            results: matched,
            common_prefixes: Vec::new(),
        });
    }

    let prefix_segment_count = prefix_id.segments().len();
    let prefix_length = prefix_segment_count + 2;

    let mut results = Vec::new();
    let mut common_prefixes = BTreeSet::new();
    for object in matched {
        let full_identifier = format!("{}/{}", prefix_id.bucket, object.id.key);
        let segments: Vec<&str> = full_identifier.split('/').collect();
        match segments.len().cmp(&prefix_length) {
            std::cmp::Ordering::Equal => results.push(object),
            std::cmp::Ordering::Greater => {
                common_prefixes.insert(format!("{}/", segments[1..prefix_length].join("/")));
                // A non-empty prefix returns its entire matched subtree as
                // `Results`, mirroring in-memory mode's `subtree_objects`
                // (`keyvaluestore.go`'s `GetAllObjectsPrefix`); an empty
                // prefix keeps the stricter split where only immediate
                // children are `Results` and deeper keys are common-prefix
                // only (spec.md §4.4.5 point 3).
                if prefix_segment_count > 0 {
                    results.push(object);
                }
            }
            std::cmp::Ordering::Less => {}
        }
    }

    Ok(ListResult {
        results,
        common_prefixes: common_prefixes.into_iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectInfo;

    fn obj(bucket: &str, key: &str) -> Object {
        Object {
            id: ObjectId::new(bucket, key),
            info: ObjectInfo {
                location: format!("geds://{key}"),
                size: 10,
                sealed_offset: 10,
            },
        }
    }

    // Scenario A, spec.md §8.
    #[tokio::test]
    async fn bucket_lifecycle_in_memory() {
        let kv = KvService::in_memory();
        assert!(kv.create_bucket("bucket1").await.is_ok());
        assert!(kv.lookup_bucket("bucket1").await.is_ok());
        assert_eq!(kv.list_buckets().await.unwrap(), vec!["bucket1".to_string()]);
        assert!(kv.delete_bucket("bucket1").await.is_ok());
        assert!(matches!(
            kv.lookup_bucket("bucket1").await,
            Err(KvError::BucketNotFound(_))
        ));
    }

    #[tokio::test]
    async fn create_bucket_twice_is_already_exists() {
        let kv = KvService::in_memory();
        kv.create_bucket("b").await.unwrap();
        assert!(matches!(
            kv.create_bucket("b").await,
            Err(KvError::BucketAlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn create_object_twice_is_already_exists_but_update_is_not() {
        let kv = KvService::in_memory();
        kv.create_object(obj("b", "k")).await.unwrap();
        assert!(matches!(
            kv.create_object(obj("b", "k")).await,
            Err(KvError::ObjectAlreadyExists { .. })
        ));
        assert!(kv.update_object(obj("b", "k")).await.is_ok());
    }

    #[tokio::test]
    async fn list_after_delete_bucket_is_empty_not_an_error() {
        let kv = KvService::in_memory();
        kv.create_object(obj("b", "k")).await.unwrap();
        kv.delete_bucket("b").await.unwrap();
        let result = kv.list_objects(&ObjectId::new("b", ""), Some('/')).await.unwrap();
        assert!(result.results.is_empty());
        assert!(result.common_prefixes.is_empty());
    }

    #[tokio::test]
    async fn delete_prefix_on_missing_bucket_is_not_found() {
        let kv = KvService::in_memory();
        let err = kv
            .delete_object_prefix(&ObjectId::new("nope", "x/"))
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::BucketNotFound(_)));
    }

    async fn persistent_kv() -> KvService {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = crate::persistence::DurableStore::new(std::sync::Arc::new(pool));
        store.ensure_schema().await.unwrap();
        let pipeline = crate::persistence::PersistencePipeline::with_capacity(store.clone(), 8);
        KvService::persistent(pipeline, store)
    }

    async fn wait_until_listed(kv: &KvService, prefix: &ObjectId, count: usize) -> ListResult {
        for _ in 0..50 {
            let result = kv.list_objects(prefix, Some('/')).await.unwrap();
            if result.results.len() == count {
                return result;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("list did not converge to {count} results in time");
    }

    // Scenario B, spec.md §8, durable-backend list path (`list_objects_durable`).
    #[tokio::test]
    async fn list_with_non_empty_prefix_returns_whole_subtree_in_persistent_mode() {
        let kv = persistent_kv().await;
        for (bucket, key) in [
            ("bucket2", "sample.jpg"),
            ("bucket2", "photos/2006/january/sample.jpg"),
            ("bucket2", "photos/2006/february/sample2.jpg"),
            ("bucket2", "photos/2006/february/sample3.jpg"),
            ("bucket2", "photos/2006/february/sample4.jpg"),
        ] {
            kv.create_object(obj(bucket, key)).await.unwrap();
        }

        let result = wait_until_listed(&kv, &ObjectId::new("bucket2", "photos/2006/"), 4).await;
        let mut prefixes = result.common_prefixes.clone();
        prefixes.sort();
        assert_eq!(
            prefixes,
            vec![
                "photos/2006/february/".to_string(),
                "photos/2006/january/".to_string(),
            ]
        );
    }
}
