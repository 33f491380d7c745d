//! Durable KV backend: three logical keyspaces persisted to SQLite.
//!
//! Grounded on `storage_service.rs`'s use of `sqlx::SqlitePool` and
//! `QueryBuilder` for prefix queries in the teacher repo. Unlike the
//! teacher (which stores typed columns via `FromRow`), each keyspace here
//! stores an opaque `serde_json`-encoded blob keyed by the scheme in
//! `persistence::keys` — the core's only contract on the encoding is
//! round-trip equality (`spec.md` §4.1).

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::model::{Bucket, Object, ObjectId, ObjectStoreConfig};
use crate::persistence::keys::{decode_object_key, object_key, object_key_prefix, prefix_upper_bound};

#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    #[error("not found")]
    NotFound,
    #[error("backend error: {0}")]
    Backend(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Thin wrapper around a SQLite pool exposing the three keyspaces the core
/// consumes (`spec.md` §4.1). Cheap to clone (`Arc`-backed pool).
#[derive(Clone)]
pub struct DurableStore {
    pool: Arc<SqlitePool>,
}

impl DurableStore {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> PersistenceResult<()> {
        sqlx::query(include_str!("../../migrations/0001_init.sql"))
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    // --- ObjectStoreConfig keyspace, keyed by bucket name ---

    pub async fn put_config(&self, config: &ObjectStoreConfig) -> PersistenceResult<()> {
        let value = serde_json::to_vec(config)?;
        sqlx::query("INSERT INTO object_store_configs (bucket, value) VALUES (?, ?) \
                      ON CONFLICT(bucket) DO UPDATE SET value = excluded.value")
            .bind(&config.bucket)
            .bind(value)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_config(&self, bucket: &str) -> PersistenceResult<()> {
        sqlx::query("DELETE FROM object_store_configs WHERE bucket = ?")
            .bind(bucket)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_config(&self, bucket: &str) -> PersistenceResult<ObjectStoreConfig> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT value FROM object_store_configs WHERE bucket = ?")
                .bind(bucket)
                .fetch_optional(&*self.pool)
                .await?;
        let (value,) = row.ok_or(PersistenceError::NotFound)?;
        Ok(serde_json::from_slice(&value)?)
    }

    pub async fn iterate_configs(&self) -> PersistenceResult<Vec<ObjectStoreConfig>> {
        let rows: Vec<(Vec<u8>,)> = sqlx::query_as("SELECT value FROM object_store_configs")
            .fetch_all(&*self.pool)
            .await?;
        rows.into_iter()
            .map(|(value,)| Ok(serde_json::from_slice(&value)?))
            .collect()
    }

    // --- Bucket keyspace, keyed by bucket name ---

    pub async fn put_bucket(&self, bucket: &Bucket) -> PersistenceResult<()> {
        let value = serde_json::to_vec(bucket)?;
        sqlx::query("INSERT INTO buckets (name, value) VALUES (?, ?) \
                      ON CONFLICT(name) DO UPDATE SET value = excluded.value")
            .bind(&bucket.name)
            .bind(value)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    /// Deletes the bucket row and every object keyed under it, per
    /// `spec.md` §4.1 ("Deleting a bucket MUST iterate and delete all
    /// objects whose composite key begins with `bucket + "/"`").
    pub async fn delete_bucket(&self, name: &str) -> PersistenceResult<()> {
        let object_keys = self.iterate_keys_prefix(name, "").await?;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM buckets WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        for key in object_keys {
            let raw = object_key(name, &key);
            sqlx::query("DELETE FROM objects WHERE key = ?")
                .bind(raw)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_bucket(&self, name: &str) -> PersistenceResult<Bucket> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT value FROM buckets WHERE name = ?")
            .bind(name)
            .fetch_optional(&*self.pool)
            .await?;
        let (value,) = row.ok_or(PersistenceError::NotFound)?;
        Ok(serde_json::from_slice(&value)?)
    }

    pub async fn lookup_bucket(&self, name: &str) -> PersistenceResult<()> {
        self.get_bucket(name).await.map(|_| ())
    }

    pub async fn iterate_buckets(&self) -> PersistenceResult<Vec<Bucket>> {
        let rows: Vec<(Vec<u8>,)> = sqlx::query_as("SELECT value FROM buckets")
            .fetch_all(&*self.pool)
            .await?;
        rows.into_iter()
            .map(|(value,)| Ok(serde_json::from_slice(&value)?))
            .collect()
    }

    // --- Object keyspace, keyed by length-prefixed (bucket, key) ---

    pub async fn put_object(&self, object: &Object) -> PersistenceResult<()> {
        let key = object_key(&object.id.bucket, &object.id.key);
        let value = serde_json::to_vec(object)?;
        sqlx::query("INSERT INTO objects (key, value) VALUES (?, ?) \
                      ON CONFLICT(key) DO UPDATE SET value = excluded.value")
            .bind(key)
            .bind(value)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_object(&self, id: &ObjectId) -> PersistenceResult<()> {
        let key = object_key(&id.bucket, &id.key);
        sqlx::query("DELETE FROM objects WHERE key = ?")
            .bind(key)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_object(&self, id: &ObjectId) -> PersistenceResult<Object> {
        let key = object_key(&id.bucket, &id.key);
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT value FROM objects WHERE key = ?")
            .bind(key)
            .fetch_optional(&*self.pool)
            .await?;
        let (value,) = row.ok_or(PersistenceError::NotFound)?;
        Ok(serde_json::from_slice(&value)?)
    }

    /// Every object whose key begins with `key_prefix` inside `bucket`.
    pub async fn iterate_prefix(&self, bucket: &str, key_prefix: &str) -> PersistenceResult<Vec<Object>> {
        let rows = self.scan_prefix(bucket, key_prefix).await?;
        rows.into_iter()
            .map(|(_, value)| Ok(serde_json::from_slice(&value)?))
            .collect()
    }

    /// Every object *key* (not full objects) begining with `key_prefix`
    /// inside `bucket`, used by the list/delete-prefix paths that only
    /// need the key to compute common prefixes or to fan out deletes.
    pub async fn iterate_keys_prefix(&self, bucket: &str, key_prefix: &str) -> PersistenceResult<Vec<String>> {
        let rows = self.scan_prefix(bucket, key_prefix).await?;
        Ok(rows
            .into_iter()
            .filter_map(|(raw_key, _)| decode_object_key(&raw_key).map(|(_, key)| key))
            .collect())
    }

    async fn scan_prefix(&self, bucket: &str, key_prefix: &str) -> PersistenceResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let prefix = object_key_prefix(bucket, key_prefix);
        let rows: Vec<(Vec<u8>, Vec<u8>)> = match prefix_upper_bound(&prefix) {
            Some(upper) => {
                sqlx::query_as("SELECT key, value FROM objects WHERE key >= ? AND key < ? ORDER BY key")
                    .bind(prefix)
                    .bind(upper)
                    .fetch_all(&*self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT key, value FROM objects WHERE key >= ? ORDER BY key")
                    .bind(prefix)
                    .fetch_all(&*self.pool)
                    .await?
            }
        };
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectInfo;

    async fn in_memory_store() -> DurableStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = DurableStore::new(Arc::new(pool));
        store.ensure_schema().await.unwrap();
        store
    }

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

    #[tokio::test]
    async fn object_round_trips_and_reports_not_found_after_delete() {
        let store = in_memory_store().await;
        let o = obj("bucket1", "a/b/c.txt");
        store.put_object(&o).await.unwrap();
        assert_eq!(store.get_object(&o.id).await.unwrap(), o);
        store.delete_object(&o.id).await.unwrap();
        assert!(matches!(
            store.get_object(&o.id).await,
            Err(PersistenceError::NotFound)
        ));
    }

    #[tokio::test]
    async fn iterate_prefix_only_matches_the_named_bucket() {
        let store = in_memory_store().await;
        store.put_object(&obj("bucket1", "photos/a.jpg")).await.unwrap();
        store.put_object(&obj("bucket1", "photos/b.jpg")).await.unwrap();
        store.put_object(&obj("bucket2", "photos/a.jpg")).await.unwrap();

        let matched = store.iterate_prefix("bucket1", "photos/").await.unwrap();
        assert_eq!(matched.len(), 2);
    }

    #[tokio::test]
    async fn delete_bucket_cascades_to_its_objects_but_not_others() {
        let store = in_memory_store().await;
        store.put_bucket(&Bucket::new("bucket1")).await.unwrap();
        store.put_object(&obj("bucket1", "a")).await.unwrap();
        store.put_object(&obj("bucket2", "a")).await.unwrap();

        store.delete_bucket("bucket1").await.unwrap();

        assert!(matches!(
            store.get_bucket("bucket1").await,
            Err(PersistenceError::NotFound)
        ));
        assert!(matches!(
            store.get_object(&ObjectId::new("bucket1", "a")).await,
            Err(PersistenceError::NotFound)
        ));
        assert!(store.get_object(&ObjectId::new("bucket2", "a")).await.is_ok());
    }
}
