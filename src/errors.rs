//! Client-facing status codes and the internal error types that map to them.

use std::fmt;

/// The four outcomes a client of the metadata service can observe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StatusCode {
    Ok,
    AlreadyExists,
    NotFound,
    Internal,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusCode::Ok => "OK",
            StatusCode::AlreadyExists => "ALREADY_EXISTS",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

/// Errors raised by the key-value service (bucket/object CRUD, list, lookup).
#[derive(thiserror::Error, Debug)]
pub enum KvError {
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("object `{bucket}/{key}` not found")]
    ObjectNotFound { bucket: String, key: String },
    #[error("object `{bucket}/{key}` already exists")]
    ObjectAlreadyExists { bucket: String, key: String },
    #[error("object store config for bucket `{0}` already exists")]
    ConfigAlreadyExists(String),
    #[error(transparent)]
    Persistence(#[from] crate::persistence::PersistenceError),
}

impl KvError {
    pub fn status(&self) -> StatusCode {
        match self {
            KvError::BucketAlreadyExists(_) => StatusCode::AlreadyExists,
            KvError::BucketNotFound(_) => StatusCode::NotFound,
            KvError::ObjectNotFound { .. } => StatusCode::NotFound,
            KvError::ObjectAlreadyExists { .. } => StatusCode::AlreadyExists,
            KvError::ConfigAlreadyExists(_) => StatusCode::AlreadyExists,
            KvError::Persistence(_) => StatusCode::Internal,
        }
    }
}

/// Errors raised by the pub/sub subscription registry.
///
/// `spec.md` §7 also lists an "unknown subscription type" → `INTERNAL`
/// path, but `rpc::dto::SubscriptionTypeDto` only deserializes the three
/// known variants, so that case is structurally unreachable here and has
/// no variant of its own.
#[derive(thiserror::Error, Debug)]
pub enum PubSubError {
    #[error("subscriber `{0}` has no active subscriptions")]
    SubscriberNotFound(String),
}

impl PubSubError {
    pub fn status(&self) -> StatusCode {
        match self {
            PubSubError::SubscriberNotFound(_) => StatusCode::NotFound,
        }
    }
}
