//! Core data models for the metadata service.
//!
//! These entities describe *where* an object's bytes live and how big it
//! is — never the bytes themselves. They serialize via `serde` both for
//! the JSON adapter surface and for the durable KV value encoding.

pub mod bucket;
pub mod object;
pub mod object_store_config;

pub use bucket::Bucket;
pub use object::{Object, ObjectId, ObjectInfo};
pub use object_store_config::ObjectStoreConfig;
