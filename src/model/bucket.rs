//! Represents a bucket — the namespace objects are created within.

use serde::{Deserialize, Serialize};

/// A storage bucket. Uniquely identified by `name` within the service.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Bucket {
    pub name: String,
}

impl Bucket {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
