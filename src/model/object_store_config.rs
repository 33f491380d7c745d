//! Registration of an upstream object store that backs a bucket's bytes.

use serde::{Deserialize, Serialize};

/// Where the real bytes for a bucket live upstream. Unique by `bucket`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    pub endpoint_url: String,
    pub access_key: String,
    pub secret_key: String,
}
