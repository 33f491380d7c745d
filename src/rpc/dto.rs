//! Request/response bodies for the JSON adapter. Wire encoding is
//! explicitly out of scope for the core (`spec.md` §1), so these types
//! exist only at the `src/rpc` boundary and are never passed into
//! [`crate::processor::Processor`].

use serde::{Deserialize, Serialize};

use crate::errors::StatusCode;
use crate::model::{Object, ObjectInfo, ObjectStoreConfig};
use crate::pubsub::SubscriptionType;

/// Every OK-or-error endpoint that carries no other payload responds
/// with this envelope.
#[derive(Serialize)]
pub struct StatusResponse {
    pub status: StatusCode,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self { status: StatusCode::Ok }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
pub struct ConnectionInfoResponse {
    pub remote_address: String,
}

pub type RegisterObjectStoreRequest = ObjectStoreConfig;

#[derive(Serialize)]
pub struct ListObjectStoresResponse {
    pub mappings: Vec<ObjectStoreConfig>,
}

#[derive(Serialize)]
pub struct ListBucketsResponse {
    pub results: Vec<String>,
}

/// Body for `Create`/`Update`: the path supplies `bucket` and `key`, so
/// only the descriptor travels in the request.
#[derive(Deserialize)]
pub struct ObjectUpsertRequest {
    pub info: ObjectInfo,
}

#[derive(Serialize)]
pub struct LookupResponse {
    pub result: Object,
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub prefix: String,
    pub delimiter: Option<String>,
}

#[derive(Serialize)]
pub struct ListResponse {
    pub results: Vec<Object>,
    pub common_prefixes: Vec<String>,
}

/// Wire shape of a subscription type, mirroring the `BUCKET`/`OBJECT`/
/// `PREFIX` enum values in `spec.md` §4.5.1.
#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionTypeDto {
    Bucket,
    Object,
    Prefix,
}

impl From<SubscriptionTypeDto> for SubscriptionType {
    fn from(value: SubscriptionTypeDto) -> Self {
        match value {
            SubscriptionTypeDto::Bucket => SubscriptionType::Bucket,
            SubscriptionTypeDto::Object => SubscriptionType::Object,
            SubscriptionTypeDto::Prefix => SubscriptionType::Prefix,
        }
    }
}

/// Body for `Subscribe` and `Unsubscribe` — both take the same
/// `SubscriptionEvent` shape (`spec.md` §6).
#[derive(Deserialize)]
pub struct SubscriptionRequest {
    pub subscriber_id: String,
    pub bucket: String,
    #[serde(default)]
    pub key: String,
    #[serde(rename = "type")]
    pub subscription_type: SubscriptionTypeDto,
}
