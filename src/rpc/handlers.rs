//! axum handlers for the fourteen core operations plus the SSE
//! subscription stream. Grounded on the teacher's
//! `handlers/object_handlers.rs`: thin extraction, one call into the
//! service layer, one response mapping. No business logic lives here
//! (`spec.md` §1 — RPC encoding is an adapter concern only).

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode as HttpStatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::errors::{KvError, PubSubError, StatusCode};
use crate::metrics::Metrics;
use crate::model::{Object, ObjectId, ObjectStoreConfig};
use crate::processor::Processor;
use crate::rpc::dto::{
    ConnectionInfoResponse, ListBucketsResponse, ListObjectStoresResponse, ListQuery, ListResponse,
    LookupResponse, ObjectUpsertRequest, RegisterObjectStoreRequest, StatusResponse,
    SubscriptionRequest,
};

#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<Processor>,
    pub metrics: Arc<Metrics>,
}

/// Maps a core error to its client-facing status code and an HTTP
/// status, per `spec.md` §7.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let http_status = match self.status {
            StatusCode::Ok => HttpStatusCode::OK,
            StatusCode::AlreadyExists => HttpStatusCode::CONFLICT,
            StatusCode::NotFound => HttpStatusCode::NOT_FOUND,
            StatusCode::Internal => HttpStatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            http_status,
            Json(crate::rpc::dto::ErrorBody {
                status: self.status,
                message: self.message,
            }),
        )
            .into_response()
    }
}

impl From<KvError> for ApiError {
    fn from(err: KvError) -> Self {
        Self {
            status: err.status(),
            message: err.to_string(),
        }
    }
}

impl From<PubSubError> for ApiError {
    fn from(err: PubSubError) -> Self {
        Self {
            status: err.status(),
            message: err.to_string(),
        }
    }
}

fn record(metrics: &Metrics, operation: &str, status: StatusCode) {
    metrics.record(operation, status);
}

pub async fn get_connection_information(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Result<Json<ConnectionInfoResponse>, ApiError> {
    match connect_info {
        Some(ConnectInfo(addr)) => {
            record(&state.metrics, "GetConnectionInformation", StatusCode::Ok);
            Ok(Json(ConnectionInfoResponse {
                remote_address: addr.to_string(),
            }))
        }
        None => {
            record(&state.metrics, "GetConnectionInformation", StatusCode::Internal);
            Err(ApiError {
                status: StatusCode::Internal,
                message: "client IP not parseable".to_string(),
            })
        }
    }
}

pub async fn register_object_store(
    State(state): State<AppState>,
    Json(body): Json<RegisterObjectStoreRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let result = state.processor.register_object_store(body).await;
    record(
        &state.metrics,
        "RegisterObjectStore",
        result.as_ref().map(|_| StatusCode::Ok).unwrap_or_else(|e| e.status()),
    );
    result?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn list_object_stores(
    State(state): State<AppState>,
) -> Result<Json<ListObjectStoresResponse>, ApiError> {
    let mappings = state.processor.list_object_stores().await?;
    record(&state.metrics, "ListObjectStores", StatusCode::Ok);
    Ok(Json(ListObjectStoresResponse { mappings }))
}

pub async fn create_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let result = state.processor.create_bucket(&bucket).await;
    record(
        &state.metrics,
        "CreateBucket",
        result.as_ref().map(|_| StatusCode::Ok).unwrap_or_else(|e| e.status()),
    );
    result?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn delete_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let result = state.processor.delete_bucket(&bucket).await;
    record(
        &state.metrics,
        "DeleteBucket",
        result.as_ref().map(|_| StatusCode::Ok).unwrap_or_else(|e| e.status()),
    );
    result?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn list_buckets(
    State(state): State<AppState>,
) -> Result<Json<ListBucketsResponse>, ApiError> {
    let results = state.processor.list_buckets().await?;
    record(&state.metrics, "ListBuckets", StatusCode::Ok);
    Ok(Json(ListBucketsResponse { results }))
}

pub async fn lookup_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<HttpStatusCode, ApiError> {
    let result = state.processor.lookup_bucket(&bucket).await;
    record(
        &state.metrics,
        "LookupBucket",
        result.as_ref().map(|_| StatusCode::Ok).unwrap_or_else(|e| e.status()),
    );
    result?;
    Ok(HttpStatusCode::OK)
}

pub async fn create_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Json(body): Json<ObjectUpsertRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let object = Object {
        id: ObjectId::new(bucket, key),
        info: body.info,
    };
    let result = state.processor.create_object(object).await;
    record(
        &state.metrics,
        "Create",
        result.as_ref().map(|_| StatusCode::Ok).unwrap_or_else(|e| e.status()),
    );
    result?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn update_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Json(body): Json<ObjectUpsertRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let object = Object {
        id: ObjectId::new(bucket, key),
        info: body.info,
    };
    let result = state.processor.update_object(object).await;
    record(
        &state.metrics,
        "Update",
        result.as_ref().map(|_| StatusCode::Ok).unwrap_or_else(|e| e.status()),
    );
    result?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn delete_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Json<StatusResponse>, ApiError> {
    let id = ObjectId::new(bucket, key);
    let result = state.processor.delete_object(&id).await;
    record(
        &state.metrics,
        "Delete",
        result.as_ref().map(|_| StatusCode::Ok).unwrap_or_else(|e| e.status()),
    );
    result?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn delete_object_prefix(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Json<StatusResponse>, ApiError> {
    let id = ObjectId::new(bucket, key);
    let result = state.processor.delete_object_prefix(&id).await;
    record(
        &state.metrics,
        "DeletePrefix",
        result.as_ref().map(|_| StatusCode::Ok).unwrap_or_else(|e| e.status()),
    );
    result?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn lookup_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Json<LookupResponse>, ApiError> {
    let id = ObjectId::new(bucket, key);
    let result = state.processor.lookup_object(&id).await;
    record(
        &state.metrics,
        "Lookup",
        result.as_ref().map(|_| StatusCode::Ok).unwrap_or_else(|e| e.status()),
    );
    let result = result?;
    Ok(Json(LookupResponse { result }))
}

pub async fn list_objects(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let delimiter = query.delimiter.as_deref().and_then(|d| d.chars().next());
    let id = ObjectId::new(bucket, query.prefix);
    let result = state.processor.list_objects(&id, delimiter).await?;
    record(&state.metrics, "List", StatusCode::Ok);
    Ok(Json(ListResponse {
        results: result.results,
        common_prefixes: result.common_prefixes,
    }))
}

pub async fn subscribe(
    State(state): State<AppState>,
    Json(body): Json<SubscriptionRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let result =
        state
            .processor
            .pubsub()
            .subscribe(&body.subscriber_id, &body.bucket, &body.key, body.subscription_type.into());
    record(
        &state.metrics,
        "Subscribe",
        result.as_ref().map(|_| StatusCode::Ok).unwrap_or_else(|e| e.status()),
    );
    result?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    Json(body): Json<SubscriptionRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let result =
        state
            .processor
            .pubsub()
            .unsubscribe(&body.subscriber_id, &body.bucket, &body.key, body.subscription_type.into());
    record(
        &state.metrics,
        "Unsubscribe",
        result.as_ref().map(|_| StatusCode::Ok).unwrap_or_else(|e| e.status()),
    );
    result?;
    Ok(Json(StatusResponse::ok()))
}

/// `GET /metrics`, served on the separate Prometheus listener
/// (`spec.md` §6 "PrometheusPort: metrics endpoint").
pub async fn metrics(State(metrics): State<Arc<Metrics>>) -> Result<String, ApiError> {
    metrics.encode().map_err(|err| ApiError {
        status: StatusCode::Internal,
        message: err.to_string(),
    })
}

/// The idiomatic axum translation of the original's blocking server-push
/// RPC handler: the handler itself returns immediately, but the HTTP
/// response future it returns does not complete until the underlying
/// channel closes — which happens exactly when a superseding
/// `SubscribeStream` call tears the old stream down, or the client
/// disconnects (`spec.md` §4.5.4, §9).
pub async fn subscribe_stream(
    State(state): State<AppState>,
    Path(subscriber_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (rx, _finished) = state.processor.pubsub().open_stream(&subscriber_id);
    let stream = ReceiverStream::new(rx).map(|event| {
        Ok(Event::default()
            .event("publication")
            .json_data(event)
            .unwrap_or_else(|_| Event::default().event("publication-error")))
    });
    Sse::new(stream)
}
