//! Route table, composing the handlers the same way the teacher's
//! `routes/routes.rs` composes its health/object/bucket routers.

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::metrics::Metrics;
use crate::rpc::handlers::{self, AppState};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/connection-info", get(handlers::get_connection_information))
        .route(
            "/v1/object-stores",
            post(handlers::register_object_store).get(handlers::list_object_stores),
        )
        .route(
            "/v1/buckets/{bucket}",
            put(handlers::create_bucket)
                .delete(handlers::delete_bucket)
                .head(handlers::lookup_bucket),
        )
        .route("/v1/buckets", get(handlers::list_buckets))
        .route(
            "/v1/buckets/{bucket}/objects/{*key}",
            put(handlers::create_object)
                .post(handlers::update_object)
                .delete(handlers::delete_object)
                .get(handlers::lookup_object),
        )
        .route(
            "/v1/buckets/{bucket}/prefix/{*key}",
            delete(handlers::delete_object_prefix),
        )
        .route("/v1/buckets/{bucket}/list", get(handlers::list_objects))
        .route(
            "/v1/subscriptions",
            post(handlers::subscribe).delete(handlers::unsubscribe),
        )
        .route(
            "/v1/subscriptions/{subscriber_id}/stream",
            get(handlers::subscribe_stream),
        )
        .with_state(state)
}

/// A minimal second router bound to its own listener on
/// `PrometheusPort`, independent of the RPC surface above.
pub fn metrics_router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(handlers::metrics))
        .with_state(metrics)
}
