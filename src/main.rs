use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod kv;
mod metrics;
mod model;
mod persistence;
mod processor;
mod pubsub;
mod rpc;

use kv::KvService;
use metrics::Metrics;
use persistence::{DurableStore, PersistencePipeline};
use processor::Processor;
use pubsub::PubSubService;
use rpc::handlers::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;
    tracing::info!(?cfg, "starting metadata service");

    if migrate {
        let pool = Arc::new(connect_sqlite(&cfg.database_url).await?);
        DurableStore::new(pool).ensure_schema().await?;
        tracing::info!("database schema ensured, exiting");
        return Ok(());
    }

    let kv = if cfg.persistent_storage_enabled {
        let pool = Arc::new(connect_sqlite(&cfg.database_url).await?);
        let store = DurableStore::new(pool);
        store.ensure_schema().await?;
        let pipeline = PersistencePipeline::new(store.clone());
        tracing::info!("persistent storage enabled, writes go through the durable KV");
        KvService::persistent(pipeline, store)
    } else {
        tracing::info!("running fully in-memory, no durable backend configured");
        KvService::in_memory()
    };

    let pubsub = PubSubService::new();
    let processor = Arc::new(Processor::new(kv, pubsub, cfg.pubsub_enabled));
    let metrics = Arc::new(Metrics::new(cfg.prometheus_enabled)?);

    let state = AppState {
        processor: processor.clone(),
        metrics: metrics.clone(),
    };
    let app = rpc::routes::router(state);

    let mds_listener = bind_with_fallback(&cfg.host, cfg.mds_port).await?;
    tracing::info!("RPC adapter listening on http://{}", mds_listener.local_addr()?);
    let serve_rpc = axum::serve(
        mds_listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    if cfg.prometheus_enabled {
        let metrics_listener = bind_with_fallback(&cfg.host, cfg.prometheus_port).await?;
        tracing::info!(
            "metrics listening on http://{}",
            metrics_listener.local_addr()?
        );
        let serve_metrics = axum::serve(metrics_listener, rpc::routes::metrics_router(metrics));

        tokio::try_join!(
            async { serve_rpc.await.map_err(anyhow::Error::from) },
            async { serve_metrics.await.map_err(anyhow::Error::from) },
        )?;
    } else {
        serve_rpc.await?;
    }

    Ok(())
}

async fn connect_sqlite(database_url: &str) -> Result<sqlx::SqlitePool> {
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&format!("sqlite://{path}?mode=rwc"))
        .await?)
}

/// Binds `host:port`, retrying on `127.0.0.1` when the requested wildcard
/// host is denied by the sandbox — matches the teacher's
/// `TcpListener::bind` fallback in its original `main.rs`.
async fn bind_with_fallback(host: &str, port: u16) -> Result<TcpListener> {
    let addr = format!("{host}:{port}");
    match TcpListener::bind(&addr).await {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == ErrorKind::PermissionDenied && matches!(host, "0.0.0.0" | "::") => {
            let fallback_addr = format!("127.0.0.1:{port}");
            tracing::warn!(%addr, %err, fallback = %fallback_addr, "permission denied, falling back");
            Ok(TcpListener::bind(&fallback_addr).await?)
        }
        Err(err) => Err(err.into()),
    }
}
