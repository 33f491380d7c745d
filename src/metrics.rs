//! Prometheus counters, gated by `PrometheusEnabled` (`spec.md` §6).
//!
//! Grounded on `prommetrics/promotheus.go`'s `Metrics` struct (one counter
//! per operation) and exposed the idiomatic Rust way: a `prometheus::Registry`
//! text-encoded at `GET /metrics`, rather than the original's push-style
//! `testCounter` ticker.

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::errors::StatusCode;

/// Per-operation request counters, labeled by outcome.
pub struct Metrics {
    registry: Registry,
    operations: IntCounterVec,
    enabled: bool,
}

impl Metrics {
    pub fn new(enabled: bool) -> Result<Self> {
        let registry = Registry::new();
        let operations = IntCounterVec::new(
            Opts::new(
                "mds_operations_total",
                "Total metadata service operations, labeled by RPC name and outcome status.",
            ),
            &["operation", "status"],
        )
        .context("constructing mds_operations_total counter vector")?;
        registry
            .register(Box::new(operations.clone()))
            .context("registering mds_operations_total")?;

        Ok(Self {
            registry,
            operations,
            enabled,
        })
    }

    /// Records one completed operation. A no-op when metrics are disabled,
    /// matching `config.Config.PrometheusEnabled` gating in the original.
    pub fn record(&self, operation: &str, status: StatusCode) {
        if !self.enabled {
            return;
        }
        self.operations
            .with_label_values(&[operation, &status.to_string()])
            .inc();
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .context("encoding metrics")?;
        String::from_utf8(buffer).context("metrics output was not valid utf-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_metrics_do_not_increment_counters() {
        let metrics = Metrics::new(false).unwrap();
        metrics.record("CreateBucket", StatusCode::Ok);
        let rendered = metrics.encode().unwrap();
        assert!(!rendered.contains("mds_operations_total"));
    }

    #[test]
    fn enabled_metrics_record_labeled_counts() {
        let metrics = Metrics::new(true).unwrap();
        metrics.record("CreateBucket", StatusCode::Ok);
        metrics.record("CreateBucket", StatusCode::AlreadyExists);
        let rendered = metrics.encode().unwrap();
        assert!(rendered.contains("operation=\"CreateBucket\""));
        assert!(rendered.contains("status=\"ALREADY_EXISTS\""));
    }
}
