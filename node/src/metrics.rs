//! # Prometheus Metrics
//!
//! Exposes operational metrics for the coordinate node. Scraped by
//! Prometheus at the `/metrics` HTTP endpoint on the configured metrics
//! port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so
//! they do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (wraps `Arc` internally via prometheus handles) so it can
/// be shared across request handlers and background tasks.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Total number of membership shuffle rounds attempted.
    pub shuffle_rounds_total: IntCounter,
    /// Total number of Vivaldi sampling rounds completed.
    pub vivaldi_rounds_total: IntCounter,
    /// Total number of gossip exchange rounds completed.
    pub gossip_rounds_total: IntCounter,
    /// Total number of peers evicted after failed RPCs.
    pub peers_evicted_total: IntCounter,
    /// Current number of descriptors in the partial view.
    pub partial_view_size: IntGauge,
    /// Current number of records in the coordinate store.
    pub store_records: IntGauge,
    /// Current Vivaldi error confidence in [0, 1].
    pub vivaldi_error: Gauge,
    /// Histogram of measured peer round-trip times in seconds.
    pub rtt_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("atlas".into()), None)
            .expect("failed to create prometheus registry");

        let shuffle_rounds_total = IntCounter::new(
            "shuffle_rounds_total",
            "Total number of membership shuffle rounds attempted",
        )
        .expect("metric creation");
        registry
            .register(Box::new(shuffle_rounds_total.clone()))
            .expect("metric registration");

        let vivaldi_rounds_total = IntCounter::new(
            "vivaldi_rounds_total",
            "Total number of Vivaldi sampling rounds completed",
        )
        .expect("metric creation");
        registry
            .register(Box::new(vivaldi_rounds_total.clone()))
            .expect("metric registration");

        let gossip_rounds_total = IntCounter::new(
            "gossip_rounds_total",
            "Total number of gossip exchange rounds completed",
        )
        .expect("metric creation");
        registry
            .register(Box::new(gossip_rounds_total.clone()))
            .expect("metric registration");

        let peers_evicted_total = IntCounter::new(
            "peers_evicted_total",
            "Total number of peers evicted after failed RPCs",
        )
        .expect("metric creation");
        registry
            .register(Box::new(peers_evicted_total.clone()))
            .expect("metric registration");

        let partial_view_size = IntGauge::new(
            "partial_view_size",
            "Current number of descriptors in the partial view",
        )
        .expect("metric creation");
        registry
            .register(Box::new(partial_view_size.clone()))
            .expect("metric registration");

        let store_records = IntGauge::new(
            "store_records",
            "Current number of records in the coordinate store",
        )
        .expect("metric creation");
        registry
            .register(Box::new(store_records.clone()))
            .expect("metric registration");

        let vivaldi_error = Gauge::new(
            "vivaldi_error",
            "Current Vivaldi error confidence (1 = no confidence)",
        )
        .expect("metric creation");
        registry
            .register(Box::new(vivaldi_error.clone()))
            .expect("metric registration");

        let rtt_seconds = Histogram::with_opts(
            HistogramOpts::new("rtt_seconds", "Measured peer round-trip time in seconds").buckets(
                vec![
                    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
                ],
            ),
        )
        .expect("metric creation");
        registry
            .register(Box::new(rtt_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            shuffle_rounds_total,
            vivaldi_rounds_total,
            gossip_rounds_total,
            peers_evicted_total,
            partial_view_size,
            store_records,
            vivaldi_error,
            rtt_seconds,
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers via state.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
