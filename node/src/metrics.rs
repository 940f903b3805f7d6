//! # Prometheus Metrics
//!
//! Operational metrics for the reconciliation daemon, scraped at the
//! `/metrics` endpoint on the dedicated metrics listener.
//!
//! Everything registers into a dedicated [`prometheus::Registry`] so the
//! exposition never collides with a default-registry consumer.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are Arc-backed) so it can be shared
/// across request handlers and background tasks.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Registry that owns every metric below.
    registry: Registry,
    /// Polls sent to peers.
    pub polls_sent_total: IntCounter,
    /// Responses that matched an in-flight poll and registered cleanly.
    pub responses_ok_total: IntCounter,
    /// Responses dropped by correlation (stale, misaligned, unmatched) or
    /// transport failure.
    pub responses_dropped_total: IntCounter,
    /// Status updates emitted, all variants.
    pub status_updates_total: IntCounter,
    /// Targets currently under reconciliation (finalized included).
    pub targets_tracked: IntGauge,
    /// Targets whose decision has finalized.
    pub targets_finalized: IntGauge,
    /// Peers that have answered at least one poll.
    pub known_peers: IntGauge,
    /// Round-trip latency of one poll in seconds.
    pub poll_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("snowdrift".into()), None)
            .expect("failed to create prometheus registry");

        let polls_sent_total =
            IntCounter::new("polls_sent_total", "Total polls sent to peers")
                .expect("metric creation");
        registry
            .register(Box::new(polls_sent_total.clone()))
            .expect("metric registration");

        let responses_ok_total = IntCounter::new(
            "responses_ok_total",
            "Total peer responses registered successfully",
        )
        .expect("metric creation");
        registry
            .register(Box::new(responses_ok_total.clone()))
            .expect("metric registration");

        let responses_dropped_total = IntCounter::new(
            "responses_dropped_total",
            "Total peer responses dropped by correlation or transport",
        )
        .expect("metric creation");
        registry
            .register(Box::new(responses_dropped_total.clone()))
            .expect("metric registration");

        let status_updates_total = IntCounter::new(
            "status_updates_total",
            "Total status transitions reported by the processor",
        )
        .expect("metric creation");
        registry
            .register(Box::new(status_updates_total.clone()))
            .expect("metric registration");

        let targets_tracked = IntGauge::new(
            "targets_tracked",
            "Targets currently under reconciliation, finalized included",
        )
        .expect("metric creation");
        registry
            .register(Box::new(targets_tracked.clone()))
            .expect("metric registration");

        let targets_finalized =
            IntGauge::new("targets_finalized", "Targets with a finalized decision")
                .expect("metric creation");
        registry
            .register(Box::new(targets_finalized.clone()))
            .expect("metric registration");

        let known_peers =
            IntGauge::new("known_peers", "Peers that have answered at least one poll")
                .expect("metric creation");
        registry
            .register(Box::new(known_peers.clone()))
            .expect("metric registration");

        let poll_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "poll_latency_seconds",
                "Round-trip latency of one poll in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(poll_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            polls_sent_total,
            responses_ok_total,
            responses_dropped_total,
            status_updates_total,
            targets_tracked,
            targets_finalized,
            known_peers,
            poll_latency_seconds,
        }
    }

    /// Encodes all registered metrics in the Prometheus text exposition
    /// format.
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

/// Shared metrics handle passed to axum handlers via state.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
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
