//! Prometheus metrics.
//!
//! Metrics are domain-specific rather than generic event counters; use traces
//! for call-level granularity during investigations.

use causeway_abci::TelemetrySink;
use prometheus::{
    register_counter, register_gauge, register_histogram, register_histogram_vec, Counter, Gauge,
    Histogram, HistogramVec,
};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Domain-specific metrics for production monitoring.
pub struct Metrics {
    // === Consensus bridge ===
    pub abci_call_latency: HistogramVec,
    pub blocks_committed: Counter,
    pub block_height: Gauge,
    pub retention_height: Gauge,

    // === Proposals ===
    pub proposals_rejected: Counter,
    pub payload_build_failures: Counter,

    // === Storage ===
    pub store_commit_latency: Histogram,
}

impl Metrics {
    fn new() -> Self {
        // Latency buckets: 1ms to 60s
        let latency_buckets = vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
        ];

        Self {
            abci_call_latency: register_histogram_vec!(
                "causeway_abci_call_latency_seconds",
                "Latency of engine-facing calls",
                &["call"],
                latency_buckets.clone()
            )
            .unwrap(),

            blocks_committed: register_counter!(
                "causeway_blocks_committed_total",
                "Total number of blocks durably committed"
            )
            .unwrap(),

            block_height: register_gauge!(
                "causeway_block_height",
                "Latest durably committed height"
            )
            .unwrap(),

            retention_height: register_gauge!(
                "causeway_retention_height",
                "Height below which history may be pruned"
            )
            .unwrap(),

            proposals_rejected: register_counter!(
                "causeway_proposals_rejected_total",
                "Proposals rejected as content-invalid"
            )
            .unwrap(),

            payload_build_failures: register_counter!(
                "causeway_payload_build_failures_total",
                "Payload builds that fell back to an empty proposal"
            )
            .unwrap(),

            store_commit_latency: register_histogram!(
                "causeway_store_commit_latency_seconds",
                "Durable store commit latency",
                latency_buckets
            )
            .unwrap(),
        }
    }
}

/// The global metrics registry.
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

pub fn record_abci_call(call: &str, seconds: f64) {
    metrics()
        .abci_call_latency
        .with_label_values(&[call])
        .observe(seconds);
}

pub fn record_block_committed(height: u64, retention_height: u64) {
    let m = metrics();
    m.blocks_committed.inc();
    m.block_height.set(height as f64);
    m.retention_height.set(retention_height as f64);
}

pub fn record_proposal_rejected() {
    metrics().proposals_rejected.inc();
}

pub fn record_payload_build_failure() {
    metrics().payload_build_failures.inc();
}

pub fn record_store_commit(seconds: f64) {
    metrics().store_commit_latency.observe(seconds);
}

/// [`TelemetrySink`] backed by the Prometheus registry.
///
/// The service measures each engine-facing call; the metric name becomes the
/// `call` label on the shared latency histogram.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusSink;

impl TelemetrySink for PrometheusSink {
    fn measure_since(&self, metric: &'static str, start: Instant) {
        record_abci_call(metric, start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_initializes_once() {
        let first = metrics() as *const Metrics;
        let second = metrics() as *const Metrics;
        assert_eq!(first, second);
    }

    #[test]
    fn test_sink_records_without_panicking() {
        let sink = PrometheusSink;
        sink.measure_since("abci_commit", Instant::now());
        record_block_committed(42, 0);
        record_proposal_rejected();
        record_payload_build_failure();
    }
}
