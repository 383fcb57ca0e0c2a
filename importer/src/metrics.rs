//! Prometheus metrics of the importer.
//!
//! [`ImporterMetrics`] owns a dedicated [`Registry`] that an exporter can
//! encode into the Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, Histogram,
    HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

pub struct ImporterMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    pub blocks_verified: IntCounter,
    pub verification_failures: IntCounter,
    /// Failed `get()` calls, labelled by source type.
    pub source_failures: IntCounterVec,
    pub node_switches: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub last_verified_block: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    pub verification_duration_ms: Histogram,
    /// Block completion time minus consensus end, streamed blocks.
    pub stream_latency_ms: Histogram,
    /// Object write time minus consensus end, downloaded blocks.
    pub cloud_latency_ms: Histogram,
}

impl ImporterMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let blocks_verified = register_int_counter_with_registry!(
            Opts::new("blockfeed_blocks_verified_total", "Total blocks verified"),
            registry
        )
        .expect("failed to register blocks_verified counter");

        let verification_failures = register_int_counter_with_registry!(
            Opts::new(
                "blockfeed_verification_failures_total",
                "Total blocks rejected by the verifier"
            ),
            registry
        )
        .expect("failed to register verification_failures counter");

        let source_failures = register_int_counter_vec_with_registry!(
            Opts::new(
                "blockfeed_source_failures_total",
                "Total failed pulls per block source"
            ),
            &["source"],
            registry
        )
        .expect("failed to register source_failures counter");

        let node_switches = register_int_counter_with_registry!(
            Opts::new(
                "blockfeed_node_switches_total",
                "Total switches of the streaming block node"
            ),
            registry
        )
        .expect("failed to register node_switches counter");

        let last_verified_block = register_int_gauge_with_registry!(
            Opts::new("blockfeed_last_verified_block", "Number of the last verified block"),
            registry
        )
        .expect("failed to register last_verified_block gauge");

        // 1 ms → ~16 s
        let verification_duration_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "blockfeed_verification_duration_ms",
                "Block verification time in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(1.0, 2.0, 15).expect("valid buckets")),
            registry
        )
        .expect("failed to register verification_duration_ms histogram");

        let stream_latency_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "blockfeed_stream_latency_ms",
                "Latency of streamed blocks in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(10.0, 2.0, 15).expect("valid buckets")),
            registry
        )
        .expect("failed to register stream_latency_ms histogram");

        let cloud_latency_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "blockfeed_cloud_latency_ms",
                "Latency of downloaded blocks in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(10.0, 2.0, 15).expect("valid buckets")),
            registry
        )
        .expect("failed to register cloud_latency_ms histogram");

        Self {
            registry,
            blocks_verified,
            verification_failures,
            source_failures,
            node_switches,
            last_verified_block,
            verification_duration_ms,
            stream_latency_ms,
            cloud_latency_ms,
        }
    }

    /// Text exposition of every metric.
    pub fn encode(&self) -> String {
        let mut buffer = Vec::new();
        if TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for ImporterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_registered_metrics() {
        let metrics = ImporterMetrics::new();
        metrics.blocks_verified.inc();
        metrics.source_failures.with_label_values(&["file"]).inc();
        let text = metrics.encode();
        assert!(text.contains("blockfeed_blocks_verified_total 1"));
        assert!(text.contains("blockfeed_source_failures_total{source=\"file\"} 1"));
    }
}
