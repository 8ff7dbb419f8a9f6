//! Repository metrics.

use std::time::Duration;

use prometheus::{
    register_counter_vec_with_registry, register_histogram_vec_with_registry, CounterVec,
    Encoder, HistogramVec, Registry, TextEncoder,
};
use tessera_core::RepoError;

/// Receives one call per repository operation plus cache/query counters.
///
/// Calls happen on the request path, so implementations must not block.
pub trait MetricsSink: Send + Sync {
    /// One finished operation. `error` is `None` on success.
    fn record_operation(
        &self,
        operation: &str,
        collection: &str,
        duration: Duration,
        error: Option<&RepoError>,
    );

    fn record_cache_hit(&self, collection: &str);

    fn record_cache_miss(&self, collection: &str);

    /// Rows returned by a list read.
    fn record_query_count(&self, collection: &str, count: usize);
}

/// Metrics sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_operation(&self, _: &str, _: &str, _: Duration, _: Option<&RepoError>) {}
    fn record_cache_hit(&self, _: &str) {}
    fn record_cache_miss(&self, _: &str) {}
    fn record_query_count(&self, _: &str, _: usize) {}
}

/// Repository operation latency buckets (seconds)
const OPERATION_LATENCY_BUCKETS: &[f64] =
    &[0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0];

/// Rows-per-query buckets
const QUERY_ROW_BUCKETS: &[f64] = &[0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0];

/// Prometheus-backed metrics sink.
#[derive(Clone)]
pub struct PrometheusMetrics {
    /// Operation counter - labels: operation, collection, status
    pub operations_total: CounterVec,

    /// Operation duration histogram - labels: operation, collection
    pub operation_duration_seconds: HistogramVec,

    /// Cache hit counter - labels: collection
    pub cache_hits_total: CounterVec,

    /// Cache miss counter - labels: collection
    pub cache_misses_total: CounterVec,

    /// Rows returned per list query - labels: collection
    pub query_rows: HistogramVec,
}

impl PrometheusMetrics {
    /// Create and register all metrics with `registry`.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            operations_total: register_counter_vec_with_registry!(
                "tessera_repo_operations_total",
                "Total number of repository operations",
                &["operation", "collection", "status"],
                registry
            )?,

            operation_duration_seconds: register_histogram_vec_with_registry!(
                "tessera_repo_operation_duration_seconds",
                "Repository operation duration in seconds",
                &["operation", "collection"],
                OPERATION_LATENCY_BUCKETS.to_vec(),
                registry
            )?,

            cache_hits_total: register_counter_vec_with_registry!(
                "tessera_cache_hits_total",
                "Total cache hits",
                &["collection"],
                registry
            )?,

            cache_misses_total: register_counter_vec_with_registry!(
                "tessera_cache_misses_total",
                "Total cache misses",
                &["collection"],
                registry
            )?,

            query_rows: register_histogram_vec_with_registry!(
                "tessera_query_rows",
                "Rows returned per list query",
                &["collection"],
                QUERY_ROW_BUCKETS.to_vec(),
                registry
            )?,
        })
    }
}

impl MetricsSink for PrometheusMetrics {
    fn record_operation(
        &self,
        operation: &str,
        collection: &str,
        duration: Duration,
        error: Option<&RepoError>,
    ) {
        let status = error.map_or("ok", |e| e.kind.as_str());
        self.operations_total
            .with_label_values(&[operation, collection, status])
            .inc();
        self.operation_duration_seconds
            .with_label_values(&[operation, collection])
            .observe(duration.as_secs_f64());
    }

    fn record_cache_hit(&self, collection: &str) {
        self.cache_hits_total.with_label_values(&[collection]).inc();
    }

    fn record_cache_miss(&self, collection: &str) {
        self.cache_misses_total.with_label_values(&[collection]).inc();
    }

    fn record_query_count(&self, collection: &str, count: usize) {
        self.query_rows
            .with_label_values(&[collection])
            .observe(count as f64);
    }
}

/// Render every metric in `registry` in the Prometheus text format.
pub fn encode_text(registry: &Registry) -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
