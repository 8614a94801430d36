use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Histogram bucket boundaries for latency metrics (seconds).
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Histogram bucket boundaries for response body size (bytes).
const SIZE_BUCKETS: &[f64] = &[
    100.0, 500.0, 1000.0, 5000.0, 10000.0, 50000.0, 100000.0, 500000.0, 1000000.0, 10_000_000.0,
];

/// Thin handle around the global metrics recorder.
///
/// After `Metrics::install()` the `metrics` crate macros (`counter!`, `gauge!`,
/// `histogram!`) can be used anywhere in the codebase. The `PrometheusHandle`
/// is retained solely for rendering the `/metrics` endpoint.
#[derive(Clone)]
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and register metric descriptions.
    ///
    /// Must be called **once** at startup before any `counter!` / `gauge!` /
    /// `histogram!` calls.
    pub fn install() -> Self {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
                LATENCY_BUCKETS,
            )
            .expect("valid matcher")
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Full("gateway_federator_response_size_bytes".to_string()),
                SIZE_BUCKETS,
            )
            .expect("valid matcher")
            .install_recorder()
            .expect("failed to install metrics recorder");

        // --- Describe all metrics (adds HELP / TYPE lines) ---

        // request path
        describe_counter!(
            "gateway_federator_http_requests_total",
            Unit::Count,
            "Total HTTP requests processed, by format and status code"
        );
        describe_histogram!(
            "gateway_federator_http_request_duration_seconds",
            Unit::Seconds,
            "Total request duration from client perspective"
        );
        describe_gauge!(
            "gateway_federator_http_requests_in_flight",
            Unit::Count,
            "Number of requests currently being processed"
        );
        describe_histogram!(
            "gateway_federator_response_size_bytes",
            Unit::Bytes,
            "Response body size in bytes"
        );

        // routing
        describe_counter!(
            "gateway_federator_routing_requests_total",
            Unit::Count,
            "Total requests to the routing service, by result"
        );
        describe_histogram!(
            "gateway_federator_routing_duration_seconds",
            Unit::Seconds,
            "Routing service request duration"
        );

        // endpoint fetches and splitting
        describe_counter!(
            "gateway_federator_endpoint_requests_total",
            Unit::Count,
            "Total requests to dataselect/station/availability/wfcatalog endpoints, by result"
        );
        describe_counter!(
            "gateway_federator_splits_total",
            Unit::Count,
            "Total recursive time-window splits performed after a 413"
        );

        // cache
        describe_counter!(
            "gateway_federator_cache_hits_total",
            Unit::Count,
            "Total cache hits"
        );
        describe_counter!(
            "gateway_federator_cache_misses_total",
            Unit::Count,
            "Total cache misses"
        );

        // connections
        describe_counter!(
            "gateway_federator_connections_total",
            Unit::Count,
            "Total accepted TCP connections, by outcome"
        );
        describe_gauge!(
            "gateway_federator_connections_active",
            Unit::Count,
            "Number of TCP connections currently open"
        );

        // retry budget
        describe_gauge!(
            "gateway_federator_retry_budget_error_ratio",
            Unit::Count,
            "Last-observed error ratio per endpoint URL"
        );
        describe_counter!(
            "gateway_federator_retry_budget_skips_total",
            Unit::Count,
            "Total routes skipped for exceeding the client retry-budget threshold"
        );

        Self { handle }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
