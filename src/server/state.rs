use arc_swap::ArcSwap;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::Cache;
use crate::config::GatewayConfig;
use crate::metrics::Metrics;
use crate::processor::Processor;
use crate::retry_budget::RetryBudget;

/// Shared gateway state, cheaply cloneable. `config` is the live snapshot
/// consulted by newly-constructed requests; the Processor, retry budget and
/// cache are themselves process-wide and long-lived.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<ArcSwap<GatewayConfig>>,
    pub metrics: Metrics,
    pub processor: Arc<Processor>,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> Self {
        let metrics = Metrics::install();

        let routing_client = build_client(config.upstream.routing_connection_limit, config.upstream.routing_timeout_secs);
        let endpoint_client = build_client(config.upstream.endpoint_connection_limit, config.upstream.endpoint_timeout_secs);

        let retry_budget = Arc::new(RetryBudget::new(config.retry_budget.clone()));
        let cache = Arc::new(Cache::new(Duration::from_secs(config.cache.ttl_secs), config.cache.compress));

        let processor = Arc::new(Processor::new(
            config.clone(),
            routing_client,
            endpoint_client,
            retry_budget,
            cache,
        ));

        Self {
            config: Arc::new(ArcSwap::new(Arc::new(config))),
            metrics,
            processor,
        }
    }
}

/// One `reqwest::Client` per pool role (routing or endpoint), each with its
/// own connection-limit and default-timeout discipline — mirrors having a
/// distinct connection pool per upstream cluster, generalized to "one client
/// per role" since this gateway has exactly two upstream roles rather than
/// an arbitrary set of named clusters.
fn build_client(connection_limit: usize, timeout_secs: f64) -> Client {
    Client::builder()
        .pool_max_idle_per_host(connection_limit)
        .timeout(Duration::from_secs_f64(timeout_secs))
        .build()
        .expect("failed to build http client")
}
