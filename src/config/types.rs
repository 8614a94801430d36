use serde::{Deserialize, Serialize};

/// Top-level federator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub drain: DrainConfig,

    #[serde(default)]
    pub splitting: SplittingConfig,

    #[serde(default)]
    pub request_limits: RequestLimitsConfig,

    #[serde(default)]
    pub retry_budget: RetryBudgetConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            pool: PoolConfig::default(),
            drain: DrainConfig::default(),
            splitting: SplittingConfig::default(),
            request_limits: RequestLimitsConfig::default(),
            retry_budget: RetryBudgetConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_admin_listen")]
    pub admin_listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            admin_listen: default_admin_listen(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_admin_listen() -> String {
    "0.0.0.0:9091".to_string()
}

/// Upstream targets and connection discipline. The routing service and the
/// endpoint services are reached through two distinct connection pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the routing service.
    #[serde(default = "default_url_routing")]
    pub url_routing: String,

    /// HTTP method used against both routing and endpoint services; the
    /// gateway otherwise preserves the client's own method end-to-end.
    #[serde(default = "default_endpoint_request_method")]
    pub endpoint_request_method: String,

    /// Netloc presented to the routing service for proxy-aware routing
    /// decisions (e.g. GeoIP-based routing hints).
    #[serde(default)]
    pub proxy_netloc: Option<String>,

    #[serde(default = "default_connection_limit")]
    pub routing_connection_limit: usize,

    #[serde(default = "default_connection_limit")]
    pub endpoint_connection_limit: usize,

    #[serde(default = "default_routing_timeout")]
    pub routing_timeout_secs: f64,

    #[serde(default = "default_endpoint_timeout")]
    pub endpoint_timeout_secs: f64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url_routing: default_url_routing(),
            endpoint_request_method: default_endpoint_request_method(),
            proxy_netloc: None,
            routing_connection_limit: default_connection_limit(),
            endpoint_connection_limit: default_connection_limit(),
            routing_timeout_secs: default_routing_timeout(),
            endpoint_timeout_secs: default_endpoint_timeout(),
        }
    }
}

fn default_url_routing() -> String {
    "http://127.0.0.1:8090/eidaws/routing/1/query".to_string()
}

fn default_endpoint_request_method() -> String {
    "GET".to_string()
}

fn default_connection_limit() -> usize {
    100
}

fn default_routing_timeout() -> f64 {
    120.0
}

fn default_endpoint_timeout() -> f64 {
    60.0
}

/// Bounded worker-pool parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
        }
    }
}

fn default_pool_size() -> usize {
    20
}

/// Drain/SortedResponse parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainConfig {
    #[serde(default = "default_streaming_timeout")]
    pub streaming_timeout_secs: f64,

    /// Soft bound on in-flight buffered fragment bytes before `drain()`
    /// blocks the calling worker (backpressure).
    #[serde(default = "default_drain_soft_bound_bytes")]
    pub soft_bound_bytes: u64,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            streaming_timeout_secs: default_streaming_timeout(),
            soft_bound_bytes: default_drain_soft_bound_bytes(),
        }
    }
}

fn default_streaming_timeout() -> f64 {
    60.0
}

fn default_drain_soft_bound_bytes() -> u64 {
    16 * 1024 * 1024
}

/// 413-driven splitting parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplittingConfig {
    #[serde(default = "default_splitting_factor")]
    pub splitting_factor: u32,

    /// Must be a positive multiple of 64 bytes.
    #[serde(default = "default_fallback_mseed_record_size")]
    pub fallback_mseed_record_size: u32,
}

impl Default for SplittingConfig {
    fn default() -> Self {
        Self {
            splitting_factor: default_splitting_factor(),
            fallback_mseed_record_size: default_fallback_mseed_record_size(),
        }
    }
}

fn default_splitting_factor() -> u32 {
    2
}

fn default_fallback_mseed_record_size() -> u32 {
    512
}

impl SplittingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.splitting_factor < 2 {
            return Err(format!(
                "splitting_factor must be >= 2, got {}",
                self.splitting_factor
            ));
        }
        if self.fallback_mseed_record_size == 0 || self.fallback_mseed_record_size % 64 != 0 {
            return Err(format!(
                "fallback_mseed_record_size must be a positive multiple of 64, got {}",
                self.fallback_mseed_record_size
            ));
        }
        Ok(())
    }
}

/// Request-size limits validated by the RouteResolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLimitsConfig {
    #[serde(default = "default_max_stream_epoch_duration_days")]
    pub max_stream_epoch_duration_days: f64,

    #[serde(default = "default_max_total_stream_epoch_duration_days")]
    pub max_total_stream_epoch_duration_days: f64,

    /// Error-ratio cutoff in percent (0..100); routes whose RetryBudget
    /// error ratio meets or exceeds this are skipped.
    #[serde(default = "default_client_retry_budget_threshold")]
    pub client_retry_budget_threshold: f64,
}

impl Default for RequestLimitsConfig {
    fn default() -> Self {
        Self {
            max_stream_epoch_duration_days: default_max_stream_epoch_duration_days(),
            max_total_stream_epoch_duration_days: default_max_total_stream_epoch_duration_days(),
            client_retry_budget_threshold: default_client_retry_budget_threshold(),
        }
    }
}

fn default_max_stream_epoch_duration_days() -> f64 {
    366.0
}

fn default_max_total_stream_epoch_duration_days() -> f64 {
    366.0 * 20.0
}

fn default_client_retry_budget_threshold() -> f64 {
    50.0
}

/// RetryBudget retention/sampling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryBudgetConfig {
    #[serde(default = "default_retry_budget_retention_secs")]
    pub retention_secs: u64,

    /// `error_ratio` returns 0 when fewer than this many observations exist.
    #[serde(default = "default_retry_budget_min_samples")]
    pub min_samples: usize,

    /// Upper bound on observations retained per endpoint URL (ring buffer).
    #[serde(default = "default_retry_budget_capacity")]
    pub capacity_per_url: usize,
}

impl Default for RetryBudgetConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retry_budget_retention_secs(),
            min_samples: default_retry_budget_min_samples(),
            capacity_per_url: default_retry_budget_capacity(),
        }
    }
}

fn default_retry_budget_retention_secs() -> u64 {
    600
}

fn default_retry_budget_min_samples() -> usize {
    10
}

fn default_retry_budget_capacity() -> usize {
    1000
}

/// Cache parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// "memory" is the only built-in backend; unrecognized values degrade to
    /// pass-through rather than failing requests.
    #[serde(default = "default_cache_backend")]
    pub backend: String,

    #[serde(default)]
    pub compress: bool,

    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    /// Bytes before a response accumulator spills to disk. 0 = never spill.
    #[serde(default = "default_buffer_rollover_size")]
    pub buffer_rollover_size: u64,

    #[serde(default = "default_tempdir")]
    pub tempdir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            compress: false,
            ttl_secs: default_cache_ttl_secs(),
            buffer_rollover_size: default_buffer_rollover_size(),
            tempdir: default_tempdir(),
        }
    }
}

fn default_cache_backend() -> String {
    "memory".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_buffer_rollover_size() -> u64 {
    8 * 1024 * 1024
}

fn default_tempdir() -> String {
    std::env::temp_dir().to_string_lossy().into_owned()
}
