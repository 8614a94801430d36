pub mod types;

pub use types::*;

use anyhow::Result;
use std::path::Path;

impl GatewayConfig {
    /// Load configuration from a file (if it exists) and apply environment
    /// variable overrides. When the file does not exist, built-in defaults
    /// are used, allowing the gateway to start with zero configuration for
    /// local development against a co-located routing service.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: GatewayConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => toml::from_str(&content)?,
                Some("json") => serde_json::from_str(&content)?,
                Some(ext) => anyhow::bail!("unsupported config format: .{ext}, use .toml or .json"),
                None => anyhow::bail!("config file has no extension, use .toml or .json"),
            }
        } else {
            tracing::info!(
                "config file not found at {}, using defaults",
                path.display()
            );
            GatewayConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!("loaded federator configuration");
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("EIDA_FEDERATOR_LISTEN") {
            self.server.listen = v;
        }
        if let Ok(v) = std::env::var("EIDA_FEDERATOR_ADMIN_LISTEN") {
            self.server.admin_listen = v;
        }

        if let Ok(v) = std::env::var("EIDA_FEDERATOR_URL_ROUTING") {
            self.upstream.url_routing = v;
        }
        if let Ok(v) = std::env::var("EIDA_FEDERATOR_ENDPOINT_REQUEST_METHOD") {
            self.upstream.endpoint_request_method = v;
        }
        if let Ok(v) = std::env::var("EIDA_FEDERATOR_PROXY_NETLOC") {
            self.upstream.proxy_netloc = Some(v);
        }
        if let Ok(v) = std::env::var("EIDA_FEDERATOR_ROUTING_CONNECTION_LIMIT") {
            if let Ok(n) = v.parse() {
                self.upstream.routing_connection_limit = n;
            }
        }
        if let Ok(v) = std::env::var("EIDA_FEDERATOR_ENDPOINT_CONNECTION_LIMIT") {
            if let Ok(n) = v.parse() {
                self.upstream.endpoint_connection_limit = n;
            }
        }

        if let Ok(v) = std::env::var("EIDA_FEDERATOR_POOL_SIZE") {
            if let Ok(n) = v.parse() {
                self.pool.pool_size = n;
            }
        }

        if let Ok(v) = std::env::var("EIDA_FEDERATOR_STREAMING_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.drain.streaming_timeout_secs = n;
            }
        }

        if let Ok(v) = std::env::var("EIDA_FEDERATOR_SPLITTING_FACTOR") {
            if let Ok(n) = v.parse() {
                self.splitting.splitting_factor = n;
            }
        }
        if let Ok(v) = std::env::var("EIDA_FEDERATOR_FALLBACK_MSEED_RECORD_SIZE") {
            if let Ok(n) = v.parse() {
                self.splitting.fallback_mseed_record_size = n;
            }
        }

        if let Ok(v) = std::env::var("EIDA_FEDERATOR_CLIENT_RETRY_BUDGET_THRESHOLD") {
            if let Ok(n) = v.parse() {
                self.request_limits.client_retry_budget_threshold = n;
            }
        }

        if let Ok(v) = std::env::var("EIDA_FEDERATOR_CACHE_BACKEND") {
            self.cache.backend = v;
        }
        if let Ok(v) = std::env::var("EIDA_FEDERATOR_CACHE_TTL_SECS") {
            if let Ok(n) = v.parse() {
                self.cache.ttl_secs = n;
            }
        }
        if let Ok(v) = std::env::var("EIDA_FEDERATOR_TEMPDIR") {
            self.cache.tempdir = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.splitting
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid splitting config: {e}"))?;

        if self.upstream.url_routing.is_empty() {
            anyhow::bail!("upstream.url_routing must not be empty");
        }
        if self.retry_budget.min_samples == 0 {
            anyhow::bail!("retry_budget.min_samples must be >= 1");
        }
        if self.retry_budget.capacity_per_url < self.retry_budget.min_samples {
            anyhow::bail!("retry_budget.capacity_per_url must be >= min_samples");
        }
        if !(0.0..=100.0).contains(&self.request_limits.client_retry_budget_threshold) {
            anyhow::bail!("request_limits.client_retry_budget_threshold must be within 0..=100");
        }
        if self.pool.pool_size == 0 {
            anyhow::bail!("pool.pool_size must be >= 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        GatewayConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_empty_routing_url() {
        let mut cfg = GatewayConfig::default();
        cfg.upstream.url_routing = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let mut cfg = GatewayConfig::default();
        cfg.request_limits.client_retry_budget_threshold = 150.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_capacity_below_min_samples() {
        let mut cfg = GatewayConfig::default();
        cfg.retry_budget.min_samples = 50;
        cfg.retry_budget.capacity_per_url = 10;
        assert!(cfg.validate().is_err());
    }
}
