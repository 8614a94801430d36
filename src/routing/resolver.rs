use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::config::{RequestLimitsConfig, UpstreamConfig};
use crate::error::GatewayError;
use crate::model::{FederatedRequest, HttpMethod, Route};
use crate::retry_budget::RetryBudget;
use crate::routing::wire::parse_routing_table;

/// Routing-reserved query-param keys stripped before a param map is
/// forwarded to an endpoint service.
const ROUTING_ONLY_PARAMS: &[&str] = &["service", "format", "nodata"];

pub struct RouteResolver {
    client: Client,
    upstream: UpstreamConfig,
    limits: RequestLimitsConfig,
    retry_budget: Arc<RetryBudget>,
    client_retry_budget_threshold: f64,
}

impl RouteResolver {
    pub fn new(
        client: Client,
        upstream: UpstreamConfig,
        limits: RequestLimitsConfig,
        retry_budget: Arc<RetryBudget>,
    ) -> Self {
        let threshold = limits.client_retry_budget_threshold;
        Self {
            client,
            upstream,
            limits,
            retry_budget,
            client_retry_budget_threshold: threshold,
        }
    }

    pub async fn resolve(&self, request: &FederatedRequest) -> Result<Vec<Route>, GatewayError> {
        let body = self.call_routing_service(request).await?;

        let default_endtime = match request.method {
            HttpMethod::Post => Some(request.submitted),
            HttpMethod::Get => None,
        };
        let blocks = parse_routing_table(&body, default_endtime)
            .map_err(|e| GatewayError::Internal(format!("malformed routing response: {e}")))?;

        if blocks.iter().all(|b| b.stream_epochs.is_empty()) {
            return Err(GatewayError::NoData);
        }

        let mut routes = Vec::new();
        for block in blocks {
            if block.stream_epochs.is_empty() {
                continue;
            }
            let ratio = self.retry_budget.error_ratio(&block.url);
            metrics::gauge!("gateway_federator_retry_budget_error_ratio", "url" => block.url.clone()).set(ratio);
            if ratio >= self.client_retry_budget_threshold {
                metrics::counter!("gateway_federator_retry_budget_skips_total", "url" => block.url.clone()).increment(1);
                continue;
            }
            let url: Arc<str> = Arc::from(block.url.as_str());
            for stream_epoch in block.stream_epochs {
                self.validate_duration(&stream_epoch)?;
                routes.push(Route {
                    url: url.clone(),
                    stream_epoch,
                });
            }
        }

        if routes.is_empty() {
            return Err(GatewayError::NoData);
        }

        let max_total = Duration::from_secs_f64(self.limits.max_total_stream_epoch_duration_days * 86_400.0);
        let total: Duration = routes.iter().map(|r| r.stream_epoch.duration()).sum();
        if total > max_total {
            return Err(GatewayError::RequestTooLarge(format!(
                "total requested duration {:.1}d exceeds max_total_stream_epoch_duration_days {:.1}d",
                total.as_secs_f64() / 86_400.0,
                self.limits.max_total_stream_epoch_duration_days
            )));
        }

        Ok(routes)
    }

    fn validate_duration(&self, stream_epoch: &crate::model::StreamEpoch) -> Result<(), GatewayError> {
        let max_epoch = Duration::from_secs_f64(self.limits.max_stream_epoch_duration_days * 86_400.0);
        if stream_epoch.duration() > max_epoch {
            return Err(GatewayError::RequestTooLarge(format!(
                "stream-epoch {} duration {:.1}d exceeds max_stream_epoch_duration_days {:.1}d",
                stream_epoch.nslc(),
                stream_epoch.duration().as_secs_f64() / 86_400.0,
                self.limits.max_stream_epoch_duration_days
            )));
        }
        Ok(())
    }

    async fn call_routing_service(&self, request: &FederatedRequest) -> Result<String, GatewayError> {
        let start = std::time::Instant::now();
        let result = self.call_routing_service_inner(request).await;
        metrics::histogram!("gateway_federator_routing_duration_seconds").record(start.elapsed().as_secs_f64());
        let result_label = match &result {
            Ok(_) => "success",
            Err(GatewayError::NoData) => "no_data",
            Err(_) => "error",
        };
        metrics::counter!("gateway_federator_routing_requests_total", "result" => result_label).increment(1);
        result
    }

    async fn call_routing_service_inner(&self, request: &FederatedRequest) -> Result<String, GatewayError> {
        let routing_params: Vec<(&str, &str)> = request
            .query_params
            .iter()
            .filter(|(k, _)| !ROUTING_ONLY_PARAMS.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let response = match request.method {
            HttpMethod::Get => {
                let mut query = routing_params;
                query.push(("service", request.format.tag()));
                self.client
                    .get(&self.upstream.url_routing)
                    .query(&query)
                    .timeout(Duration::from_secs_f64(self.upstream.routing_timeout_secs))
                    .send()
                    .await
            }
            HttpMethod::Post => {
                let mut body = String::new();
                body.push_str("service=");
                body.push_str(request.format.tag());
                body.push('\n');
                for (k, v) in &routing_params {
                    body.push_str(k);
                    body.push('=');
                    body.push_str(v);
                    body.push('\n');
                }
                for se in &request.stream_epochs {
                    body.push_str(&se.to_sncl_line());
                    body.push('\n');
                }
                self.client
                    .post(&self.upstream.url_routing)
                    .body(body)
                    .timeout(Duration::from_secs_f64(self.upstream.routing_timeout_secs))
                    .send()
                    .await
            }
        };

        let response = response.map_err(|e| GatewayError::Internal(format!("routing request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT || status == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NoData);
        }
        if status.is_server_error() {
            return Err(GatewayError::Internal(format!("routing service returned {status}")));
        }
        if !status.is_success() {
            return Err(GatewayError::Internal(format!(
                "routing service returned unexpected status {status}"
            )));
        }

        response
            .text()
            .await
            .map_err(|e| GatewayError::Internal(format!("failed to read routing response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StreamEpoch, Timestamp};

    fn resolver(limits: RequestLimitsConfig) -> RouteResolver {
        RouteResolver::new(
            Client::new(),
            UpstreamConfig::default(),
            limits,
            Arc::new(RetryBudget::new(crate::config::RetryBudgetConfig::default())),
        )
    }

    fn epoch(days: i64) -> StreamEpoch {
        StreamEpoch {
            network: "CH".into(),
            station: "HASLI".into(),
            location: String::new(),
            channel: "LHZ".into(),
            starttime: Timestamp::from_unix_secs(0),
            endtime: Some(Timestamp::from_unix_secs(days * 86_400)),
        }
    }

    #[test]
    fn accepts_epoch_within_max_duration() {
        let r = resolver(RequestLimitsConfig {
            max_stream_epoch_duration_days: 30.0,
            ..RequestLimitsConfig::default()
        });
        assert!(r.validate_duration(&epoch(10)).is_ok());
    }

    #[test]
    fn rejects_epoch_exceeding_max_duration() {
        let r = resolver(RequestLimitsConfig {
            max_stream_epoch_duration_days: 5.0,
            ..RequestLimitsConfig::default()
        });
        assert!(matches!(
            r.validate_duration(&epoch(10)),
            Err(GatewayError::RequestTooLarge(_))
        ));
    }
}
