use bytes::{Bytes, BytesMut};
use futures_util::future::BoxFuture;
use reqwest::Client;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::error::GatewayError;
use crate::model::{Format, HttpMethod, Priority, Route, StreamEpoch};
use crate::retry_budget::RetryBudget;
use crate::upstream::formats;
use crate::upstream::splitter::{fetch_with_splitting, FetchOutcome};
use crate::drain::Drain;

/// Fetches and merges every route in one dispatch group, then pushes a
/// single ordered fragment onto the Drain. One `EndpointWorker` instance is
/// shared read-only across the Pool's concurrent jobs for a request.
pub struct EndpointWorker {
    client: Client,
    method: HttpMethod,
    endpoint_timeout: Duration,
    splitting_factor: u32,
    splitting_floor: Duration,
    record_size: u32,
    retry_budget: Arc<RetryBudget>,
}

impl EndpointWorker {
    pub fn new(
        client: Client,
        method: HttpMethod,
        endpoint_timeout: Duration,
        splitting_factor: u32,
        splitting_floor: Duration,
        record_size: u32,
        retry_budget: Arc<RetryBudget>,
    ) -> Self {
        Self {
            client,
            method,
            endpoint_timeout,
            splitting_factor,
            splitting_floor,
            record_size,
            retry_budget,
        }
    }

    /// Run one dispatch group: for availability/station, `routes` must all
    /// share the same endpoint URL (the Processor reduces them to that
    /// before dispatch); mixed URLs there are a federation failure.
    pub async fn run(
        &self,
        format: Format,
        routes: Vec<Route>,
        priority: Priority,
        query_params: &BTreeMap<String, String>,
        drain: &Drain,
    ) -> Result<(), GatewayError> {
        if matches!(format, Format::Availability | Format::Station) {
            let mut urls_by_nslc: BTreeMap<String, HashSet<&str>> = BTreeMap::new();
            for route in &routes {
                urls_by_nslc
                    .entry(route.stream_epoch.nslc())
                    .or_default()
                    .insert(route.url.as_ref());
            }
            if urls_by_nslc.values().any(|urls| urls.len() > 1) {
                // A single logical stream-epoch served by more than one
                // endpoint needs reassembly this worker doesn't implement.
                return Err(GatewayError::NoData);
            }
        }

        let mut route_outputs: Vec<(String, Bytes)> = Vec::new();
        for route in &routes {
            let body = if format.can_split() {
                let subs = self.fetch_splittable(route, query_params).await;
                if subs.is_empty() {
                    continue;
                }
                self.merge_sub_epoch_bodies(format, subs)?
            } else {
                match self.fetch_single(route, query_params).await {
                    FetchOutcome::Success(body) => body,
                    _ => continue,
                }
            };
            route_outputs.push((route.stream_epoch.nslc(), body));
        }

        let merged = self.merge_route_bodies(format, route_outputs)?;

        let non_empty = match format {
            Format::Dataselect => formats::dataselect::is_non_empty(&merged),
            Format::Station => formats::station::is_non_empty(&merged),
            Format::Availability => formats::availability::is_non_empty(&merged),
            Format::WfCatalog => formats::wfcatalog::is_non_empty(&merged),
        };
        if !non_empty {
            tracing::debug!(priority, "dispatch group produced no content");
        }
        // Always drain, even empty: every dispatch group owns exactly one
        // priority slot, and a group that never drains leaves a permanent
        // gap the Drain can only resolve by timing out.
        drain.drain(priority, merged).await;
        Ok(())
    }

    async fn fetch_splittable(
        &self,
        route: &Route,
        query_params: &BTreeMap<String, String>,
    ) -> Vec<(StreamEpoch, Bytes)> {
        let client = self.client.clone();
        let method = self.method;
        let timeout = self.endpoint_timeout;
        let base_url = route.url.to_string();
        let retry_budget = self.retry_budget.clone();
        let params = query_params.clone();

        let fetch = move |se: StreamEpoch| -> BoxFuture<'static, FetchOutcome> {
            let client = client.clone();
            let base_url = base_url.clone();
            let retry_budget = retry_budget.clone();
            let params = params.clone();
            Box::pin(async move { do_fetch(&client, &base_url, method, timeout, &params, &se, &retry_budget).await })
        };

        fetch_with_splitting(route.stream_epoch.clone(), self.splitting_factor, self.splitting_floor, &fetch).await
    }

    async fn fetch_single(&self, route: &Route, query_params: &BTreeMap<String, String>) -> FetchOutcome {
        do_fetch(
            &self.client,
            &route.url,
            self.method,
            self.endpoint_timeout,
            query_params,
            &route.stream_epoch,
            &self.retry_budget,
        )
        .await
    }

    fn merge_sub_epoch_bodies(
        &self,
        format: Format,
        subs: Vec<(StreamEpoch, Bytes)>,
    ) -> Result<Bytes, GatewayError> {
        match format {
            Format::Dataselect => {
                let mut out = BytesMut::new();
                let mut seen = HashSet::new();
                let record_size = self.record_size_hint();
                for (_, body) in subs {
                    formats::dataselect::append_deduped(&mut out, &mut seen, &body, record_size);
                }
                Ok(out.freeze())
            }
            Format::WfCatalog => {
                let bodies: Vec<Bytes> = subs.into_iter().map(|(_, b)| b).collect();
                formats::wfcatalog::merge_arrays(&bodies).map_err(GatewayError::Internal)
            }
            Format::Station | Format::Availability => {
                unreachable!("station/availability never split")
            }
        }
    }

    fn merge_route_bodies(&self, format: Format, mut outputs: Vec<(String, Bytes)>) -> Result<Bytes, GatewayError> {
        match format {
            Format::Dataselect => {
                outputs.sort_by(|a, b| a.0.cmp(&b.0));
                let mut out = BytesMut::new();
                for (_, body) in &outputs {
                    out.extend_from_slice(body);
                }
                Ok(out.freeze())
            }
            Format::WfCatalog => {
                outputs.sort_by(|a, b| a.0.cmp(&b.0));
                let bodies: Vec<Bytes> = outputs.into_iter().map(|(_, b)| b).collect();
                formats::wfcatalog::merge_arrays(&bodies).map_err(GatewayError::Internal)
            }
            Format::Station | Format::Availability => Ok(formats::station::merge_by_nslc(outputs)),
        }
    }

    fn record_size_hint(&self) -> usize {
        // Blockette 1000's record-size field is not decoded here (payload
        // parsing is out of scope); the configured fallback stands in for it.
        self.record_size as usize
    }
}

async fn do_fetch(
    client: &Client,
    base_url: &str,
    method: HttpMethod,
    timeout: Duration,
    query_params: &BTreeMap<String, String>,
    stream_epoch: &StreamEpoch,
    retry_budget: &RetryBudget,
) -> FetchOutcome {
    let url = format!("{}/query", base_url.trim_end_matches('/'));
    let mut params: Vec<(String, String)> = query_params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

    let sent = match method {
        HttpMethod::Get => {
            params.push(("network".into(), stream_epoch.network.clone()));
            params.push(("station".into(), stream_epoch.station.clone()));
            params.push(("location".into(), stream_epoch.location.clone()));
            params.push(("channel".into(), stream_epoch.channel.clone()));
            params.push(("starttime".into(), stream_epoch.starttime.to_string()));
            if let Some(et) = stream_epoch.endtime {
                params.push(("endtime".into(), et.to_string()));
            }
            client.get(&url).query(&params).timeout(timeout).send().await
        }
        HttpMethod::Post => {
            let mut body = String::new();
            for (k, v) in &params {
                body.push_str(k);
                body.push('=');
                body.push_str(v);
                body.push('\n');
            }
            body.push_str(&stream_epoch.to_sncl_line());
            body.push('\n');
            client.post(&url).body(body).timeout(timeout).send().await
        }
    };

    let response = match sent {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(url = %base_url, error = %e, "endpoint request failed, recording as 503");
            retry_budget.record(base_url, true);
            metrics::counter!("gateway_federator_endpoint_requests_total", "result" => "connect_error").increment(1);
            return FetchOutcome::Error;
        }
    };

    let status = response.status();
    let code = status.as_u16();
    let is_error = status.is_server_error() || (status.is_client_error() && code != 204 && code != 404);
    retry_budget.record(base_url, is_error);

    let outcome = match code {
        200 => match response.bytes().await {
            Ok(body) => FetchOutcome::Success(body),
            Err(_) => FetchOutcome::Error,
        },
        204 | 404 => FetchOutcome::NoContent,
        413 => FetchOutcome::TooLarge,
        other => {
            tracing::debug!(url = %base_url, status = other, "endpoint returned non-success status");
            FetchOutcome::Error
        }
    };

    let result_label = match outcome {
        FetchOutcome::Success(_) => "success",
        FetchOutcome::NoContent => "no_content",
        FetchOutcome::TooLarge => "too_large",
        FetchOutcome::Error => "error",
    };
    metrics::counter!("gateway_federator_endpoint_requests_total", "result" => result_label).increment(1);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryBudgetConfig;
    use crate::model::Timestamp;

    fn worker() -> EndpointWorker {
        EndpointWorker::new(
            Client::new(),
            HttpMethod::Get,
            Duration::from_secs(30),
            2,
            Duration::from_secs(1),
            512,
            Arc::new(RetryBudget::new(RetryBudgetConfig::default())),
        )
    }

    fn epoch() -> StreamEpoch {
        StreamEpoch {
            network: "CH".into(),
            station: "HASLI".into(),
            location: String::new(),
            channel: "LHZ".into(),
            starttime: Timestamp::from_unix_secs(0),
            endtime: Some(Timestamp::from_unix_secs(1000)),
        }
    }

    #[test]
    fn dataselect_sub_epoch_merge_concatenates_bodies() {
        let w = worker();
        let subs = vec![
            (epoch(), Bytes::from_static(b"aaaa")),
            (epoch(), Bytes::from_static(b"bbbb")),
        ];
        let merged = w.merge_sub_epoch_bodies(Format::Dataselect, subs).unwrap();
        assert_eq!(merged.len(), 8);
    }

    #[test]
    fn wfcatalog_sub_epoch_merge_combines_json_arrays() {
        let w = worker();
        let subs = vec![
            (epoch(), Bytes::from_static(br#"[{"id":1}]"#)),
            (epoch(), Bytes::from_static(br#"[{"id":2}]"#)),
        ];
        let merged = w.merge_sub_epoch_bodies(Format::WfCatalog, subs).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&merged).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }

    #[test]
    fn route_bodies_merge_by_nslc_for_station() {
        let w = worker();
        let outputs = vec![
            ("CH.SOLUN.-.LHZ".to_string(), Bytes::from_static(b"B")),
            ("CH.HASLI.-.LHZ".to_string(), Bytes::from_static(b"A")),
        ];
        let merged = w.merge_route_bodies(Format::Station, outputs).unwrap();
        assert_eq!(merged, Bytes::from_static(b"AB"));
    }

    #[test]
    fn dataselect_route_bodies_concatenate_in_nslc_order_regardless_of_arrival_order() {
        let w = worker();
        let outputs = vec![
            ("CH.SOLUN.-.LHZ".to_string(), Bytes::from_static(b"B")),
            ("CH.HASLI.-.LHZ".to_string(), Bytes::from_static(b"A")),
        ];
        let merged = w.merge_route_bodies(Format::Dataselect, outputs).unwrap();
        assert_eq!(merged, Bytes::from_static(b"AB"));
    }

    #[test]
    fn wfcatalog_route_bodies_merge_in_nslc_order_regardless_of_arrival_order() {
        let w = worker();
        let outputs = vec![
            ("CH.SOLUN.-.LHZ".to_string(), Bytes::from_static(br#"[{"id":2}]"#)),
            ("CH.HASLI.-.LHZ".to_string(), Bytes::from_static(br#"[{"id":1}]"#)),
        ];
        let merged = w.merge_route_bodies(Format::WfCatalog, outputs).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&merged).unwrap();
        let arr = parsed.as_array().unwrap();
        assert_eq!(arr[0]["id"], 1);
        assert_eq!(arr[1]["id"], 2);
    }
}
