use arc_swap::ArcSwapOption;
use bytes::Bytes;
use reqwest::Client;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::cache::Cache;
use crate::config::GatewayConfig;
use crate::drain::{Drain, DrainOutcome};
use crate::error::GatewayError;
use crate::model::{FederatedRequest, Format, HttpMethod, Priority, Route};
use crate::pool::Pool;
use crate::retry_budget::RetryBudget;
use crate::routing::RouteResolver;
use crate::upstream::EndpointWorker;

/// Nominal sample rate assumed when deriving a splitting floor from
/// `fallback_mseed_record_size`. Converting a byte record size into a time
/// span needs a sample rate, which this gateway never decodes from the
/// miniSEED stream itself (that's the point of the fallback); 20 Hz is a
/// common broadband rate and STEIM2 typically compresses to roughly one
/// byte per sample, so this is a heuristic bound on recursion depth, not an
/// exact record boundary.
const NOMINAL_SAMPLE_RATE_HZ: f64 = 20.0;
const NOMINAL_BYTES_PER_SAMPLE: f64 = 1.0;

/// Splitting floor derived from the configured record size: sub-epochs are
/// not subdivided below the duration one fallback-sized miniSEED record is
/// assumed to span. `fallback_mseed_record_size` also governs the dedup
/// chunk size used to stitch overlapping split responses back together.
fn splitting_floor(fallback_mseed_record_size: u32) -> Duration {
    let samples = fallback_mseed_record_size as f64 / NOMINAL_BYTES_PER_SAMPLE;
    let seconds = samples / NOMINAL_SAMPLE_RATE_HZ;
    Duration::from_secs_f64(seconds.max(1.0))
}

pub struct ProcessorOutcome {
    pub content_type: &'static str,
    pub content_encoding: Option<String>,
}

/// Orchestrates one client request end to end: cache lookup, route
/// resolution, dispatch-group fan-out through the Pool, ordered delivery
/// through the Drain, and finalize (RetryBudget GC + cache population).
pub struct Processor {
    resolver: RouteResolver,
    endpoint_client: Client,
    retry_budget: Arc<RetryBudget>,
    cache: Arc<Cache>,
    config: GatewayConfig,
}

impl Processor {
    pub fn new(
        config: GatewayConfig,
        routing_client: Client,
        endpoint_client: Client,
        retry_budget: Arc<RetryBudget>,
        cache: Arc<Cache>,
    ) -> Self {
        let resolver = RouteResolver::new(
            routing_client,
            config.upstream.clone(),
            config.request_limits.clone(),
            retry_budget.clone(),
        );
        Self {
            resolver,
            endpoint_client,
            retry_budget,
            cache,
            config,
        }
    }

    /// Drive `request` to completion, streaming fragments to `body_tx` as
    /// they become deliverable. Returns once every fragment has been handed
    /// to the channel (or the request fails), never once the client has
    /// finished reading — the caller owns the receiving end of `body_tx`.
    pub async fn process(
        &self,
        request: FederatedRequest,
        client_accepts_gzip: bool,
        body_tx: mpsc::Sender<Bytes>,
    ) -> Result<ProcessorOutcome, GatewayError> {
        let cache_key = Cache::key(request.format.tag(), &request.query_params, &request.stream_epochs);

        if let Some((body, encoding)) = self.cache.get_for_client(&cache_key, client_accepts_gzip).await {
            let _ = body_tx.send(body).await;
            return Ok(ProcessorOutcome {
                content_type: request.format.content_type(),
                content_encoding: encoding,
            });
        }

        self.process_uncached(request, cache_key, body_tx).await
    }

    async fn process_uncached(
        &self,
        request: FederatedRequest,
        cache_key: String,
        body_tx: mpsc::Sender<Bytes>,
    ) -> Result<ProcessorOutcome, GatewayError> {
        let routes = self.resolver.resolve(&request).await?;
        let groups = group_routes(request.format, routes)?;

        let total_priorities = groups.len() as Priority;
        let drain = Arc::new(Drain::new(
            total_priorities,
            self.config.drain.soft_bound_bytes,
            self.config.cache.buffer_rollover_size,
            self.config.cache.tempdir.clone(),
            Duration::from_secs_f64(self.config.drain.streaming_timeout_secs),
            body_tx,
        ));

        let method = match self.config.upstream.endpoint_request_method.as_str() {
            "POST" => HttpMethod::Post,
            _ => HttpMethod::Get,
        };
        let worker = Arc::new(EndpointWorker::new(
            self.endpoint_client.clone(),
            method,
            Duration::from_secs_f64(self.config.upstream.endpoint_timeout_secs),
            self.config.splitting.splitting_factor,
            splitting_floor(self.config.splitting.fallback_mseed_record_size),
            self.config.splitting.fallback_mseed_record_size,
            self.retry_budget.clone(),
        ));

        let error_slot: Arc<ArcSwapOption<GatewayError>> = Arc::new(ArcSwapOption::empty());
        let mut pool = Pool::new(self.config.pool.pool_size);

        for (priority, (_group_key, group_routes)) in groups.into_iter().enumerate() {
            let worker = worker.clone();
            let drain = drain.clone();
            let query_params = request.query_params.clone();
            let error_slot = error_slot.clone();
            let format = request.format;
            let priority = priority as Priority;

            let submitted = pool
                .submit(async move {
                    if let Err(e) = worker.run(format, group_routes, priority, &query_params, &drain).await {
                        error_slot.store(Some(Arc::new(e)));
                    }
                })
                .await;
            if submitted.is_err() {
                break;
            }
        }

        pool.join().await;

        if let Some(e) = error_slot.load_full() {
            self.finalize(&mut pool).await;
            let err = Arc::try_unwrap(e).unwrap_or_else(|shared| GatewayError::Internal(shared.to_string()));
            return Err(err);
        }

        let outcome = drain.join().await;
        self.finalize(&mut pool).await;

        match outcome {
            DrainOutcome::TimedOutBeforeResponse => Err(GatewayError::RequestTooLarge(
                "streaming timed out before any fragment was delivered".to_string(),
            )),
            DrainOutcome::Completed | DrainOutcome::TimedOutAfterResponse => {
                let prepared = drain.response_prepared();
                match Arc::try_unwrap(drain) {
                    Ok(drain) => match drain.into_cache_bytes().await {
                        Ok(bytes) => self.cache.store(cache_key, bytes).await,
                        Err(e) => tracing::warn!(error = %e, "failed to read accumulated response for caching"),
                    },
                    Err(_) => tracing::warn!("drain still shared at finalize, skipping cache population"),
                }
                if !prepared {
                    return Err(GatewayError::NoData);
                }
                Ok(ProcessorOutcome {
                    content_type: request.format.content_type(),
                    content_encoding: None,
                })
            }
        }
    }

    /// Cancel any leftover in-flight workers (a no-op once the pool already
    /// drained) and sweep stale RetryBudget observations.
    async fn finalize(&self, pool: &mut Pool) {
        pool.cancel();
        pool.join().await;
        self.retry_budget.gc();
    }
}

/// Group routes by the format-specific dispatch key (§4.7): network code for
/// availability (after extent reduction), endpoint URL for everything else.
/// Returns groups sorted by key so priority assignment is deterministic.
fn group_routes(format: Format, routes: Vec<Route>) -> Result<Vec<(String, Vec<Route>)>, GatewayError> {
    let mut groups: BTreeMap<String, Vec<Route>> = BTreeMap::new();
    match format {
        Format::Availability => {
            for route in reduce_availability_extents(routes)? {
                groups.entry(route.stream_epoch.network.clone()).or_default().push(route);
            }
        }
        _ => {
            for route in routes {
                groups.entry(route.url.to_string()).or_default().push(route);
            }
        }
    }
    Ok(groups.into_iter().collect())
}

/// Reduce routes sharing one (network.station.location.channel) to a single
/// route spanning their min-start/max-end. Fails with `NoData` when a single
/// logical stream-epoch is served by more than one endpoint.
fn reduce_availability_extents(routes: Vec<Route>) -> Result<Vec<Route>, GatewayError> {
    let mut by_nslc: BTreeMap<String, Vec<Route>> = BTreeMap::new();
    for route in routes {
        by_nslc.entry(route.stream_epoch.nslc()).or_default().push(route);
    }

    let mut reduced = Vec::with_capacity(by_nslc.len());
    for (_, group) in by_nslc {
        let urls: HashSet<&str> = group.iter().map(|r| r.url.as_ref()).collect();
        if urls.len() > 1 {
            return Err(GatewayError::NoData);
        }

        let min_start = group.iter().map(|r| r.stream_epoch.starttime).min().expect("non-empty group");
        let max_end = if group.iter().any(|r| r.stream_epoch.endtime.is_none()) {
            None
        } else {
            group.iter().map(|r| r.stream_epoch.endtime.unwrap()).max()
        };

        let mut stream_epoch = group[0].stream_epoch.clone();
        stream_epoch.starttime = min_start;
        stream_epoch.endtime = max_end;
        reduced.push(Route {
            url: group[0].url.clone(),
            stream_epoch,
        });
    }
    Ok(reduced)
}
