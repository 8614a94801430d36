use bytes::Bytes;
use futures_util::future::BoxFuture;
use std::time::Duration;

use crate::model::StreamEpoch;

#[derive(Debug)]
pub enum FetchOutcome {
    Success(Bytes),
    NoContent,
    TooLarge,
    Error,
}

/// Recursively fetch `stream_epoch`, splitting into `splitting_factor`
/// equal sub-epochs on a 413 until either a sub-request succeeds, the
/// sub-epoch duration drops to or below `floor`, or a sub-request at the
/// floor still returns 413 — in which case that sub-range is abandoned.
/// Returns the surviving `(sub_epoch, body)` pairs, in time order.
pub fn fetch_with_splitting<'a, F>(
    stream_epoch: StreamEpoch,
    splitting_factor: u32,
    floor: Duration,
    fetch: &'a F,
) -> BoxFuture<'a, Vec<(StreamEpoch, Bytes)>>
where
    F: Fn(StreamEpoch) -> BoxFuture<'static, FetchOutcome> + Sync + 'a,
{
    Box::pin(async move {
        let duration = stream_epoch.duration();
        match fetch(stream_epoch.clone()).await {
            FetchOutcome::Success(body) => vec![(stream_epoch, body)],
            FetchOutcome::NoContent | FetchOutcome::Error => vec![],
            FetchOutcome::TooLarge => {
                if duration <= floor {
                    return vec![];
                }
                metrics::counter!("gateway_federator_splits_total").increment(1);
                let mut results = Vec::new();
                for sub in stream_epoch.split(splitting_factor) {
                    results.extend(fetch_with_splitting(sub, splitting_factor, floor, fetch).await);
                }
                results
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Timestamp;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn epoch(start: i64, end: i64) -> StreamEpoch {
        StreamEpoch {
            network: "CH".into(),
            station: "HASLI".into(),
            location: String::new(),
            channel: "LHZ".into(),
            starttime: Timestamp::from_unix_secs(start),
            endtime: Some(Timestamp::from_unix_secs(end)),
        }
    }

    #[tokio::test]
    async fn succeeds_without_splitting_when_first_fetch_works() {
        let fetch = |se: StreamEpoch| -> BoxFuture<'static, FetchOutcome> {
            Box::pin(async move { FetchOutcome::Success(Bytes::from(se.nslc())) })
        };
        let results = fetch_with_splitting(epoch(0, 1000), 2, Duration::from_secs(1), &fetch).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn splits_on_413_until_sub_request_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let fetch = move |se: StreamEpoch| -> BoxFuture<'static, FetchOutcome> {
            let c = c.clone();
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
                if se.duration() > Duration::from_secs(250) {
                    FetchOutcome::TooLarge
                } else {
                    FetchOutcome::Success(Bytes::from_static(b"ok"))
                }
            })
        };
        let results = fetch_with_splitting(epoch(0, 1000), 2, Duration::from_secs(1), &fetch).await;
        // 1000s window halves to 500s (still too large), then to 250s (succeeds): 1 + 2 + 4 = 7 calls
        assert_eq!(results.len(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn abandons_sub_range_still_413_at_floor() {
        let fetch = |_: StreamEpoch| -> BoxFuture<'static, FetchOutcome> { Box::pin(async { FetchOutcome::TooLarge }) };
        let results = fetch_with_splitting(epoch(0, 100), 2, Duration::from_secs(60), &fetch).await;
        assert!(results.is_empty());
    }
}
