use bytes::Bytes;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Notify};

use crate::cache::SpoolBuffer;
use crate::model::Priority;

struct Fragment {
    priority: Priority,
    bytes: Bytes,
}

impl PartialEq for Fragment {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}
impl Eq for Fragment {}
impl PartialOrd for Fragment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Fragment {
    // Reversed so `BinaryHeap`, a max-heap, surfaces the lowest priority first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.priority.cmp(&self.priority)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every expected priority passed through before the request settled.
    /// `response_prepared` distinguishes "at least one fragment carried
    /// bytes" (200) from "every group finished with nothing to say" (nodata).
    Completed,
    /// No new priority arrived within the streaming timeout, and at least
    /// one fragment had already opened the response. The stream is closed
    /// with whatever was delivered; this is not treated as a failure.
    TimedOutAfterResponse,
    /// The streaming timeout fired before the response was ever prepared —
    /// the 413 convention for size-related timeouts.
    TimedOutBeforeResponse,
}

struct DrainState {
    heap: BinaryHeap<Fragment>,
    next_expected: Priority,
    total_priorities: Priority,
    in_flight_bytes: u64,
    response_prepared: bool,
    done: bool,
}

/// Delivers ordered fragments to a streamed HTTP body and to the per-request
/// cache accumulator. Workers call `drain` in arbitrary completion order;
/// a fragment with priority `k` is held in the heap until every `0..k`
/// fragment has already passed through.
pub struct Drain {
    state: Mutex<DrainState>,
    body_tx: mpsc::Sender<Bytes>,
    cache_buffer: Mutex<SpoolBuffer>,
    soft_bound_bytes: u64,
    buffer_rollover_size: u64,
    tempdir: String,
    streaming_timeout: Duration,
    space_available: Notify,
    progressed: Notify,
}

impl Drain {
    pub fn new(
        total_priorities: Priority,
        soft_bound_bytes: u64,
        buffer_rollover_size: u64,
        tempdir: String,
        streaming_timeout: Duration,
        body_tx: mpsc::Sender<Bytes>,
    ) -> Self {
        Self {
            state: Mutex::new(DrainState {
                heap: BinaryHeap::new(),
                next_expected: 0,
                total_priorities,
                in_flight_bytes: 0,
                response_prepared: false,
                done: total_priorities == 0,
            }),
            body_tx,
            cache_buffer: Mutex::new(SpoolBuffer::new()),
            soft_bound_bytes,
            buffer_rollover_size,
            tempdir,
            streaming_timeout,
            space_available: Notify::new(),
            progressed: Notify::new(),
        }
    }

    pub fn response_prepared(&self) -> bool {
        self.state
            .try_lock()
            .map(|s| s.response_prepared)
            .unwrap_or(false)
    }

    /// Push one fragment. Suspends the caller while the in-flight buffer
    /// exceeds the soft byte bound; a bound of 0 disables backpressure.
    pub async fn drain(&self, priority: Priority, bytes: Bytes) {
        loop {
            {
                let state = self.state.lock().await;
                if self.soft_bound_bytes == 0 || state.in_flight_bytes <= self.soft_bound_bytes {
                    break;
                }
            }
            self.space_available.notified().await;
        }

        let mut state = self.state.lock().await;
        state.in_flight_bytes += bytes.len() as u64;
        state.heap.push(Fragment { priority, bytes });
        self.flush_ready(&mut state).await;
        self.progressed.notify_waiters();
    }

    async fn flush_ready(&self, state: &mut DrainState) {
        while let Some(top) = state.heap.peek() {
            if top.priority != state.next_expected {
                break;
            }
            let fragment = state.heap.pop().expect("peeked above");
            if !fragment.bytes.is_empty() {
                state.response_prepared = true;
            }
            state.in_flight_bytes = state.in_flight_bytes.saturating_sub(fragment.bytes.len() as u64);

            // Write-side connection errors are swallowed; cache population
            // still proceeds from the accumulator below.
            let _ = self.body_tx.send(fragment.bytes.clone()).await;
            {
                let mut buf = self.cache_buffer.lock().await;
                let _ = buf.write(fragment.bytes.as_ref(), self.buffer_rollover_size, &self.tempdir);
            }

            state.next_expected += 1;
            if state.next_expected >= state.total_priorities {
                state.done = true;
            }
        }
        self.space_available.notify_waiters();
    }

    /// Wait until every expected priority has passed through, or the
    /// streaming timeout elapses with no progress.
    pub async fn join(&self) -> DrainOutcome {
        loop {
            {
                let state = self.state.lock().await;
                if state.done {
                    return DrainOutcome::Completed;
                }
            }
            let progressed = tokio::time::timeout(self.streaming_timeout, self.progressed.notified()).await;
            if progressed.is_err() {
                let state = self.state.lock().await;
                if state.done {
                    return DrainOutcome::Completed;
                }
                return if state.response_prepared {
                    DrainOutcome::TimedOutAfterResponse
                } else {
                    DrainOutcome::TimedOutBeforeResponse
                };
            }
        }
    }

    /// Consume the accumulated response body for handing to the Cache.
    pub async fn into_cache_bytes(self) -> std::io::Result<Bytes> {
        self.cache_buffer.into_inner().into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_with(total: Priority, timeout: Duration) -> (Drain, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(total.max(1) as usize);
        (
            Drain::new(total, 0, 0, std::env::temp_dir().to_string_lossy().into_owned(), timeout, tx),
            rx,
        )
    }

    #[tokio::test]
    async fn delivers_fragments_in_priority_order_regardless_of_arrival() {
        let (drain, mut rx) = drain_with(3, Duration::from_secs(5));
        drain.drain(2, Bytes::from_static(b"c")).await;
        drain.drain(0, Bytes::from_static(b"a")).await;
        drain.drain(1, Bytes::from_static(b"b")).await;

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"a"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"b"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"c"));

        assert_eq!(drain.join().await, DrainOutcome::Completed);
    }

    #[tokio::test]
    async fn holds_later_priority_until_gap_fills() {
        let (drain, mut rx) = drain_with(2, Duration::from_millis(200));
        drain.drain(1, Bytes::from_static(b"second")).await;
        assert!(!drain.response_prepared());
        assert!(rx.try_recv().is_err());

        drain.drain(0, Bytes::from_static(b"first")).await;
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"first"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"second"));
        assert_eq!(drain.join().await, DrainOutcome::Completed);
    }

    #[tokio::test]
    async fn timeout_before_any_fragment_reports_unprepared() {
        let (drain, _rx) = drain_with(2, Duration::from_millis(20));
        assert_eq!(drain.join().await, DrainOutcome::TimedOutBeforeResponse);
    }

    #[tokio::test]
    async fn timeout_after_partial_delivery_reports_prepared() {
        let (drain, mut rx) = drain_with(3, Duration::from_millis(20));
        drain.drain(0, Bytes::from_static(b"only")).await;
        let _ = rx.recv().await;
        assert_eq!(drain.join().await, DrainOutcome::TimedOutAfterResponse);
    }

    #[tokio::test]
    async fn all_empty_fragments_leave_response_unprepared() {
        let (drain, mut rx) = drain_with(2, Duration::from_secs(5));
        drain.drain(0, Bytes::new()).await;
        drain.drain(1, Bytes::new()).await;
        let _ = rx.recv().await;
        let _ = rx.recv().await;
        assert_eq!(drain.join().await, DrainOutcome::Completed);
        assert!(!drain.response_prepared());
    }

    #[tokio::test]
    async fn cache_buffer_accumulates_delivered_bytes_in_order() {
        let (drain, mut rx) = drain_with(2, Duration::from_secs(5));
        drain.drain(1, Bytes::from_static(b"world")).await;
        drain.drain(0, Bytes::from_static(b"hello")).await;
        let _ = rx.recv().await;
        let _ = rx.recv().await;
        drain.join().await;
        let cached = drain.into_cache_bytes().await.unwrap();
        assert_eq!(cached, Bytes::from_static(b"helloworld"));
    }
}
