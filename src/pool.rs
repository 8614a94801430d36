use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Bounded-concurrency job runner, one per request. `submit` suspends the
/// caller once `max_workers` jobs are in flight; `join` waits for everything
/// submitted so far to finish; `cancel` aborts every in-flight job and
/// causes any submitter still waiting on a permit to unblock with
/// `PoolCancelled`.
pub struct Pool {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<()>,
    cancelled: Arc<AtomicBool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolCancelled;

impl Pool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers)),
            tasks: JoinSet::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Enqueue `job`. Suspends until a worker slot is free. FIFO with
    /// respect to other suspended submitters, since `tokio::sync::Semaphore`
    /// wakes waiters in acquisition order.
    pub async fn submit<F>(&mut self, job: F) -> Result<(), PoolCancelled>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(PoolCancelled);
        }
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolCancelled)?;
        let cancelled = self.cancelled.clone();
        self.tasks.spawn(async move {
            if !cancelled.load(Ordering::Acquire) {
                job.await;
            }
            drop(permit);
        });
        Ok(())
    }

    /// Wait for every job submitted so far to finish.
    pub async fn join(&mut self) {
        while self.tasks.join_next().await.is_some() {}
    }

    /// Abort every in-flight job and reject further submissions.
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        self.semaphore.close();
        self.tasks.abort_all();
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn submit_and_join_runs_all_jobs() {
        let mut pool = Pool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            pool.submit(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }
        pool.join().await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn submit_blocks_when_pool_is_full() {
        let mut pool = Pool::new(1);
        let started = Arc::new(AtomicUsize::new(0));
        let s1 = started.clone();
        pool.submit(async move {
            s1.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
        })
        .await
        .unwrap();

        let s2 = started.clone();
        let submit_fut = pool.submit(async move {
            s2.fetch_add(1, Ordering::SeqCst);
        });
        // With max_workers=1 and one job still sleeping, this submit should
        // not resolve until the first job frees its permit.
        tokio::time::timeout(Duration::from_millis(10), submit_fut)
            .await
            .expect_err("second submit should still be blocked");
    }

    #[tokio::test]
    async fn cancel_rejects_further_submissions() {
        let mut pool = Pool::new(2);
        pool.cancel();
        let result = pool.submit(async {}).await;
        assert_eq!(result, Err(PoolCancelled));
    }

    #[tokio::test]
    async fn cancel_aborts_in_flight_jobs() {
        let mut pool = Pool::new(2);
        let completed = Arc::new(AtomicBool::new(false));
        let flag = completed.clone();
        pool.submit(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            flag.store(true, Ordering::SeqCst);
        })
        .await
        .unwrap();
        pool.cancel();
        pool.join().await;
        assert!(!completed.load(Ordering::SeqCst));
    }
}
