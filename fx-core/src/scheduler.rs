//! Central scheduler (Design Note 3), replacing callback-heavy
//! `setTimeout`-style retries with a scheduler that owns one cancellation
//! handle per `{executionId, settlementId}` delayed task. Cancelling a
//! task aborts its `tokio` task directly instead of racing a boolean flag.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Runs `callback` every `period` until the returned handle is dropped or
/// `.stop()` is called. Used for the expiry sweep, execution dispatcher,
/// settlement processor, and P&L ticks — each engine owns one of these.
pub struct PeriodicTicker {
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTicker {
    pub fn start<F, Fut>(period: Duration, mut callback: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                callback().await;
            }
        });
        Self { handle: Some(handle) }
    }

    pub fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for PeriodicTicker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Keyed delayed-task registry for settlement/execution retries. Scheduling
/// a task under a key that already has one pending cancels the old task
/// first — retries never stack.
#[derive(Default)]
pub struct RetryScheduler<K: std::hash::Hash + Eq + Clone + Send + Sync + 'static> {
    pending: Arc<DashMap<K, JoinHandle<()>>>,
}

impl<K: std::hash::Hash + Eq + Clone + Send + Sync + 'static> RetryScheduler<K> {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
        }
    }

    pub fn schedule<F, Fut>(&self, key: K, delay: Duration, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        self.cancel(&key);
        let pending = self.pending.clone();
        let key_for_cleanup = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task().await;
            pending.remove(&key_for_cleanup);
        });
        self.pending.insert(key, handle);
    }

    pub fn cancel(&self, key: &K) -> bool {
        if let Some((_, handle)) = self.pending.remove(key) {
            handle.abort();
            true
        } else {
            false
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn periodic_ticker_fires_repeatedly() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let ticker = PeriodicTicker::start(Duration::from_millis(10), move || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_millis(55)).await;
        ticker.stop();
        assert!(counter.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn rescheduling_same_key_cancels_the_previous_task() {
        let counter = Arc::new(AtomicU32::new(0));
        let scheduler: RetryScheduler<&str> = RetryScheduler::new();

        let c1 = counter.clone();
        scheduler.schedule("settlement-1", Duration::from_millis(20), move || async move {
            c1.fetch_add(1, Ordering::SeqCst);
        });

        // Reschedule before the first fires; only the second should run.
        let c2 = counter.clone();
        scheduler.schedule("settlement-1", Duration::from_millis(20), move || async move {
            c2.fetch_add(10, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }
}
