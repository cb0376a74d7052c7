//! Collection triggers.
//!
//! Rust frees an instance when its last strong reference drops, so a forced
//! collection here means "give pending releases a chance to happen": drain a
//! parked-release queue, or wait for background owners to let go. Both are
//! best-effort and a known source of flakiness when owners are slow.

use log::debug;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Requests one best-effort full collection cycle. May block.
pub trait CollectorTrigger: Send + Sync {
    fn force_collect(&self);
}

/// Trigger for hosts where dropping the last reference frees immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCollector;

impl CollectorTrigger for NoopCollector {
    fn force_collect(&self) {}
}

/// Sleeps for a settle window so other threads can drop their references.
#[derive(Debug, Clone, Copy)]
pub struct SettleCollector {
    settle: Duration,
}

impl SettleCollector {
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }
}

impl CollectorTrigger for SettleCollector {
    fn force_collect(&self) {
        thread::sleep(self.settle);
    }
}

/// Holds released objects until the next forced collection.
#[derive(Default)]
pub struct DeferredReleaseQueue {
    parked: Mutex<Vec<Box<dyn Any + Send + Sync>>>,
    cycles: AtomicUsize,
}

impl DeferredReleaseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn park<T: Any + Send + Sync>(&self, value: T) {
        self.parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(value));
    }

    pub fn pending(&self) -> usize {
        self.parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of collection cycles run so far.
    pub fn cycles(&self) -> usize {
        self.cycles.load(Ordering::SeqCst)
    }
}

impl CollectorTrigger for DeferredReleaseQueue {
    fn force_collect(&self) {
        let drained = std::mem::take(
            &mut *self
                .parked
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            "event=collect_cycle module=collector cycle={} released={}",
            cycle,
            drained.len()
        );
        drop(drained);
    }
}

#[cfg(test)]
mod tests {
    use super::{CollectorTrigger, DeferredReleaseQueue, NoopCollector, SettleCollector};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[test]
    fn deferred_queue_releases_on_collect_and_counts_cycles() {
        let queue = DeferredReleaseQueue::new();
        let value = Arc::new(7_u32);
        queue.park(value.clone());
        assert_eq!(Arc::strong_count(&value), 2);

        queue.force_collect();
        queue.force_collect();
        assert_eq!(Arc::strong_count(&value), 1);
        assert_eq!(queue.cycles(), 2);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn settle_collector_waits_for_the_window() {
        let started = Instant::now();
        SettleCollector::new(Duration::from_millis(20)).force_collect();
        assert!(started.elapsed() >= Duration::from_millis(20));
        NoopCollector.force_collect();
    }
}
