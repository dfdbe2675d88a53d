//! Readiness gating for outbound traffic.
//!
//! Work is deferred by re-checking a predicate on a fixed interval rather
//! than by blocking. Two barriers exist per client: one waits for the
//! connection to leave `Connecting`, the other waits for the manifest.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Default re-check interval while waiting for the connection to open.
pub const DEFAULT_OPEN_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Default re-check interval while waiting for the manifest.
pub const DEFAULT_READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Shortest accepted re-check interval; zero would spin.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Defers work until a predicate holds, re-checking every `interval`.
///
/// There is no backoff, no retry limit and no cancellation: a predicate that
/// never becomes true keeps the waiter parked forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessBarrier {
    name: &'static str,
    interval: Duration,
}

impl ReadinessBarrier {
    pub const fn new(name: &'static str, interval: Duration) -> Self {
        Self { name, interval }
    }

    /// Wait until `predicate()` returns true.
    ///
    /// Returns without yielding when the predicate already holds.
    pub async fn wait_until<P>(&self, predicate: P)
    where
        P: Fn() -> bool,
    {
        if predicate() {
            return;
        }
        log::trace!(
            target: "dce::readiness",
            "{} barrier not satisfied, re-checking every {:?}",
            self.name,
            self.interval
        );
        loop {
            tokio::time::sleep(self.interval).await;
            if predicate() {
                return;
            }
        }
    }

    /// Run `work` once `predicate()` holds.
    pub async fn run<P, F, Fut>(&self, predicate: P, work: F) -> Fut::Output
    where
        P: Fn() -> bool,
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        self.wait_until(predicate).await;
        work().await
    }
}

/// Monotonic flag: false until the manifest has been installed, then true
/// for the rest of the process.
#[derive(Debug, Default)]
pub struct ReadinessFlag(AtomicBool);

impl ReadinessFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Set the flag. Returns true on the false→true transition only.
    pub fn set(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn readiness_flag_transitions_once() {
        let flag = ReadinessFlag::new();
        assert!(!flag.is_set());
        assert!(flag.set(), "first set should report the transition");
        assert!(flag.is_set());
        assert!(!flag.set(), "second set should not report a transition");
        assert!(flag.is_set(), "flag never resets");
    }

    #[tokio::test(start_paused = true)]
    async fn run_executes_immediately_when_predicate_holds() {
        let barrier = ReadinessBarrier::new("test", Duration::from_millis(500));
        let started = tokio::time::Instant::now();

        let value = barrier.run(|| true, || async { 7 }).await;

        assert_eq!(value, 7);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn run_rechecks_on_interval_until_predicate_holds() {
        let barrier = ReadinessBarrier::new("test", Duration::from_millis(500));
        let checks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&checks);
        let started = tokio::time::Instant::now();

        barrier
            .run(
                move || counter.fetch_add(1, Ordering::SeqCst) >= 3,
                || async {},
            )
            .await;

        assert_eq!(checks.load(Ordering::SeqCst), 4);
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_observes_flag_set_by_another_task() {
        let barrier = ReadinessBarrier::new("manifest", DEFAULT_READY_POLL_INTERVAL);
        let flag = Arc::new(ReadinessFlag::new());

        let setter = Arc::clone(&flag);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1200)).await;
            setter.set();
        });

        let waiter_flag = Arc::clone(&flag);
        barrier.wait_until(move || waiter_flag.is_set()).await;

        assert!(flag.is_set());
    }
}
