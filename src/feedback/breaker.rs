//! Per-channel circuit breaker. Trips after N consecutive failures and stays
//! open for the rest of the process.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::{debug, error, warn};

#[derive(Debug)]
pub struct CircuitBreaker {
    channel: &'static str,
    threshold: u32,
    failures: AtomicU32,
    open: AtomicBool,
}

impl CircuitBreaker {
    pub fn new(channel: &'static str, threshold: u32) -> Self {
        Self {
            channel,
            threshold: threshold.max(1),
            failures: AtomicU32::new(0),
            open: AtomicBool::new(false),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    /// Run `f` unless the breaker is open. Returns whether `f` ran and
    /// succeeded.
    pub fn call<F>(&self, f: F) -> bool
    where
        F: FnOnce() -> Result<()>,
    {
        if self.is_open() {
            debug!("{} channel disabled, dropping request", self.channel);
            return false;
        }
        match f() {
            Ok(()) => {
                self.failures.store(0, Ordering::Release);
                true
            }
            Err(e) => {
                self.record_failure(&e);
                false
            }
        }
    }

    fn record_failure(&self, e: &anyhow::Error) {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        warn!("{} channel failure {}/{}: {:#}", self.channel, failures, self.threshold, e);
        if failures >= self.threshold && !self.open.swap(true, Ordering::AcqRel) {
            error!(
                "{} channel disabled after {} consecutive failures",
                self.channel, failures
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::Cell;

    #[test]
    fn test_trips_after_threshold() {
        let breaker = CircuitBreaker::new("speech", 3);
        let calls = Cell::new(0);
        for _ in 0..5 {
            breaker.call(|| {
                calls.set(calls.get() + 1);
                Err(anyhow!("device busy"))
            });
        }
        assert!(breaker.is_open());
        assert_eq!(calls.get(), 3);
        assert!(!breaker.call(|| Ok(())));
    }

    #[test]
    fn test_success_resets_count() {
        let breaker = CircuitBreaker::new("sound", 3);
        breaker.call(|| Err(anyhow!("x")));
        breaker.call(|| Err(anyhow!("x")));
        assert!(breaker.call(|| Ok(())));
        assert_eq!(breaker.consecutive_failures(), 0);
        breaker.call(|| Err(anyhow!("x")));
        breaker.call(|| Err(anyhow!("x")));
        assert!(!breaker.is_open());
    }
}
