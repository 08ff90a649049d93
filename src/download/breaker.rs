//! Failure breaker: aborts a run after sustained failure across all workers
//!
//! The counter is global, not per URL. A single success anywhere resets it, so
//! only a streak of failures with no success in between (site down, network
//! gone) trips the breaker. Per-URL flakiness is the retry policy's job.

use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
pub struct FailureBreaker {
    /// Consecutive failures that trip the breaker; 0 disables it
    threshold: u32,
    consecutive: Mutex<u32>,
}

impl FailureBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive: Mutex::new(0),
        }
    }

    fn counter(&self) -> MutexGuard<'_, u32> {
        self.consecutive.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_enabled(&self) -> bool {
        self.threshold > 0
    }

    pub fn consecutive_failures(&self) -> u32 {
        *self.counter()
    }

    /// Records a download outcome; returns true exactly when this call trips the breaker
    pub fn record(&self, success: bool) -> bool {
        if success {
            self.record_success();
            false
        } else {
            self.record_failure()
        }
    }

    fn record_success(&self) {
        *self.counter() = 0;
    }

    /// Counts a failure; returns true only for the failure that reaches the threshold
    ///
    /// Failures reported after the trip (by workers finishing concurrently)
    /// keep counting past the threshold and never trip a second time.
    fn record_failure(&self) -> bool {
        let mut count = self.counter();
        *count = count.saturating_add(1);
        self.is_enabled() && *count == self.threshold
    }

    /// Clears the streak at the start of a new run
    pub fn reset(&self) {
        *self.counter() = 0;
    }
}
