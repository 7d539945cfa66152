//! Conflict-retry policy for CAS storms.
//!
//! The substrate offers no fairness: a contender racing other writers can
//! lose its compare-and-swap indefinitely. Rather than bury an unbounded
//! spin inside the store, the loop is governed by an explicit policy value
//! so the liveness risk is a first-class, testable parameter. The default
//! matches the reference behavior: retry forever, no backoff.

use std::num::NonZeroU32;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed before giving up; `None` retries forever.
    pub max_attempts: Option<NonZeroU32>,
    /// Sleep between conflicting attempts. Zero means busy-retry.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Retry forever with no pause between attempts.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            backoff: Duration::ZERO,
        }
    }

    /// Give up after `max_attempts` conflicting attempts.
    pub fn bounded(max_attempts: NonZeroU32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            backoff: Duration::ZERO,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Called after attempt number `attempt` lost its race. Sleeps the
    /// configured backoff and reports whether another attempt is allowed.
    pub async fn pause(&self, attempt: u32) -> bool {
        if let Some(max) = self.max_attempts {
            if attempt >= max.get() {
                return false;
            }
        }
        if !self.backoff.is_zero() {
            tokio::time::sleep(self.backoff).await;
        }
        true
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded()
    }
}
