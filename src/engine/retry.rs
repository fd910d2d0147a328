//! Local retry policy for a single item.
//!
//! Local backoff is independent of, and additional to, the pacing delay the
//! throttle computes between items.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use archiver_core::engine::{RetryDecision, RetryPolicy};
//! use archiver_core::failure::FailureKind;
//!
//! let policy = RetryPolicy::with_max_attempts(3);
//! assert_eq!(
//!     policy.should_retry(FailureKind::RateLimited, 1),
//!     RetryDecision::Retry { delay: Duration::from_secs(2), attempt: 2 }
//! );
//! assert!(matches!(
//!     policy.should_retry(FailureKind::ContentInvalid, 1),
//!     RetryDecision::DoNotRetry { .. }
//! ));
//! ```

use std::time::Duration;

use tracing::{debug, instrument};

use crate::failure::FailureKind;

/// Default maximum attempts per phase.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Backoff after the first failed attempt; doubles for each further attempt.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Upper bound on a single local backoff.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(64);

/// Whether and when to try again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then run attempt number `attempt` (1-indexed).
    Retry { delay: Duration, attempt: u32 },
    /// Give up on this phase.
    DoNotRetry { reason: String },
}

/// Attempt cap and exponential backoff for one phase of the item workflow.
///
/// ```text
/// delay(attempt) = min(base_delay * 2^(attempt - 1), max_delay)
/// ```
///
/// With defaults the waits are 2s and 4s before the second and third attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Replaces the first backoff step.
    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides what follows failed attempt number `attempt` (1-indexed).
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, kind: FailureKind, attempt: u32) -> RetryDecision {
        if !kind.is_retryable() {
            return RetryDecision::DoNotRetry {
                reason: format!("{kind} failure - retry would not help"),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.delay_for(attempt);
        debug!(attempt, delay_ms = delay.as_millis(), "will retry");
        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay)
    }
}
