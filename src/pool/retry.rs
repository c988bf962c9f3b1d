//! Per-task retry policy with capped exponential backoff.
//!
//! Failures are classified into a [`FailureType`]; the [`RetryPolicy`] then
//! decides whether another attempt is made and how long to wait first.
//!
//! ```
//! use std::time::Duration;
//! use crawler_core::pool::{FailureType, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::new(3, Duration::ZERO, Duration::ZERO, 2.0);
//! assert!(matches!(
//!     policy.should_retry(FailureType::Transient, 1),
//!     RetryDecision::Retry { attempt: 2, .. }
//! ));
//! assert!(matches!(
//!     policy.should_retry(FailureType::Transient, 3),
//!     RetryDecision::DoNotRetry { .. }
//! ));
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::task::TaskError;

/// Default maximum attempts per task, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default delay before the first retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);

const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Upper bound of the random delay added to each backoff.
const MAX_JITTER: Duration = Duration::from_millis(250);

/// Whether a failure is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// May succeed on retry (network trouble, 5xx, store busy).
    Transient,
    /// Will fail the same way again (404, unparseable page).
    Permanent,
}

impl From<&TaskError> for FailureType {
    fn from(error: &TaskError) -> Self {
        if error.is_retryable() {
            Self::Transient
        } else {
            Self::Permanent
        }
    }
}

/// Outcome of [`RetryPolicy::should_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run the task again after `delay`.
    Retry {
        /// How long to wait first.
        delay: Duration,
        /// Number of the upcoming attempt (1-indexed).
        attempt: u32,
    },
    /// Give up on the task.
    DoNotRetry {
        /// Why no further attempt is made.
        reason: String,
    },
}

/// Attempt budget and backoff for one task.
///
/// `delay = min(base_delay * multiplier^(attempt - 1), max_delay) + jitter`,
/// where jitter is only added when `base_delay` is non-zero.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_RETRY_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy. `max_attempts` is raised to at least 1.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Default backoff with a custom attempt budget.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Retries back to back with no delay.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO, 1.0)
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = self.max_delay.max(base_delay);
        self
    }

    /// Maximum attempts per task, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides what happens after attempt number `attempt` (1-indexed) failed.
    #[must_use]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max_attempts = self.max_attempts, "attempt budget spent");
            return RetryDecision::DoNotRetry {
                reason: format!("all {} attempts failed", self.max_attempts),
            };
        }

        RetryDecision::Retry {
            delay: self.calculate_delay(attempt),
            attempt: attempt + 1,
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * f64::from(self.backoff_multiplier).powf(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        let jitter_ms = rand::thread_rng().gen_range(0..=MAX_JITTER.as_millis() as u64);
        Duration::from_millis(capped_ms as u64) + Duration::from_millis(jitter_ms)
    }
}
