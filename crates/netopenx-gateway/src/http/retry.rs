//! Retry policy with exponential backoff
//!
//! A pure decision function plus a delay schedule, reusable around any single
//! network call: token refresh and resource calls run under the same policy.

use backoff::{backoff::Backoff, ExponentialBackoff};
use std::fmt;
use std::time::Duration;

use crate::http::error::Classify;

/// Retry policy configuration.
///
/// The default schedule is deterministic: three retries after the initial
/// attempt, with delays of 2s, 4s and 8s between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub multiplier: f64,
    /// Randomize delays to spread out competing callers. Off by default so
    /// the schedule stays predictable.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.base_delay,
            // next_backoff() reads current_interval, not initial_interval;
            // both must start at the base delay or the schedule silently
            // begins at the crate's 500ms default.
            current_interval: self.base_delay,
            max_interval: self.max_delay,
            multiplier: self.multiplier,
            max_elapsed_time: None, // the ceiling is enforced by attempt count
            ..Default::default()
        };

        if !self.jitter {
            backoff.randomization_factor = 0.0;
        }

        backoff
    }
}

/// Decision for a single failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given delay.
    Retry { delay: Duration },
    /// Surface the failure to the caller.
    GiveUp,
}

/// Per-call retry state: attempt counter plus the backoff schedule.
#[derive(Debug)]
pub struct RetryHandler {
    policy: RetryPolicy,
    retries: u32,
    backoff: ExponentialBackoff,
}

impl RetryHandler {
    pub fn new(policy: RetryPolicy) -> Self {
        let backoff = policy.create_backoff();
        Self {
            policy,
            retries: 0,
            backoff,
        }
    }

    /// Decide whether a failed attempt should be retried.
    pub fn should_retry<E: Classify>(&mut self, error: &E) -> RetryDecision {
        if self.retries >= self.policy.max_retries {
            return RetryDecision::GiveUp;
        }

        if !error.classification().is_retryable() {
            return RetryDecision::GiveUp;
        }

        self.retries += 1;

        let delay = self
            .backoff
            .next_backoff()
            .unwrap_or(self.policy.max_delay);

        RetryDecision::Retry { delay }
    }

    /// Number of retries granted so far (excludes the initial attempt).
    pub fn retries(&self) -> u32 {
        self.retries
    }
}

/// Drive an operation under a retry policy.
///
/// Transient failures are retried transparently; only the final outcome is
/// returned. The error type decides its own retryability via [`Classify`].
pub async fn execute_with_retry<F, Fut, T, E>(mut op: F, policy: RetryPolicy) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Classify + fmt::Display,
{
    let mut handler = RetryHandler::new(policy);

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => match handler.should_retry(&error) {
                RetryDecision::Retry { delay } => {
                    tracing::warn!(
                        retry = handler.retries(),
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    tracing::error!(
                        retries = handler.retries(),
                        %error,
                        "attempt failed, giving up"
                    );
                    return Err(error);
                }
            },
        }
    }
}
