//! Retry, polling and pacing with jitter
//!
//! Three loops in the export pipeline wait between remote requests:
//! - transient failures of workspace/feed requests back off exponentially
//!   ([`with_retry`])
//! - WAV status queries repeat until the artifact is ready ([`poll_until`])
//! - the scheduler pauses between items ([`pace`])
//!
//! All of them draw their waits from a [`DelayWindow`] or [`RetryConfig`] and
//! log the same structured fields.

use crate::config::{DelayWindow, RetryConfig};
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, rate limiting, server errors) should return `true`.
/// Permanent failures (rejected credential, malformed response, disk full) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            // 429 is the remote rate limit; 5xx are usually short outages
            Error::RemoteApi { status, .. } => *status == 429 || *status >= 500,
            Error::NotAuthenticated { .. } => false,
            Error::ConversionInitiation { .. }
            | Error::ConversionPoll { .. }
            | Error::ConversionTimeout { .. } => false,
            Error::Transfer { .. } | Error::MissingAudio { .. } => false,
            Error::Cancelled => false,
            Error::Filesystem { .. } => false,
            Error::Serialization(_) | Error::InvalidUrl(_) | Error::Config { .. } => false,
        }
    }
}

impl DelayWindow {
    /// Draw a pause uniformly from `[min_delay, max_delay]`
    pub fn sample(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Returns the successful result or the last error after all retry attempts are exhausted.
/// Non-retryable errors are returned immediately.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "operation failed, retrying"
                );

                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };
                tokio::time::sleep(jittered_delay).await;

                let next = delay.as_secs_f64() * config.backoff_multiplier;
                delay = Duration::try_from_secs_f64(next)
                    .unwrap_or(config.max_delay)
                    .min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let jitter_factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

/// Parameters of a repeated status query
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Wait between attempts
    pub window: DelayWindow,
    /// Attempts before giving up
    pub max_attempts: u32,
}

/// What one poll attempt observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    /// The awaited value is available
    Ready(T),
    /// Not yet; try again after a wait
    Pending,
}

/// Final state of a polling loop that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The value became available
    Ready {
        /// The value
        value: T,
        /// Attempts used, including the successful one
        attempts: u32,
    },
    /// Every attempt returned [`Attempt::Pending`]
    Exhausted {
        /// Attempts used
        attempts: u32,
        /// Time spent waiting between attempts
        total_wait: Duration,
    },
    /// The token fired before the value became available
    Cancelled {
        /// Attempts issued before cancellation
        attempts: u32,
    },
}

/// Repeat `operation` until it is ready, fails, the attempt budget runs out,
/// or `cancel` fires
///
/// `operation` receives the 1-based attempt number. A wait drawn from
/// `policy.window` separates consecutive attempts; there is no wait after
/// the final attempt. Cancellation is observed before every attempt and
/// cuts the wait short; an attempt already sent is awaited.
pub async fn poll_until<F, Fut, T, E>(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<PollOutcome<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Attempt<T>, E>>,
{
    let mut total_wait = Duration::ZERO;

    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return Ok(PollOutcome::Cancelled {
                attempts: attempt - 1,
            });
        }
        if let Attempt::Ready(value) = operation(attempt).await? {
            return Ok(PollOutcome::Ready {
                value,
                attempts: attempt,
            });
        }

        if attempt < policy.max_attempts {
            let wait = policy.window.sample();
            tracing::trace!(attempt, wait_ms = wait.as_millis() as u64, "not ready, waiting");
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(attempt, "polling cancelled");
                    return Ok(PollOutcome::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(wait) => {}
            }
            total_wait += wait;
        }
    }

    Ok(PollOutcome::Exhausted {
        attempts: policy.max_attempts,
        total_wait,
    })
}

/// Sleep for a pause drawn from `window`, waking early on cancellation
///
/// Returns the pause taken, or `None` when `cancel` fired first.
pub async fn pace(window: &DelayWindow, cancel: &CancellationToken) -> Option<Duration> {
    let delay = window.sample();
    if delay.is_zero() {
        return (!cancel.is_cancelled()).then_some(delay);
    }
    tokio::select! {
        _ = cancel.cancelled() => None,
        _ = tokio::time::sleep(delay) => Some(delay),
    }
}
