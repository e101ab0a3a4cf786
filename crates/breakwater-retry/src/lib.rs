//! Bounded retries with exponential backoff.
//!
//! A failed attempt is retried up to `max_retries` times. The delay before
//! retry `i` (0-based) is `retry_delay * backoff_multiplier^i`, optionally
//! capped by `max_delay` and randomized by `jitter`. When the bound is
//! reached the last error is returned unchanged; there is no wrapper error.
//!
//! An optional predicate ([`RetryConfigBuilder::retry_on`]) stops retrying
//! errors that cannot succeed on a second try, such as validation failures.
//!
//! ```rust
//! use breakwater_retry::{retry_operation, RetryOptions};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), std::io::Error> {
//! let body = retry_operation(
//!     || async { Ok::<_, std::io::Error>("payload") },
//!     "fetch profile",
//!     RetryOptions::new()
//!         .max_retries(2)
//!         .retry_delay(Duration::from_millis(200)),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! The executor is independent of any circuit breaker. Wrap the raw
//! operation with it, or route every attempt through a breaker so that an
//! open breaker ends the retry loop early.

use std::fmt::Display;
use std::future::Future;
use tokio::time::Instant;

pub use backoff::{ExponentialBackoff, FixedInterval, FnInterval, IntervalFunction};
pub use config::{RetryConfig, RetryConfigBuilder, RetryOptions};
pub use events::RetryEvent;
pub use policy::{RetryPolicy, RetryPredicate};

mod backoff;
mod config;
mod events;
mod policy;

impl<E> RetryConfig<E>
where
    E: Display,
{
    /// Runs `operation` until it succeeds, the predicate rejects its error,
    /// or the retry bound is reached.
    ///
    /// The only suspension points besides the operation itself are the
    /// inter-attempt sleeps.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let name = self.name.as_str();
        let max_attempts = self.policy.max_retries.saturating_add(1);
        let mut retries_done = 0usize;

        loop {
            let attempt = retries_done + 1;
            self.event_listeners.emit(&RetryEvent::Attempt {
                name: self.name.clone(),
                timestamp: Instant::now(),
                attempt,
            });
            tracing::info!(operation = name, attempt, max_attempts, "attempting operation");

            let error = match operation().await {
                Ok(value) => {
                    self.event_listeners.emit(&RetryEvent::Success {
                        name: self.name.clone(),
                        timestamp: Instant::now(),
                        attempts: attempt,
                    });
                    if retries_done > 0 {
                        tracing::info!(operation = name, attempts = attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !self.policy.should_retry(&error) {
                self.event_listeners.emit(&RetryEvent::IgnoredError {
                    name: self.name.clone(),
                    timestamp: Instant::now(),
                    attempt,
                });
                tracing::debug!(operation = name, attempt, error = %error, "error is not retryable");
                return Err(error);
            }

            if !self.policy.has_retries_left(retries_done) {
                self.event_listeners.emit(&RetryEvent::Exhausted {
                    name: self.name.clone(),
                    timestamp: Instant::now(),
                    attempts: attempt,
                });
                tracing::error!(
                    operation = name,
                    attempts = attempt,
                    error = %error,
                    "operation failed after all retries"
                );
                return Err(error);
            }

            let delay = self.policy.next_backoff(retries_done);
            self.event_listeners.emit(&RetryEvent::Retry {
                name: self.name.clone(),
                timestamp: Instant::now(),
                attempt,
                delay,
            });
            tracing::warn!(
                operation = name,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "operation failed, retrying"
            );

            tokio::time::sleep(delay).await;
            retries_done += 1;
        }
    }
}

/// Retries `operation` with the default schedule layered under `options`.
///
/// `description` names the operation in log lines and events.
pub async fn retry_operation<F, Fut, T, E>(
    operation: F,
    description: &str,
    options: RetryOptions,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    RetryConfig::builder()
        .name(description)
        .options(options)
        .build()
        .execute(operation)
        .await
}

/// Retries `operation` with the default schedule (3 retries, 1s doubling).
pub async fn retry<F, Fut, T, E>(operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_operation(operation, "operation", RetryOptions::default()).await
}
