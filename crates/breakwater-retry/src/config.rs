use crate::backoff::{ExponentialBackoff, IntervalFunction};
use crate::events::RetryEvent;
use crate::policy::{RetryPolicy, RetryPredicate};
use breakwater_core::{EventListeners, FnListener};
use std::sync::Arc;
use std::time::Duration;

pub(crate) const DEFAULT_MAX_RETRIES: usize = 3;
pub(crate) const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);
pub(crate) const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Partial retry settings supplied per call.
///
/// Unset fields keep the receiving builder's value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RetryOptions {
    pub max_retries: Option<usize>,
    pub retry_delay: Option<Duration>,
    pub backoff_multiplier: Option<f64>,
    pub jitter: Option<f64>,
    pub max_delay: Option<Duration>,
}

impl RetryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = Some(multiplier);
        self
    }

    pub fn jitter(mut self, factor: f64) -> Self {
        self.jitter = Some(factor);
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Layers `overrides` on top of `self`; fields set in `overrides` win.
    pub fn merge(self, overrides: RetryOptions) -> Self {
        Self {
            max_retries: overrides.max_retries.or(self.max_retries),
            retry_delay: overrides.retry_delay.or(self.retry_delay),
            backoff_multiplier: overrides.backoff_multiplier.or(self.backoff_multiplier),
            jitter: overrides.jitter.or(self.jitter),
            max_delay: overrides.max_delay.or(self.max_delay),
        }
    }
}

/// A built retry executor.
///
/// Run operations through it with [`RetryConfig::execute`]. Cloning shares
/// the policy and listeners.
pub struct RetryConfig<E> {
    pub(crate) policy: RetryPolicy<E>,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
    pub(crate) name: String,
}

impl<E> RetryConfig<E> {
    pub fn builder() -> RetryConfigBuilder<E> {
        RetryConfigBuilder::new()
    }

    /// Description used in events and log lines.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &RetryPolicy<E> {
        &self.policy
    }
}

impl<E> Clone for RetryConfig<E> {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy.clone(),
            event_listeners: self.event_listeners.clone(),
            name: self.name.clone(),
        }
    }
}

impl<E> std::fmt::Debug for RetryConfig<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("name", &self.name)
            .field("max_retries", &self.policy.max_retries)
            .field("has_predicate", &self.policy.retry_predicate.is_some())
            .finish()
    }
}

/// Builder for [`RetryConfig`].
///
/// Defaults: 3 retries, 1000ms base delay doubling per retry, no jitter,
/// no cap, every error retryable.
pub struct RetryConfigBuilder<E> {
    name: String,
    max_retries: usize,
    retry_delay: Duration,
    backoff_multiplier: f64,
    jitter: f64,
    max_delay: Option<Duration>,
    interval_fn: Option<Arc<dyn IntervalFunction>>,
    retry_predicate: Option<RetryPredicate<E>>,
    event_listeners: EventListeners<RetryEvent>,
}

impl<E> Default for RetryConfigBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> RetryConfigBuilder<E> {
    pub fn new() -> Self {
        Self {
            name: String::from("operation"),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: 0.0,
            max_delay: None,
            interval_fn: None,
            retry_predicate: None,
            event_listeners: EventListeners::new(),
        }
    }

    /// Human-readable description of the operation, used in logs and events.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Retries after the initial attempt; `3` means up to 4 calls.
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before the first retry.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Growth factor applied per retry.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Uniform randomization of each delay by `±factor` (0.0 to 1.0).
    pub fn jitter(mut self, factor: f64) -> Self {
        self.jitter = factor;
        self
    }

    /// Upper bound on any single delay, applied before jitter.
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Replaces the exponential schedule with a custom interval function.
    pub fn backoff<I>(mut self, interval_fn: I) -> Self
    where
        I: IntervalFunction + 'static,
    {
        self.interval_fn = Some(Arc::new(interval_fn));
        self
    }

    /// Only errors matching `predicate` are retried; others return at once.
    pub fn retry_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retry_predicate = Some(Arc::new(predicate));
        self
    }

    /// Applies every field set in `options`.
    pub fn options(mut self, options: RetryOptions) -> Self {
        if let Some(max_retries) = options.max_retries {
            self.max_retries = max_retries;
        }
        if let Some(delay) = options.retry_delay {
            self.retry_delay = delay;
        }
        if let Some(multiplier) = options.backoff_multiplier {
            self.backoff_multiplier = multiplier;
        }
        if let Some(jitter) = options.jitter {
            self.jitter = jitter;
        }
        if options.max_delay.is_some() {
            self.max_delay = options.max_delay;
        }
        self
    }

    /// Called before every attempt with its 1-based number.
    pub fn on_attempt<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &RetryEvent| {
                if let RetryEvent::Attempt { attempt, .. } = event {
                    f(*attempt);
                }
            }));
        self
    }

    /// Called after a retryable failure with the failed attempt's number and
    /// the delay before the next one.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &RetryEvent| {
                if let RetryEvent::Retry { attempt, delay, .. } = event {
                    f(*attempt, *delay);
                }
            }));
        self
    }

    /// Called on success with the total number of attempts made.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &RetryEvent| {
                if let RetryEvent::Success { attempts, .. } = event {
                    f(*attempts);
                }
            }));
        self
    }

    /// Called when the bound is reached, with the total number of attempts.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &RetryEvent| {
                if let RetryEvent::Exhausted { attempts, .. } = event {
                    f(*attempts);
                }
            }));
        self
    }

    /// Called when the retry predicate rejects an error.
    pub fn on_ignored_error<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &RetryEvent| {
                if matches!(event, RetryEvent::IgnoredError { .. }) {
                    f();
                }
            }));
        self
    }

    /// Registers a callback receiving every event.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&RetryEvent) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(f));
        self
    }

    pub fn build(self) -> RetryConfig<E> {
        let interval_fn = self.interval_fn.unwrap_or_else(|| {
            let mut backoff = ExponentialBackoff::new(self.retry_delay)
                .multiplier(self.backoff_multiplier)
                .jitter(self.jitter);
            if let Some(max) = self.max_delay {
                backoff = backoff.max_interval(max);
            }
            Arc::new(backoff)
        });

        let mut policy = RetryPolicy::new(self.max_retries, interval_fn);
        policy.retry_predicate = self.retry_predicate;

        RetryConfig {
            policy,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}
