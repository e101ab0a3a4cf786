use crate::circuit::CircuitState;
use crate::events::CircuitBreakerEvent;
use breakwater_core::{EventListeners, FnListener};
use std::time::Duration;

pub(crate) const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub(crate) const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration of a single breaker. Immutable once the breaker exists.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub(crate) name: String,
    pub(crate) failure_threshold: u32,
    pub(crate) recovery_timeout: Duration,
    pub(crate) timeout: Duration,
    pub(crate) monitoring: bool,
    pub(crate) cancel_on_timeout: bool,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
}

impl CircuitBreakerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Breaker name, used as registry key and in every log line and metric.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Failures counted while CLOSED before the breaker opens.
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Time spent OPEN before a single probe is let through.
    pub fn recovery_timeout(&self) -> Duration {
        self.recovery_timeout
    }

    /// Bound on a single call; a call exceeding it counts as a failure.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether transitions and failures are logged.
    pub fn monitoring(&self) -> bool {
        self.monitoring
    }

    /// Whether a timed-out operation is dropped instead of left running.
    pub fn cancel_on_timeout(&self) -> bool {
        self.cancel_on_timeout
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfigBuilder::new().build()
    }
}

/// Per-call partial overrides of breaker settings.
///
/// Unset fields fall back to whatever the receiving builder already holds.
/// Once a breaker exists for a name, options passed for that name are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BreakerOptions {
    pub failure_threshold: Option<u32>,
    pub recovery_timeout: Option<Duration>,
    pub timeout: Option<Duration>,
    pub monitoring: Option<bool>,
}

impl BreakerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }

    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = Some(timeout);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn monitoring(mut self, enabled: bool) -> Self {
        self.monitoring = Some(enabled);
        self
    }

    /// Layers `overrides` on top of `self`; fields set in `overrides` win.
    pub fn merge(self, overrides: BreakerOptions) -> Self {
        Self {
            failure_threshold: overrides.failure_threshold.or(self.failure_threshold),
            recovery_timeout: overrides.recovery_timeout.or(self.recovery_timeout),
            timeout: overrides.timeout.or(self.timeout),
            monitoring: overrides.monitoring.or(self.monitoring),
        }
    }
}

/// Builder for [`CircuitBreakerConfig`].
///
/// Defaults: threshold 5, recovery timeout 60s, call timeout 10s,
/// monitoring on, timed-out operations left running.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfigBuilder {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    timeout: Duration,
    monitoring: bool,
    cancel_on_timeout: bool,
    event_listeners: EventListeners<CircuitBreakerEvent>,
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self {
            name: String::from("<unnamed>"),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            timeout: DEFAULT_TIMEOUT,
            monitoring: true,
            cancel_on_timeout: false,
            event_listeners: EventListeners::new(),
        }
    }

    /// Names the breaker. The registry sets this to the service name.
    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Failures counted while CLOSED before the breaker opens.
    ///
    /// A threshold of 0 is treated as 1.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Time spent OPEN before a probe is allowed.
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Bound on each call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables or disables logging of transitions and failures.
    pub fn monitoring(mut self, enabled: bool) -> Self {
        self.monitoring = enabled;
        self
    }

    /// Drop the operation's future when the timeout wins the race.
    ///
    /// By default the operation is moved onto its own task and keeps running
    /// to completion; only its outcome is ignored.
    pub fn cancel_on_timeout(mut self, cancel: bool) -> Self {
        self.cancel_on_timeout = cancel;
        self
    }

    /// Applies every field set in `options`.
    pub fn options(mut self, options: BreakerOptions) -> Self {
        if let Some(threshold) = options.failure_threshold {
            self = self.failure_threshold(threshold);
        }
        if let Some(timeout) = options.recovery_timeout {
            self.recovery_timeout = timeout;
        }
        if let Some(timeout) = options.timeout {
            self.timeout = timeout;
        }
        if let Some(enabled) = options.monitoring {
            self.monitoring = enabled;
        }
        self
    }

    /// Registers a callback for every state transition, as `(from, to)`.
    ///
    /// Hooks run after the breaker's lock is released and may call back into it.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::StateTransition {
                    from_state,
                    to_state,
                    ..
                } = event
                {
                    f(*from_state, *to_state);
                }
            }));
        self
    }

    /// Registers a callback for each permitted call with the state it ran in.
    pub fn on_call_permitted<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::CallPermitted { state, .. } = event {
                    f(*state);
                }
            }));
        self
    }

    /// Registers a callback for each fail-fast rejection.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::CallRejected { .. } = event {
                    f();
                }
            }));
        self
    }

    /// Registers a callback for each success, with the call's duration.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::SuccessRecorded { duration, .. } = event {
                    f(*duration);
                }
            }));
        self
    }

    /// Registers a callback for each failure (operation error or timeout),
    /// with the failure count after recording it.
    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::FailureRecorded { failure_count, .. } = event {
                    f(*failure_count);
                }
            }));
        self
    }

    /// Registers a callback for each timeout.
    pub fn on_timeout<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::TimeoutRecorded { timeout, .. } = event {
                    f(*timeout);
                }
            }));
        self
    }

    /// Registers a callback receiving every event.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&CircuitBreakerEvent) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(f));
        self
    }

    pub fn build(self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            name: self.name,
            failure_threshold: self.failure_threshold,
            recovery_timeout: self.recovery_timeout,
            timeout: self.timeout,
            monitoring: self.monitoring,
            cancel_on_timeout: self.cancel_on_timeout,
            event_listeners: self.event_listeners,
        }
    }
}
