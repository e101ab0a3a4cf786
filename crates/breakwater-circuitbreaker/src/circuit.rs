use crate::config::CircuitBreakerConfig;
use crate::events::CircuitBreakerEvent;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
#[repr(u8)]
pub enum CircuitState {
    /// Calls run normally.
    Closed = 0,
    /// Calls are rejected without invoking the operation.
    Open = 1,
    /// The cooldown elapsed; calls are let through as recovery probes.
    HalfOpen = 2,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    /// Upper-case label used in logs and metrics (`CLOSED`, `OPEN`, `HALF_OPEN`).
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }

    /// Numeric encoding for gauges: 0 closed, 1 open, 2 half-open.
    pub fn as_gauge(&self) -> f64 {
        *self as u8 as f64
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time snapshot of a breaker. Read-only.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u64,
    pub success_count: u64,
    pub last_failure_time: Option<SystemTime>,
    pub last_success_time: Option<SystemTime>,
    pub last_state_change_time: SystemTime,
    /// When an OPEN breaker will admit its next probe.
    pub next_attempt_time: Option<SystemTime>,
    pub time_since_state_change: Duration,
}

/// How a permitted call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureKind {
    Operation,
    Timeout,
}

/// The breaker state machine. Always accessed under the breaker's mutex.
///
/// Events are queued rather than delivered, so listeners never run while the
/// mutex is held; see [`Circuit::take_events`].
pub(crate) struct Circuit {
    state: CircuitState,
    state_atomic: Arc<AtomicU8>,
    failure_count: u64,
    success_count: u64,
    last_failure_time: Option<SystemTime>,
    last_success_time: Option<SystemTime>,
    last_state_change: Instant,
    last_state_change_time: SystemTime,
    next_attempt: Option<Instant>,
    next_attempt_time: Option<SystemTime>,
    /// Events raised under the lock, delivered by the caller after unlocking.
    pending: Vec<CircuitBreakerEvent>,
}

impl Circuit {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::new_with_atomic(Arc::new(AtomicU8::new(CircuitState::Closed as u8)))
    }

    pub(crate) fn new_with_atomic(state_atomic: Arc<AtomicU8>) -> Self {
        state_atomic.store(CircuitState::Closed as u8, Ordering::Release);
        Self {
            state: CircuitState::Closed,
            state_atomic,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            last_success_time: None,
            last_state_change: Instant::now(),
            last_state_change_time: SystemTime::now(),
            next_attempt: None,
            next_attempt_time: None,
            pending: Vec::new(),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count
    }

    pub fn stats(&self, config: &CircuitBreakerConfig) -> CircuitBreakerStats {
        CircuitBreakerStats {
            name: config.name.clone(),
            state: self.state,
            failure_count: self.failure_count,
            success_count: self.success_count,
            last_failure_time: self.last_failure_time,
            last_success_time: self.last_success_time,
            last_state_change_time: self.last_state_change_time,
            next_attempt_time: self.next_attempt_time,
            time_since_state_change: self.last_state_change.elapsed(),
        }
    }

    /// Decides whether a call may run.
    ///
    /// An OPEN breaker whose cooldown has expired flips to HALF_OPEN here,
    /// before the probe executes.
    pub fn try_acquire(&mut self, config: &CircuitBreakerConfig) -> bool {
        let permitted = match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let now = Instant::now();
                if self.next_attempt.map_or(true, |at| now >= at) {
                    self.transition_to(CircuitState::HalfOpen, config);
                    true
                } else {
                    false
                }
            }
        };

        if permitted {
            self.pending.push(CircuitBreakerEvent::CallPermitted {
                name: config.name.clone(),
                timestamp: Instant::now(),
                state: self.state,
            });
        } else {
            self.pending.push(CircuitBreakerEvent::CallRejected {
                name: config.name.clone(),
                timestamp: Instant::now(),
            });
        }
        permitted
    }

    pub fn record_success(&mut self, config: &CircuitBreakerConfig, duration: Duration) {
        self.success_count += 1;
        self.last_success_time = Some(SystemTime::now());

        self.pending.push(CircuitBreakerEvent::SuccessRecorded {
            name: config.name.clone(),
            timestamp: Instant::now(),
            state: self.state,
            duration,
        });

        match self.state {
            CircuitState::HalfOpen => self.transition_to(CircuitState::Closed, config),
            // A late success while OPEN clears the streak but does not close.
            CircuitState::Closed | CircuitState::Open => self.failure_count = 0,
        }
    }

    pub fn record_failure(
        &mut self,
        config: &CircuitBreakerConfig,
        kind: FailureKind,
        duration: Duration,
    ) {
        self.failure_count += 1;
        self.last_failure_time = Some(SystemTime::now());

        if kind == FailureKind::Timeout {
            self.pending.push(CircuitBreakerEvent::TimeoutRecorded {
                name: config.name.clone(),
                timestamp: Instant::now(),
                state: self.state,
                timeout: config.timeout,
            });
        }
        self.pending.push(CircuitBreakerEvent::FailureRecorded {
            name: config.name.clone(),
            timestamp: Instant::now(),
            state: self.state,
            failure_count: self.failure_count,
        });

        if config.monitoring {
            tracing::warn!(
                breaker = %config.name,
                state = %self.state,
                failure_count = self.failure_count,
                failure_threshold = config.failure_threshold,
                timed_out = kind == FailureKind::Timeout,
                duration_ms = duration.as_millis() as u64,
                "circuit breaker recorded failure"
            );
        }

        match self.state {
            CircuitState::HalfOpen => self.transition_to(CircuitState::Open, config),
            CircuitState::Closed if self.failure_count >= u64::from(config.failure_threshold) => {
                self.transition_to(CircuitState::Open, config)
            }
            CircuitState::Closed | CircuitState::Open => {}
        }
    }

    /// Forces OPEN. An already OPEN breaker restarts its cooldown.
    pub fn force_open(&mut self, config: &CircuitBreakerConfig) {
        if self.state == CircuitState::Open {
            self.start_cooldown(Instant::now(), config);
            if config.monitoring {
                tracing::info!(breaker = %config.name, "circuit breaker cooldown restarted");
            }
        } else {
            self.transition_to(CircuitState::Open, config);
        }
    }

    /// Takes the events raised since the last call, oldest first.
    pub fn take_events(&mut self) -> Vec<CircuitBreakerEvent> {
        std::mem::take(&mut self.pending)
    }

    fn start_cooldown(&mut self, now: Instant, config: &CircuitBreakerConfig) {
        self.last_state_change = now;
        self.last_state_change_time = SystemTime::now();
        self.next_attempt = Some(now + config.recovery_timeout);
        self.next_attempt_time = Some(self.last_state_change_time + config.recovery_timeout);
    }

    /// Forces CLOSED and clears every counter and timestamp.
    ///
    /// Idempotent: repeated resets leave the same observable state.
    pub fn reset(&mut self, config: &CircuitBreakerConfig) {
        self.transition_to(CircuitState::Closed, config);
        self.failure_count = 0;
        self.success_count = 0;
        self.last_failure_time = None;
        self.last_success_time = None;
        self.next_attempt = None;
        self.next_attempt_time = None;

        self.pending.push(CircuitBreakerEvent::Reset {
            name: config.name.clone(),
            timestamp: Instant::now(),
        });

        if config.monitoring {
            tracing::info!(breaker = %config.name, "circuit breaker reset");
        }
    }

    fn transition_to(&mut self, state: CircuitState, config: &CircuitBreakerConfig) {
        if self.state == state {
            return;
        }

        let from_state = self.state;
        let now = Instant::now();

        self.state = state;
        self.state_atomic.store(state as u8, Ordering::Release);

        match state {
            CircuitState::Open => self.start_cooldown(now, config),
            CircuitState::HalfOpen => {
                self.last_state_change = now;
                self.last_state_change_time = SystemTime::now();
                self.next_attempt = None;
                self.next_attempt_time = None;
            }
            CircuitState::Closed => {
                self.last_state_change = now;
                self.last_state_change_time = SystemTime::now();
                self.next_attempt = None;
                self.next_attempt_time = None;
                self.failure_count = 0;
            }
        }

        self.pending.push(CircuitBreakerEvent::StateTransition {
            name: config.name.clone(),
            timestamp: now,
            from_state,
            to_state: state,
        });

        if config.monitoring {
            if state == CircuitState::Open {
                tracing::warn!(
                    breaker = %config.name,
                    from = %from_state,
                    to = %state,
                    failure_count = self.failure_count,
                    retry_in_ms = config.recovery_timeout.as_millis() as u64,
                    "circuit breaker opened"
                );
            } else {
                tracing::info!(
                    breaker = %config.name,
                    from = %from_state,
                    to = %state,
                    "circuit breaker state transition"
                );
            }
        }
    }
}
