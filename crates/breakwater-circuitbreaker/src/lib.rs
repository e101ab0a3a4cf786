//! Per-dependency circuit breakers.
//!
//! A [`CircuitBreaker`] guards one named dependency (a database, an external
//! API, another service). It fails fast while the dependency is known to be
//! failing and lets a probe through once a cooldown has elapsed.
//!
//! ## States
//! - **CLOSED**: calls run; each failure counts, and reaching the failure
//!   threshold opens the breaker. A success while CLOSED clears the count.
//! - **OPEN**: calls are rejected with [`CircuitBreakerError::OpenCircuit`]
//!   without invoking the operation. Once the recovery timeout has elapsed
//!   the next call flips the breaker to HALF_OPEN and runs as a probe.
//! - **HALF_OPEN**: a success closes the breaker, a failure re-opens it with
//!   a fresh cooldown.
//!
//! Every permitted call races against the breaker's timeout. A call that
//! loses the race counts as a failure and surfaces as
//! [`CircuitBreakerError::Timeout`].
//!
//! ## Usage
//!
//! ```rust
//! use breakwater_circuitbreaker::{BreakerRegistry, BreakerOptions, CircuitBreakerError};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let registry = BreakerRegistry::new();
//! let breaker = registry.get_or_create(
//!     "inventory-db",
//!     BreakerOptions::new()
//!         .failure_threshold(3)
//!         .timeout(Duration::from_millis(500)),
//! );
//!
//! match breaker.execute(|| async { Ok::<_, std::io::Error>(42) }).await {
//!     Ok(rows) => println!("{rows} rows"),
//!     Err(CircuitBreakerError::OpenCircuit { .. }) => println!("degraded"),
//!     Err(other) => println!("failed: {other}"),
//! }
//! # }
//! ```
//!
//! ## Concurrency
//!
//! State lives behind a per-breaker mutex that is only held for the
//! synchronous bookkeeping sections, never across the operation itself.
//! Listeners run after the mutex is released, so a hook may call back into
//! the breaker (`stats`, `state`, `reset`).
//! Each transition is therefore observed exactly once, however many tasks
//! share the breaker. Calls arriving while HALF_OPEN are all admitted; the
//! first outcome recorded decides the next state.

use crate::circuit::{Circuit, FailureKind};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub use circuit::{CircuitBreakerStats, CircuitState};
pub use config::{BreakerOptions, CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use error::CircuitBreakerError;
pub use events::CircuitBreakerEvent;
pub use layer::{CircuitBreakerLayer, CircuitBreakerService};
pub use registry::{BreakerRegistry, ConfigureFn};

mod circuit;
mod config;
mod error;
mod events;
mod layer;
mod registry;

/// A named circuit breaker.
///
/// Cloning is cheap; clones share the same state.
pub struct CircuitBreaker {
    circuit: Arc<Mutex<Circuit>>,
    state_atomic: Arc<AtomicU8>,
    config: Arc<CircuitBreakerConfig>,
}

enum Outcome<T, E> {
    Completed(Result<T, E>),
    TimedOut,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let state_atomic = Arc::new(AtomicU8::new(CircuitState::Closed as u8));
        Self {
            circuit: Arc::new(Mutex::new(Circuit::new_with_atomic(Arc::clone(
                &state_atomic,
            )))),
            state_atomic,
            config: Arc::new(config),
        }
    }

    /// Runs `operation` under breaker protection.
    ///
    /// Returns [`CircuitBreakerError::OpenCircuit`] without calling
    /// `operation` when the breaker refuses the call. Otherwise the operation
    /// races the configured timeout; its own error comes back unchanged in
    /// [`CircuitBreakerError::Operation`].
    ///
    /// Unless `cancel_on_timeout` is set, the operation runs on its own task
    /// and keeps running after losing the race.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let config = &self.config;

        let permitted = self.with_circuit(|circuit| circuit.try_acquire(config));
        if !permitted {
            tracing::debug!(breaker = %config.name, "circuit breaker rejected call (circuit open)");
            return Err(CircuitBreakerError::OpenCircuit {
                name: config.name.clone(),
            });
        }

        tracing::trace!(breaker = %config.name, "circuit breaker permitted call");

        let start = Instant::now();
        let outcome = if config.cancel_on_timeout {
            match tokio::time::timeout(config.timeout, operation()).await {
                Ok(result) => Outcome::Completed(result),
                Err(_elapsed) => Outcome::TimedOut,
            }
        } else {
            // Dropping the handle on timeout detaches the task.
            let handle = tokio::spawn(operation());
            match tokio::time::timeout(config.timeout, handle).await {
                Ok(Ok(result)) => Outcome::Completed(result),
                Ok(Err(join_error)) if join_error.is_panic() => {
                    self.with_circuit(|circuit| {
                        circuit.record_failure(config, FailureKind::Operation, start.elapsed())
                    });
                    std::panic::resume_unwind(join_error.into_panic())
                }
                // Cancelled by runtime shutdown; the operation never settled.
                Ok(Err(_)) | Err(_) => Outcome::TimedOut,
            }
        };
        let duration = start.elapsed();

        match outcome {
            Outcome::Completed(Ok(value)) => {
                self.with_circuit(|circuit| circuit.record_success(config, duration));
                Ok(value)
            }
            Outcome::Completed(Err(error)) => {
                self.with_circuit(|circuit| {
                    circuit.record_failure(config, FailureKind::Operation, duration)
                });
                Err(CircuitBreakerError::Operation(error))
            }
            Outcome::TimedOut => {
                self.with_circuit(|circuit| {
                    circuit.record_failure(config, FailureKind::Timeout, duration)
                });
                Err(CircuitBreakerError::Timeout {
                    name: config.name.clone(),
                    timeout: config.timeout,
                })
            }
        }
    }

    /// Breaker name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The configuration the breaker was created with.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Snapshot of state, counters and timestamps.
    pub fn stats(&self) -> CircuitBreakerStats {
        self.circuit.lock().stats(&self.config)
    }

    /// Forces CLOSED and zeroes counters and timestamps.
    pub fn reset(&self) {
        self.with_circuit(|circuit| circuit.reset(&self.config));
    }

    /// Forces OPEN, starting a fresh cooldown.
    ///
    /// Forcing an already OPEN breaker restarts its cooldown.
    pub fn force_open(&self) {
        self.with_circuit(|circuit| circuit.force_open(&self.config));
    }

    /// Current state, read under the lock.
    pub fn state(&self) -> CircuitState {
        self.circuit.lock().state()
    }

    /// Current state without taking the lock.
    ///
    /// May briefly trail a transition that is still in progress.
    pub fn state_sync(&self) -> CircuitState {
        CircuitState::from_u8(self.state_atomic.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state_sync() == CircuitState::Open
    }

    /// "healthy" when CLOSED, "degraded" when HALF_OPEN, "unhealthy" when OPEN.
    pub fn health_status(&self) -> &'static str {
        match self.state_sync() {
            CircuitState::Closed => "healthy",
            CircuitState::HalfOpen => "degraded",
            CircuitState::Open => "unhealthy",
        }
    }

    /// 503 while OPEN, 200 otherwise.
    pub fn http_status(&self) -> u16 {
        match self.state_sync() {
            CircuitState::Closed | CircuitState::HalfOpen => 200,
            CircuitState::Open => 503,
        }
    }

    /// Remaining cooldown of an OPEN breaker.
    pub fn time_until_probe(&self) -> Option<Duration> {
        let stats = self.stats();
        if stats.state != CircuitState::Open {
            return None;
        }
        Some(
            self.config
                .recovery_timeout
                .saturating_sub(stats.time_since_state_change),
        )
    }

    /// Runs `f` under the lock, then delivers the events it raised.
    fn with_circuit<R>(&self, f: impl FnOnce(&mut Circuit) -> R) -> R {
        let (result, events) = {
            let mut circuit = self.circuit.lock();
            let result = f(&mut circuit);
            (result, circuit.take_events())
        };
        for event in &events {
            self.config.event_listeners.emit(event);
        }
        result
    }

    /// True if both handles refer to the same breaker.
    pub fn ptr_eq(&self, other: &CircuitBreaker) -> bool {
        Arc::ptr_eq(&self.circuit, &other.circuit)
    }
}

impl Clone for CircuitBreaker {
    fn clone(&self) -> Self {
        Self {
            circuit: Arc::clone(&self.circuit),
            state_atomic: Arc::clone(&self.state_atomic),
            config: Arc::clone(&self.config),
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.config.name)
            .field("state", &self.state_sync())
            .finish()
    }
}
