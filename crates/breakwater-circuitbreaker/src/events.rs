use crate::circuit::CircuitState;
use breakwater_core::ResilienceEvent;
use std::time::Duration;
use tokio::time::Instant;

/// Events emitted by a circuit breaker.
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    /// The breaker let a call through.
    CallPermitted {
        name: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// The breaker refused a call without invoking the operation.
    CallRejected { name: String, timestamp: Instant },
    /// A permitted call completed successfully.
    SuccessRecorded {
        name: String,
        timestamp: Instant,
        state: CircuitState,
        duration: Duration,
    },
    /// A permitted call failed with the operation's own error.
    FailureRecorded {
        name: String,
        timestamp: Instant,
        state: CircuitState,
        failure_count: u64,
    },
    /// A permitted call did not settle within the configured timeout.
    TimeoutRecorded {
        name: String,
        timestamp: Instant,
        state: CircuitState,
        timeout: Duration,
    },
    /// The breaker moved between states.
    StateTransition {
        name: String,
        timestamp: Instant,
        from_state: CircuitState,
        to_state: CircuitState,
    },
    /// Counters and timestamps were cleared by an operator reset.
    Reset { name: String, timestamp: Instant },
}

impl ResilienceEvent for CircuitBreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CircuitBreakerEvent::CallPermitted { .. } => "call_permitted",
            CircuitBreakerEvent::CallRejected { .. } => "call_rejected",
            CircuitBreakerEvent::SuccessRecorded { .. } => "success_recorded",
            CircuitBreakerEvent::FailureRecorded { .. } => "failure_recorded",
            CircuitBreakerEvent::TimeoutRecorded { .. } => "timeout_recorded",
            CircuitBreakerEvent::StateTransition { .. } => "state_transition",
            CircuitBreakerEvent::Reset { .. } => "reset",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CircuitBreakerEvent::CallPermitted { timestamp, .. }
            | CircuitBreakerEvent::CallRejected { timestamp, .. }
            | CircuitBreakerEvent::SuccessRecorded { timestamp, .. }
            | CircuitBreakerEvent::FailureRecorded { timestamp, .. }
            | CircuitBreakerEvent::TimeoutRecorded { timestamp, .. }
            | CircuitBreakerEvent::StateTransition { timestamp, .. }
            | CircuitBreakerEvent::Reset { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            CircuitBreakerEvent::CallPermitted { name, .. }
            | CircuitBreakerEvent::CallRejected { name, .. }
            | CircuitBreakerEvent::SuccessRecorded { name, .. }
            | CircuitBreakerEvent::FailureRecorded { name, .. }
            | CircuitBreakerEvent::TimeoutRecorded { name, .. }
            | CircuitBreakerEvent::StateTransition { name, .. }
            | CircuitBreakerEvent::Reset { name, .. } => name,
        }
    }
}
