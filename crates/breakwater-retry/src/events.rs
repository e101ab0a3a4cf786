use breakwater_core::ResilienceEvent;
use std::time::Duration;
use tokio::time::Instant;

/// Events emitted while retrying an operation.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// An attempt is starting. `attempt` is 1 for the initial call.
    Attempt {
        name: String,
        timestamp: Instant,
        attempt: usize,
    },
    /// An attempt failed and another will follow after `delay`.
    Retry {
        name: String,
        timestamp: Instant,
        attempt: usize,
        delay: Duration,
    },
    /// The operation succeeded after `attempts` attempts.
    Success {
        name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// Every allowed attempt failed; the last error goes back to the caller.
    Exhausted {
        name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// The retry predicate rejected the error; no further attempts.
    IgnoredError {
        name: String,
        timestamp: Instant,
        attempt: usize,
    },
}

impl ResilienceEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Attempt { .. } => "attempt",
            RetryEvent::Retry { .. } => "retry",
            RetryEvent::Success { .. } => "success",
            RetryEvent::Exhausted { .. } => "exhausted",
            RetryEvent::IgnoredError { .. } => "ignored_error",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Attempt { timestamp, .. }
            | RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::Exhausted { timestamp, .. }
            | RetryEvent::IgnoredError { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            RetryEvent::Attempt { name, .. }
            | RetryEvent::Retry { name, .. }
            | RetryEvent::Success { name, .. }
            | RetryEvent::Exhausted { name, .. }
            | RetryEvent::IgnoredError { name, .. } => name,
        }
    }
}
