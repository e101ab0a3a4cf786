use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`CircuitBreaker::execute`](crate::CircuitBreaker::execute).
///
/// The three variants keep "the dependency failed" (`Operation`, `Timeout`)
/// apart from "the breaker refused to call it" (`OpenCircuit`).
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The breaker is open; the operation was not invoked.
    #[error("circuit breaker '{name}' is OPEN; call not permitted")]
    OpenCircuit { name: String },

    /// The operation did not settle within the breaker's timeout.
    #[error("operation on '{name}' timed out after {}ms", timeout.as_millis())]
    Timeout { name: String, timeout: Duration },

    /// The operation's own error, unchanged.
    #[error("{0}")]
    Operation(E),
}

impl<E> CircuitBreakerError<E> {
    /// Returns true if the breaker rejected the call.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::OpenCircuit { .. })
    }

    /// Returns true if the breaker's timeout elapsed first.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CircuitBreakerError::Timeout { .. })
    }

    /// Returns true if the operation itself failed.
    pub fn is_operation(&self) -> bool {
        matches!(self, CircuitBreakerError::Operation(_))
    }

    /// Returns the operation error if present.
    pub fn into_operation(self) -> Option<E> {
        match self {
            CircuitBreakerError::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Name of the breaker that produced a synthesized error.
    pub fn breaker_name(&self) -> Option<&str> {
        match self {
            CircuitBreakerError::OpenCircuit { name } | CircuitBreakerError::Timeout { name, .. } => {
                Some(name)
            }
            CircuitBreakerError::Operation(_) => None,
        }
    }
}

impl<E> From<E> for CircuitBreakerError<E> {
    fn from(err: E) -> Self {
        CircuitBreakerError::Operation(err)
    }
}
