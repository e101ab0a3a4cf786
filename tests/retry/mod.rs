//! Retry executor tests.
//!
//! Test organization:
//! - backoff.rs: delay schedule under paused time
//! - behavior.rs: attempt counting and error propagation
//! - predicates.rs: non-retryable errors
//! - events.rs: listener hooks

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

mod predicates;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestError {
    Transient(usize),
    Invalid,
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Transient(n) => write!(f, "transient failure #{n}"),
            TestError::Invalid => f.write_str("invalid input"),
        }
    }
}

/// Operation that fails `failures` times before returning the attempt count.
pub fn flaky(
    failures: usize,
    calls: Arc<AtomicUsize>,
) -> impl FnMut() -> std::future::Ready<Result<usize, TestError>> {
    move || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(if n < failures {
            Err(TestError::Transient(n))
        } else {
            Ok(n + 1)
        })
    }
}
