//! Property tests for the circuit breaker.
//!
//! Invariants tested:
//! - The breaker opens exactly when the consecutive failure streak reaches the threshold
//! - An open breaker never invokes the operation before its cooldown
//! - A half-open probe decides the next state on its own
//! - Reset always yields CLOSED with zeroed counters

use super::paused_runtime;
use breakwater_circuitbreaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn breaker(threshold: u32) -> CircuitBreaker {
    CircuitBreaker::new(
        CircuitBreakerConfig::builder()
            .name("prop")
            .failure_threshold(threshold)
            .recovery_timeout(Duration::from_secs(60))
            .timeout(Duration::from_secs(1))
            .monitoring(false)
            .build(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: the state after a sequence of outcomes matches a simple model
    #[test]
    fn state_follows_failure_streak(
        threshold in 1u32..=6,
        outcomes in prop::collection::vec(any::<bool>(), 0..40),
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let cb = breaker(threshold);
            let invoked = Arc::new(AtomicUsize::new(0));

            let mut streak = 0u32;
            let mut open = false;
            let mut expected_invocations = 0usize;

            for ok in outcomes {
                let i = Arc::clone(&invoked);
                let result = cb
                    .execute(move || {
                        i.fetch_add(1, Ordering::SeqCst);
                        async move { if ok { Ok(()) } else { Err("fail") } }
                    })
                    .await;

                if open {
                    prop_assert!(result.unwrap_err().is_circuit_open());
                    continue;
                }
                expected_invocations += 1;
                if ok {
                    streak = 0;
                } else {
                    streak += 1;
                    if streak >= threshold {
                        open = true;
                    }
                }
            }

            let expected_state = if open { CircuitState::Open } else { CircuitState::Closed };
            prop_assert_eq!(cb.state(), expected_state);
            prop_assert_eq!(invoked.load(Ordering::SeqCst), expected_invocations);
            Ok(())
        })?;
    }

    /// Property: whatever happened before, a half-open probe alone decides the next state
    #[test]
    fn probe_outcome_decides(threshold in 1u32..=5, probe_succeeds in any::<bool>()) {
        let rt = paused_runtime();
        rt.block_on(async {
            let cb = breaker(threshold);
            for _ in 0..threshold {
                let _ = cb.execute(|| async { Err::<(), _>("fail") }).await;
            }
            prop_assert_eq!(cb.state(), CircuitState::Open);

            tokio::time::advance(Duration::from_secs(60)).await;
            let _ = cb
                .execute(move || async move {
                    if probe_succeeds { Ok(()) } else { Err("probe failed") }
                })
                .await;

            let expected = if probe_succeeds { CircuitState::Closed } else { CircuitState::Open };
            prop_assert_eq!(cb.state(), expected);
            if !probe_succeeds {
                prop_assert!(cb.time_until_probe().is_some_and(|d| d == Duration::from_secs(60)));
            }
            Ok(())
        })?;
    }

    /// Property: reset is idempotent from any reachable state
    #[test]
    fn reset_from_any_state(
        failures in 0usize..10,
        successes in 0usize..10,
        resets in 1usize..4,
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let cb = breaker(3);
            for _ in 0..successes {
                let _ = cb.execute(|| async { Ok::<_, &str>(()) }).await;
            }
            for _ in 0..failures {
                let _ = cb.execute(|| async { Err::<(), _>("fail") }).await;
            }

            for _ in 0..resets {
                cb.reset();
            }

            let stats = cb.stats();
            prop_assert_eq!(stats.state, CircuitState::Closed);
            prop_assert_eq!(stats.failure_count, 0);
            prop_assert_eq!(stats.success_count, 0);
            prop_assert!(stats.next_attempt_time.is_none());
            Ok(())
        })?;
    }
}
