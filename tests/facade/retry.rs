use super::{DbError, facade, sample};
use breakwater::{BreakerOptions, RetryOptions};
use breakwater_metrics::names;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

fn quick() -> Option<RetryOptions> {
    Some(RetryOptions::new().retry_delay(Duration::from_millis(10)))
}

#[tokio::test(start_paused = true)]
async fn four_calls_with_doubling_delays() {
    let resilience = facade(10);
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let start = Instant::now();

    let result: Result<(), _> = resilience
        .retry_operation(
            move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err(DbError("unavailable")) }
            },
            "load profile",
            Some(
                RetryOptions::new()
                    .max_retries(3)
                    .retry_delay(Duration::from_millis(1000))
                    .backoff_multiplier(2.0),
            ),
        )
        .await;

    assert_eq!(result, Err(DbError("unavailable")));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(start.elapsed(), Duration::from_millis(7000));

    let text = resilience.get_metrics();
    let outcome = |o| {
        sample(
            &text,
            names::RETRY_ATTEMPTS_TOTAL,
            &[("operation", "load profile"), ("outcome", o)],
        )
    };
    assert_eq!(outcome("retry"), Some(3.0));
    assert_eq!(outcome("exhausted"), Some(1.0));
}

#[tokio::test(start_paused = true)]
async fn facade_retry_defaults_apply() {
    let resilience = breakwater::Resilience::builder()
        .retry_defaults(RetryOptions::new().max_retries(1).retry_delay(Duration::from_millis(5)))
        .build();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);

    let _: Result<(), _> = resilience
        .retry_operation(
            move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err(DbError("down")) }
            },
            "defaults",
            None,
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn retries_through_breaker_until_success() {
    let resilience = facade(10);
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);

    let value = resilience
        .execute_with_retry(
            "inventory",
            "reserve stock",
            move || {
                let n = c.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(DbError("lock timeout"))
                    } else {
                        Ok(n)
                    }
                }
            },
            quick(),
        )
        .await
        .unwrap();

    assert_eq!(value, 2);
    let stats = resilience.get_stats("inventory").unwrap();
    assert_eq!(stats.success_count, 1);
}

#[tokio::test(start_paused = true)]
async fn open_circuit_stops_retrying() {
    let resilience = facade(2);
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);

    let err = resilience
        .execute_with_retry(
            "inventory",
            "reserve stock",
            move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(DbError("down")) }
            },
            Some(RetryOptions::new().max_retries(5).retry_delay(Duration::from_millis(10))),
        )
        .await
        .unwrap_err();

    // Two failures open the breaker; the third attempt is rejected.
    assert!(err.is_circuit_open());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let text = resilience.get_metrics();
    assert_eq!(
        sample(
            &text,
            names::RETRY_ATTEMPTS_TOTAL,
            &[("operation", "reserve stock"), ("outcome", "ignored")]
        ),
        Some(1.0)
    );
}

#[tokio::test(start_paused = true)]
async fn timeouts_are_retried() {
    let resilience = facade(10);
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    resilience.breaker("slow", Some(BreakerOptions::new().timeout(Duration::from_millis(50))));

    let value = resilience
        .execute_with_retry(
            "slow",
            "slow read",
            move || {
                let n = c.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                    Ok::<_, DbError>(n)
                }
            },
            quick(),
        )
        .await
        .unwrap();

    assert_eq!(value, 1);
    assert_eq!(resilience.get_stats("slow").unwrap().failure_count, 0);
}
