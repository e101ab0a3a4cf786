use super::TestError;
use breakwater_retry::RetryConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

fn transient_only() -> RetryConfig<TestError> {
    RetryConfig::builder()
        .name("validated")
        .max_retries(5)
        .retry_delay(Duration::from_millis(100))
        .retry_on(|error: &TestError| matches!(error, TestError::Transient(_)))
        .build()
}

#[tokio::test(start_paused = true)]
async fn non_retryable_error_returns_immediately() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let start = Instant::now();

    let result: Result<(), _> = transient_only()
        .execute(move || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError::Invalid) }
        })
        .await;

    assert_eq!(result, Err(TestError::Invalid));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn retryable_then_fatal_stops_at_fatal() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);

    let result: Result<(), _> = transient_only()
        .execute(move || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TestError::Transient(n))
                } else {
                    Err(TestError::Invalid)
                }
            }
        })
        .await;

    assert_eq!(result, Err(TestError::Invalid));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn predicate_sees_every_error() {
    let inspected = Arc::new(AtomicUsize::new(0));
    let i = Arc::clone(&inspected);
    let config: RetryConfig<TestError> = RetryConfig::builder()
        .max_retries(2)
        .retry_delay(Duration::from_millis(1))
        .retry_on(move |_| {
            i.fetch_add(1, Ordering::SeqCst);
            true
        })
        .build();

    let _ = config
        .execute(|| async { Err::<(), _>(TestError::Transient(0)) })
        .await;

    assert_eq!(inspected.load(Ordering::SeqCst), 3);
}
