use super::{DbError, facade, sample};
use breakwater::{MetricsSink, Resilience};
use breakwater_metrics::names;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn outcomes_are_counted_per_service() {
    let resilience = facade(2);

    let _ = resilience
        .execute_with_circuit_breaker("db", || async { Ok::<_, DbError>(()) }, None)
        .await;
    for _ in 0..3 {
        let _ = resilience
            .execute_with_circuit_breaker("db", || async { Err::<(), _>(DbError("down")) }, None)
            .await;
    }

    let text = resilience.get_metrics();
    let outcome = |o| sample(&text, names::REQUESTS_TOTAL, &[("service", "db"), ("outcome", o)]);
    assert_eq!(outcome("success"), Some(1.0));
    assert_eq!(outcome("failure"), Some(2.0));
    assert_eq!(outcome("rejected"), Some(1.0));
    assert_eq!(
        sample(&text, names::FAILURES_TOTAL, &[("service", "db"), ("error_type", "DbError")]),
        Some(2.0)
    );
    assert_eq!(sample(&text, names::STATE, &[("service", "db")]), Some(1.0));
    assert_eq!(
        sample(
            &text,
            names::TRANSITIONS_TOTAL,
            &[("service", "db"), ("from", "CLOSED"), ("to", "OPEN")]
        ),
        Some(1.0)
    );
}

#[tokio::test(start_paused = true)]
async fn timeouts_are_labelled() {
    let resilience = facade(5);

    let _ = resilience
        .execute_with_circuit_breaker(
            "slow",
            || std::future::pending::<Result<(), DbError>>(),
            None,
        )
        .await;

    let text = resilience.get_metrics();
    assert_eq!(
        sample(&text, names::REQUESTS_TOTAL, &[("service", "slow"), ("outcome", "timeout")]),
        Some(1.0)
    );
    assert_eq!(
        sample(&text, names::FAILURES_TOTAL, &[("service", "slow"), ("error_type", "timeout")]),
        Some(1.0)
    );
}

#[tokio::test(start_paused = true)]
async fn durations_land_in_histogram() {
    let resilience = facade(5);

    let _ = resilience
        .execute_with_circuit_breaker(
            "api",
            || async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok::<_, DbError>(())
            },
            None,
        )
        .await;

    let text = resilience.get_metrics();
    let count = format!("{}_count", names::REQUEST_DURATION_SECONDS);
    assert_eq!(sample(&text, &count, &[("service", "api"), ("outcome", "success")]), Some(1.0));
    let bucket = format!("{}_bucket", names::REQUEST_DURATION_SECONDS);
    assert_eq!(
        sample(&text, &bucket, &[("service", "api"), ("le", "0.05")]),
        Some(1.0)
    );
    assert_eq!(
        sample(&text, &bucket, &[("service", "api"), ("le", "0.025")]),
        Some(0.0)
    );
}

#[tokio::test(start_paused = true)]
async fn reset_clears_counters_but_not_breakers() {
    let resilience = facade(1);
    let _ = resilience
        .execute_with_circuit_breaker("db", || async { Err::<(), _>(DbError("down")) }, None)
        .await;

    resilience.reset_metrics();

    let text = resilience.get_metrics();
    assert!(sample(&text, names::REQUESTS_TOTAL, &[("service", "db")]).is_none());
    assert_eq!(resilience.open_circuits(), vec!["db".to_string()]);

    resilience.record_http_request("get", "/health", 200, Duration::from_millis(3));
    let text = resilience.get_metrics();
    assert_eq!(
        sample(
            &text,
            names::HTTP_REQUESTS_TOTAL,
            &[("method", "GET"), ("route", "/health"), ("status", "200")]
        ),
        Some(1.0)
    );
}

#[tokio::test(start_paused = true)]
async fn facades_do_not_share_series() {
    let first = facade(3);
    let second = facade(3);

    let _ = first
        .execute_with_circuit_breaker("db", || async { Ok::<_, DbError>(()) }, None)
        .await;

    assert!(sample(&second.get_metrics(), names::REQUESTS_TOTAL, &[("service", "db")]).is_none());
    assert!(second.get_stats("db").is_none());
}

#[tokio::test(start_paused = true)]
async fn injected_sink_receives_records() {
    let sink = Arc::new(MetricsSink::new());
    let resilience = Resilience::builder().metrics(Arc::clone(&sink)).build();

    let _ = resilience
        .execute_with_circuit_breaker("cache", || async { Ok::<_, DbError>(()) }, None)
        .await;

    assert_eq!(
        sample(&sink.get_metrics(), names::REQUESTS_TOTAL, &[("service", "cache"), ("outcome", "success")]),
        Some(1.0)
    );
}

#[tokio::test(start_paused = true)]
async fn sampler_publishes_memory_gauges() {
    let resilience = Resilience::builder()
        .sample_interval(Duration::from_secs(30))
        .build();

    let sampler = resilience.start_process_sampler();
    // The first tick fires immediately.
    tokio::time::sleep(Duration::from_millis(1)).await;

    let text = resilience.get_metrics();
    assert!(sample(&text, names::SYSTEM_MEMORY_TOTAL_BYTES, &[]).is_some_and(|bytes| bytes > 0.0));

    resilience.reset_metrics();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(sample(&resilience.get_metrics(), names::SYSTEM_MEMORY_USED_BYTES, &[]).is_some());

    sampler.abort();
}
