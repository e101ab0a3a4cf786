use super::{DbError, facade};
use breakwater::{BreakerOptions, CircuitBreakerError, CircuitState};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn returns_operation_value() {
    let resilience = facade(3);

    let rows = resilience
        .execute_with_circuit_breaker("users-db", || async { Ok::<_, DbError>(vec![1, 2, 3]) }, None)
        .await
        .unwrap();

    assert_eq!(rows, vec![1, 2, 3]);
    assert_eq!(resilience.get_stats("users-db").unwrap().success_count, 1);
}

#[tokio::test(start_paused = true)]
async fn operation_error_is_passed_through() {
    let resilience = facade(3);

    let err = resilience
        .execute_with_circuit_breaker("users-db", || async { Err::<(), _>(DbError("deadlock")) }, None)
        .await
        .unwrap_err();

    assert_eq!(err.into_operation(), Some(DbError("deadlock")));
}

#[tokio::test(start_paused = true)]
async fn open_breaker_fails_fast_without_calling() {
    let resilience = facade(2);
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        let c = Arc::clone(&calls);
        let _ = resilience
            .execute_with_circuit_breaker(
                "orders-api",
                move || {
                    c.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(DbError("503")) }
                },
                None,
            )
            .await;
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(resilience.open_circuits(), vec!["orders-api".to_string()]);

    let err = resilience
        .execute_with_circuit_breaker("orders-api", || async { Ok::<_, DbError>(()) }, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CircuitBreakerError::OpenCircuit { ref name } if name == "orders-api"));
}

#[tokio::test(start_paused = true)]
async fn services_are_isolated() {
    let resilience = facade(1);

    let _ = resilience
        .execute_with_circuit_breaker("flaky", || async { Err::<(), _>(DbError("down")) }, None)
        .await;
    let healthy = resilience
        .execute_with_circuit_breaker("steady", || async { Ok::<_, DbError>("ok") }, None)
        .await;

    assert_eq!(healthy.unwrap(), "ok");
    assert_eq!(resilience.get_stats("flaky").unwrap().state, CircuitState::Open);
    assert_eq!(resilience.get_stats("steady").unwrap().state, CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn recovers_after_cooldown() {
    let resilience = facade(1);
    let _ = resilience
        .execute_with_circuit_breaker("search", || async { Err::<(), _>(DbError("down")) }, None)
        .await;

    tokio::time::advance(Duration::from_secs(1)).await;
    let value = resilience
        .execute_with_circuit_breaker("search", || async { Ok::<_, DbError>(42) }, None)
        .await
        .unwrap();

    assert_eq!(value, 42);
    assert!(resilience.open_circuits().is_empty());
}

#[tokio::test(start_paused = true)]
async fn first_call_options_configure_the_breaker() {
    let resilience = facade(5);

    let err = resilience
        .execute_with_circuit_breaker(
            "reports",
            || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, DbError>(())
            },
            Some(BreakerOptions::new().timeout(Duration::from_millis(100))),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    // Later options do not reconfigure the existing breaker.
    let err = resilience
        .execute_with_circuit_breaker(
            "reports",
            || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, DbError>(())
            },
            Some(BreakerOptions::new().timeout(Duration::from_secs(1))),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test(start_paused = true)]
async fn per_service_settings_sit_between_defaults_and_call_options() {
    let resilience = breakwater::Resilience::builder()
        .breaker_defaults(BreakerOptions::new().failure_threshold(5).monitoring(false))
        .service("payments", BreakerOptions::new().failure_threshold(1))
        .build();

    let payments = resilience.breaker("payments", None);
    let ledger = resilience.breaker("ledger", None);
    let refunds = resilience.breaker("refunds", Some(BreakerOptions::new().failure_threshold(3)));

    assert_eq!(payments.config().failure_threshold(), 1);
    assert_eq!(ledger.config().failure_threshold(), 5);
    assert_eq!(refunds.config().failure_threshold(), 3);
}

#[tokio::test(start_paused = true)]
async fn clones_share_breakers() {
    let resilience = facade(1);
    let clone = resilience.clone();

    let _ = clone
        .execute_with_circuit_breaker("shared", || async { Err::<(), _>(DbError("down")) }, None)
        .await;

    assert_eq!(resilience.get_stats("shared").unwrap().state, CircuitState::Open);
}
