use super::{DbError, facade, sample};
use breakwater_metrics::names;

#[tokio::test(start_paused = true)]
async fn fallback_served_when_open() {
    let resilience = facade(1);
    let _ = resilience
        .execute_with_circuit_breaker("catalog", || async { Err::<Vec<&str>, _>(DbError("down")) }, None)
        .await;

    let items = resilience
        .execute_with_fallback(
            "catalog",
            || async { Ok::<_, DbError>(vec!["fresh"]) },
            || async { vec!["cached"] },
        )
        .await
        .unwrap();

    assert_eq!(items, vec!["cached"]);
    let text = resilience.get_metrics();
    assert_eq!(sample(&text, names::FALLBACKS_TOTAL, &[("service", "catalog")]), Some(1.0));
}

#[tokio::test(start_paused = true)]
async fn fallback_not_used_when_closed() {
    let resilience = facade(3);

    let items = resilience
        .execute_with_fallback(
            "catalog",
            || async { Ok::<_, DbError>(vec!["fresh"]) },
            || async { vec!["cached"] },
        )
        .await
        .unwrap();

    assert_eq!(items, vec!["fresh"]);
    assert!(sample(&resilience.get_metrics(), names::FALLBACKS_TOTAL, &[]).is_none());
}

#[tokio::test(start_paused = true)]
async fn operation_errors_are_not_masked() {
    let resilience = facade(3);

    let err = resilience
        .execute_with_fallback(
            "catalog",
            || async { Err::<Vec<&str>, _>(DbError("bad query")) },
            || async { vec!["cached"] },
        )
        .await
        .unwrap_err();

    assert!(err.is_operation());
}
