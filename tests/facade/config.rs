use super::{DbError, sample};
use breakwater::config::ValidationError;
use breakwater::{ConfigError, Resilience, ResilienceConfig};
use breakwater_metrics::names;
use std::io::Write;
use std::time::Duration;

const CONFIG: &str = r#"
[circuit_breaker]
failure_threshold = 3
recovery_timeout_ms = 2000
timeout_ms = 250
monitoring = false

[retry]
max_retries = 1
retry_delay_ms = 50
backoff_multiplier = 3.0

[metrics]
sample_interval_secs = 10

[services.payments]
failure_threshold = 1
"#;

#[tokio::test(start_paused = true)]
async fn facade_built_from_file_settings() {
    let config = ResilienceConfig::from_toml_str(CONFIG).unwrap();
    let resilience = Resilience::from_config(&config);

    let payments = resilience.breaker("payments", None);
    assert_eq!(payments.config().failure_threshold(), 1);
    assert_eq!(payments.config().timeout(), Duration::from_millis(250));

    let orders = resilience.breaker("orders", None);
    assert_eq!(orders.config().failure_threshold(), 3);
    assert_eq!(orders.config().recovery_timeout(), Duration::from_secs(2));
    assert!(!orders.config().monitoring());

    let _: Result<(), _> = resilience
        .retry_operation(|| async { Err(DbError("down")) }, "configured", None)
        .await;
    let text = resilience.get_metrics();
    assert_eq!(
        sample(&text, names::RETRY_ATTEMPTS_TOTAL, &[("operation", "configured"), ("outcome", "retry")]),
        Some(1.0)
    );
}

#[test]
fn unknown_fields_are_rejected() {
    let err = ResilienceConfig::from_toml_str("[circuit_breaker]\nthreshold = 3\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn every_invalid_value_is_reported() {
    let err = ResilienceConfig::from_toml_str(
        "[circuit_breaker]\nfailure_threshold = 0\n\n[retry]\njitter = 2.0\n",
    )
    .unwrap_err();

    let ConfigError::Validation(errors) = err else {
        panic!("expected validation error, got {err:?}");
    };
    let fields: Vec<_> = errors.iter().map(|e: &ValidationError| e.field.as_str()).collect();
    assert_eq!(fields, vec!["circuit_breaker.failure_threshold", "retry.jitter"]);
}

#[test]
fn loads_from_disk() {
    let path = std::env::temp_dir().join(format!("breakwater-{}.toml", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    drop(file);

    let config = ResilienceConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.sample_interval(), Duration::from_secs(10));
    assert_eq!(config.breaker_options_for("payments").failure_threshold, Some(1));
}

#[test]
fn missing_file_names_the_path() {
    let err = ResilienceConfig::from_file("/nonexistent/breakwater.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("/nonexistent/breakwater.toml"));
}

#[tokio::test(start_paused = true)]
async fn process_sampling_flag_controls_the_sampler() {
    let enabled = ResilienceConfig::from_toml_str("[metrics]\nsample_interval_secs = 5\n").unwrap();
    let resilience = Resilience::from_config(&enabled);
    let sampler = resilience.start_configured_sampler().expect("sampling is on by default");
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(sample(&resilience.get_metrics(), names::SYSTEM_MEMORY_TOTAL_BYTES, &[]).is_some());
    sampler.abort();

    let disabled = ResilienceConfig::from_toml_str("[metrics]\nprocess_sampling = false\n").unwrap();
    let resilience = Resilience::from_config(&disabled);
    assert!(resilience.start_configured_sampler().is_none());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(sample(&resilience.get_metrics(), names::SYSTEM_MEMORY_TOTAL_BYTES, &[]).is_none());
}
