//! File-based configuration.
//!
//! ```toml
//! [circuit_breaker]
//! failure_threshold = 5
//! recovery_timeout_ms = 60000
//! timeout_ms = 10000
//! monitoring = true
//!
//! [retry]
//! max_retries = 3
//! retry_delay_ms = 1000
//! backoff_multiplier = 2.0
//! jitter = 0.1
//!
//! [metrics]
//! process_sampling = true
//! sample_interval_secs = 30
//!
//! [services.payments]
//! failure_threshold = 2
//! timeout_ms = 2500
//! ```
//!
//! Durations are integers in milliseconds (seconds for the sample interval).
//! Every table and field is optional.

use breakwater_circuitbreaker::BreakerOptions;
use breakwater_retry::RetryOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading a [`ResilienceConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: &'static str,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: &'static str) -> Self {
        Self {
            field: field.into(),
            message,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Root of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResilienceConfig {
    /// Defaults for every breaker.
    pub circuit_breaker: BreakerSettings,
    /// Defaults for every retry.
    pub retry: RetrySettings,
    pub metrics: MetricsSettings,
    /// Per-service breaker overrides, applied when that breaker is created.
    pub services: BTreeMap<String, ServiceSettings>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub timeout_ms: u64,
    pub monitoring: bool,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
            timeout_ms: 10_000,
            monitoring: true,
        }
    }
}

/// Partial breaker settings for one service.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceSettings {
    pub failure_threshold: Option<u32>,
    pub recovery_timeout_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub monitoring: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: f64,
    pub max_delay_ms: Option<u64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            backoff_multiplier: 2.0,
            jitter: 0.0,
            max_delay_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsSettings {
    /// Whether [`crate::Resilience::start_configured_sampler`] starts the memory sampler.
    pub process_sampling: bool,
    pub sample_interval_secs: u64,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            process_sampling: true,
            sample_interval_secs: 30,
        }
    }
}

impl ResilienceConfig {
    /// Parses and validates TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: ResilienceConfig = toml::from_str(text)?;
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), services = config.services.len(), "loaded resilience configuration");
        Ok(config)
    }

    /// Checks value ranges. Returns every problem, not just the first.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let cb = &self.circuit_breaker;
        if cb.failure_threshold == 0 {
            errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be at least 1"));
        }
        if cb.timeout_ms == 0 {
            errors.push(ValidationError::new("circuit_breaker.timeout_ms", "must be greater than 0"));
        }

        let retry = &self.retry;
        if !(retry.backoff_multiplier >= 1.0 && retry.backoff_multiplier.is_finite()) {
            errors.push(ValidationError::new("retry.backoff_multiplier", "must be a finite number >= 1.0"));
        }
        if !(0.0..=1.0).contains(&retry.jitter) {
            errors.push(ValidationError::new("retry.jitter", "must be between 0.0 and 1.0"));
        }

        if self.metrics.process_sampling && self.metrics.sample_interval_secs == 0 {
            errors.push(ValidationError::new("metrics.sample_interval_secs", "must be greater than 0"));
        }

        for (name, service) in &self.services {
            if service.failure_threshold == Some(0) {
                errors.push(ValidationError::new(
                    format!("services.{name}.failure_threshold"),
                    "must be at least 1",
                ));
            }
            if service.timeout_ms == Some(0) {
                errors.push(ValidationError::new(
                    format!("services.{name}.timeout_ms"),
                    "must be greater than 0",
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Breaker defaults as options.
    pub fn breaker_options(&self) -> BreakerOptions {
        let cb = &self.circuit_breaker;
        BreakerOptions::new()
            .failure_threshold(cb.failure_threshold)
            .recovery_timeout(Duration::from_millis(cb.recovery_timeout_ms))
            .timeout(Duration::from_millis(cb.timeout_ms))
            .monitoring(cb.monitoring)
    }

    /// Overrides configured for `service` alone, if any.
    pub fn service_options(&self, service: &str) -> Option<BreakerOptions> {
        self.services.get(service).map(ServiceSettings::to_options)
    }

    /// Defaults with the overrides for `service` layered on top.
    pub fn breaker_options_for(&self, service: &str) -> BreakerOptions {
        let defaults = self.breaker_options();
        match self.service_options(service) {
            Some(overrides) => defaults.merge(overrides),
            None => defaults,
        }
    }

    pub fn retry_options(&self) -> RetryOptions {
        let retry = &self.retry;
        let options = RetryOptions::new()
            .max_retries(retry.max_retries)
            .retry_delay(Duration::from_millis(retry.retry_delay_ms))
            .backoff_multiplier(retry.backoff_multiplier)
            .jitter(retry.jitter);
        match retry.max_delay_ms {
            Some(ms) => options.max_delay(Duration::from_millis(ms)),
            None => options,
        }
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.metrics.sample_interval_secs)
    }
}

impl ServiceSettings {
    pub fn to_options(&self) -> BreakerOptions {
        BreakerOptions {
            failure_threshold: self.failure_threshold,
            recovery_timeout: self.recovery_timeout_ms.map(Duration::from_millis),
            timeout: self.timeout_ms.map(Duration::from_millis),
            monitoring: self.monitoring,
        }
    }
}
