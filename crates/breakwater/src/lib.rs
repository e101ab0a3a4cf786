//! Resilience facade: named circuit breakers, retries and metrics behind
//! one handle.
//!
//! [`Resilience`] owns a [`BreakerRegistry`] and a shared [`MetricsSink`].
//! Every call made through it is routed through the breaker registered for
//! its service name (created on first use) and its outcome is recorded.
//!
//! ```rust
//! use breakwater::{BreakerOptions, Resilience};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let resilience = Resilience::new();
//!
//! let user = resilience
//!     .execute_with_circuit_breaker(
//!         "users-db",
//!         || async { Ok::<_, std::io::Error>("ada") },
//!         Some(BreakerOptions::new().timeout(Duration::from_secs(2))),
//!     )
//!     .await;
//!
//! println!("{}", resilience.get_metrics());
//! # }
//! ```
//!
//! Build one facade at startup and share it; separate instances (in tests,
//! for example) never see each other's breakers or metrics.

pub use breakwater_circuitbreaker::{
    BreakerOptions, BreakerRegistry, CircuitBreaker, CircuitBreakerError, CircuitBreakerStats,
    CircuitState,
};
pub use breakwater_metrics::{MetricsSink, RetryOutcome};
pub use breakwater_retry::{RetryConfigBuilder, RetryOptions};
pub use config::{ConfigError, ResilienceConfig};

pub mod config;

use breakwater_retry::RetryConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Entry point for protected calls, retries, introspection and metrics.
///
/// Cloning is cheap and shares every breaker and the metrics sink.
#[derive(Clone, Debug)]
pub struct Resilience {
    registry: BreakerRegistry,
    metrics: Arc<MetricsSink>,
    service_options: Arc<HashMap<String, BreakerOptions>>,
    retry_defaults: RetryOptions,
    sample_interval: Duration,
    process_sampling: bool,
}

impl Default for Resilience {
    fn default() -> Self {
        Self::new()
    }
}

impl Resilience {
    /// Facade with default breaker and retry settings and a fresh sink.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ResilienceBuilder {
        ResilienceBuilder::default()
    }

    /// Facade configured from a loaded [`ResilienceConfig`].
    pub fn from_config(config: &ResilienceConfig) -> Self {
        let mut builder = Self::builder()
            .breaker_defaults(config.breaker_options())
            .retry_defaults(config.retry_options())
            .sample_interval(config.sample_interval())
            .process_sampling(config.metrics.process_sampling);
        for (service, settings) in &config.services {
            builder = builder.service(service.clone(), settings.to_options());
        }
        builder.build()
    }

    /// Runs `operation` through the breaker registered for `service`.
    ///
    /// `options` only matter for the call that creates the breaker. The
    /// returned error is the operation's own (in
    /// [`CircuitBreakerError::Operation`]), a timeout, or an open-circuit
    /// rejection.
    pub async fn execute_with_circuit_breaker<F, Fut, T, E>(
        &self,
        service: &str,
        operation: F,
        options: Option<BreakerOptions>,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let breaker = self.breaker(service, options);
        let start = Instant::now();
        let result = breaker.execute(operation).await;

        match &result {
            Ok(_) => self.metrics.record_success(service, start.elapsed()),
            Err(CircuitBreakerError::Operation(_)) => {
                self.metrics.record_failure(service, error_type::<E>())
            }
            Err(CircuitBreakerError::Timeout { .. }) => {
                self.metrics.record_timeout(service, start.elapsed())
            }
            Err(CircuitBreakerError::OpenCircuit { .. }) => self.metrics.record_rejection(service),
        }
        self.metrics
            .record_circuit_breaker_state(service, breaker.state_sync());

        result
    }

    /// Like [`execute_with_circuit_breaker`](Self::execute_with_circuit_breaker),
    /// but serves `fallback` when the breaker rejects the call.
    ///
    /// Operation errors and timeouts are still returned.
    pub async fn execute_with_fallback<F, Fut, T, E, FB, FBFut>(
        &self,
        service: &str,
        operation: F,
        fallback: FB,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
        FB: FnOnce() -> FBFut,
        FBFut: Future<Output = T>,
    {
        match self.execute_with_circuit_breaker(service, operation, None).await {
            Err(CircuitBreakerError::OpenCircuit { .. }) => {
                self.metrics.record_circuit_breaker_fallback(service);
                tracing::debug!(service, "circuit open, serving fallback");
                Ok(fallback().await)
            }
            other => other,
        }
    }

    /// Retries `operation`, sending every attempt through the breaker for
    /// `service`.
    ///
    /// An open-circuit rejection ends the loop at once; operation errors and
    /// timeouts are retried up to the bound.
    pub async fn execute_with_retry<F, Fut, T, E>(
        &self,
        service: &str,
        description: &str,
        operation: F,
        options: Option<RetryOptions>,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let retry = self
            .retry_builder(description, options)
            .retry_on(|error: &CircuitBreakerError<E>| !error.is_circuit_open())
            .build();

        // Each attempt borrows the operation only while the breaker starts it,
        // so a rejected attempt never calls it.
        let operation = Mutex::new(operation);
        let operation = &operation;
        retry
            .execute(move || {
                self.execute_with_circuit_breaker(service, move || (*operation.lock())(), None)
            })
            .await
    }

    /// Retries `operation` without breaker protection.
    ///
    /// The last error is returned unchanged once the bound is reached.
    pub async fn retry_operation<F, Fut, T, E>(
        &self,
        operation: F,
        description: &str,
        options: Option<RetryOptions>,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.retry_builder(description, options)
            .build()
            .execute(operation)
            .await
    }

    /// Retry builder preloaded with the facade's defaults and metric hooks.
    pub fn retry_builder<E>(
        &self,
        description: &str,
        options: Option<RetryOptions>,
    ) -> RetryConfigBuilder<E> {
        let options = self.retry_defaults.merge(options.unwrap_or_default());
        let operation: Arc<str> = Arc::from(description);

        let hook = |outcome: RetryOutcome| {
            let sink = Arc::clone(&self.metrics);
            let operation = Arc::clone(&operation);
            move || sink.record_retry_attempt(&operation, outcome)
        };
        let on_success = hook(RetryOutcome::Success);
        let on_retry = hook(RetryOutcome::Retry);
        let on_exhausted = hook(RetryOutcome::Exhausted);
        let on_ignored = hook(RetryOutcome::Ignored);

        RetryConfig::builder()
            .name(description)
            .options(options)
            .on_success(move |_| on_success())
            .on_retry(move |_, _| on_retry())
            .on_exhausted(move |_| on_exhausted())
            .on_ignored_error(on_ignored)
    }

    /// The breaker for `service`, created with `options` if absent.
    pub fn breaker(&self, service: &str, options: Option<BreakerOptions>) -> CircuitBreaker {
        let configured = self.service_options.get(service).copied().unwrap_or_default();
        self.registry
            .get_or_create(service, configured.merge(options.unwrap_or_default()))
    }

    pub fn get_stats(&self, service: &str) -> Option<CircuitBreakerStats> {
        self.registry.get_stats(service)
    }

    pub fn get_all_stats(&self) -> HashMap<String, CircuitBreakerStats> {
        self.registry.get_all_stats()
    }

    /// Resets one breaker. Returns false if `service` has no breaker yet.
    pub fn reset(&self, service: &str) -> bool {
        let reset = self.registry.reset(service);
        if reset {
            self.metrics
                .record_circuit_breaker_state(service, CircuitState::Closed);
        }
        reset
    }

    pub fn reset_all(&self) {
        self.registry.reset_all();
        for service in self.registry.names() {
            self.metrics
                .record_circuit_breaker_state(&service, CircuitState::Closed);
        }
    }

    /// Services whose breaker is currently OPEN.
    pub fn open_circuits(&self) -> Vec<String> {
        self.registry.open_circuits()
    }

    /// Prometheus text snapshot of every series.
    pub fn get_metrics(&self) -> String {
        self.metrics.get_metrics()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset_metrics();
    }

    /// Records one served HTTP request.
    pub fn record_http_request(&self, method: &str, route: &str, status: u16, duration: Duration) {
        self.metrics
            .record_http_request(method, route, status, duration);
    }

    /// Starts the background memory sampler for this facade's sink.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start_process_sampler(&self) -> JoinHandle<()> {
        breakwater_metrics::spawn_process_sampler(Arc::clone(&self.metrics), self.sample_interval)
    }

    /// Starts the memory sampler unless process sampling is turned off.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start_configured_sampler(&self) -> Option<JoinHandle<()>> {
        if !self.process_sampling {
            tracing::debug!("process sampling disabled");
            return None;
        }
        Some(self.start_process_sampler())
    }

    pub fn registry(&self) -> &BreakerRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<MetricsSink> {
        &self.metrics
    }
}

/// Builder for [`Resilience`].
#[derive(Debug, Default)]
pub struct ResilienceBuilder {
    breaker_defaults: BreakerOptions,
    retry_defaults: RetryOptions,
    services: HashMap<String, BreakerOptions>,
    metrics: Option<Arc<MetricsSink>>,
    sample_interval: Option<Duration>,
    process_sampling: Option<bool>,
}

impl ResilienceBuilder {
    /// Options applied to every breaker before per-service and per-call ones.
    pub fn breaker_defaults(mut self, options: BreakerOptions) -> Self {
        self.breaker_defaults = options;
        self
    }

    pub fn retry_defaults(mut self, options: RetryOptions) -> Self {
        self.retry_defaults = options;
        self
    }

    /// Overrides for one service, applied when its breaker is created.
    pub fn service(mut self, name: impl Into<String>, options: BreakerOptions) -> Self {
        self.services.insert(name.into(), options);
        self
    }

    /// Records into an existing sink instead of a fresh one.
    pub fn metrics(mut self, sink: Arc<MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    /// Period of [`Resilience::start_process_sampler`]; 30s by default.
    pub fn sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = Some(interval);
        self
    }

    /// Whether [`Resilience::start_configured_sampler`] runs; on by default.
    pub fn process_sampling(mut self, enabled: bool) -> Self {
        self.process_sampling = Some(enabled);
        self
    }

    pub fn build(self) -> Resilience {
        let metrics = self.metrics.unwrap_or_default();

        let sink = Arc::clone(&metrics);
        let registry = BreakerRegistry::new()
            .with_defaults(self.breaker_defaults)
            .with_configure(move |name, builder| {
                let sink = Arc::clone(&sink);
                let service = name.to_owned();
                builder.on_state_transition(move |from, to| {
                    sink.record_state_transition(&service, from, to)
                })
            });

        Resilience {
            registry,
            metrics,
            service_options: Arc::new(self.services),
            retry_defaults: self.retry_defaults,
            sample_interval: self
                .sample_interval
                .unwrap_or(breakwater_metrics::DEFAULT_SAMPLE_INTERVAL),
            process_sampling: self.process_sampling.unwrap_or(true),
        }
    }
}

/// Last path segment of `E`'s type name, without generic arguments.
fn error_type<E>() -> &'static str {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
