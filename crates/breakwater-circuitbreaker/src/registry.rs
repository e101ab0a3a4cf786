use crate::{BreakerOptions, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder};
use crate::{CircuitBreakerStats, CircuitState};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Hook applied to every breaker's builder right before it is built.
///
/// Receives the breaker name. Used to attach event listeners (metrics,
/// alerting) to breakers the registry creates on demand.
pub type ConfigureFn =
    Arc<dyn Fn(&str, CircuitBreakerConfigBuilder) -> CircuitBreakerConfigBuilder + Send + Sync>;

/// Name-keyed collection of circuit breakers, created on first use.
///
/// The first registration of a name fixes that breaker's configuration;
/// options supplied on later lookups are ignored.
#[derive(Clone, Default)]
pub struct BreakerRegistry {
    breakers: Arc<DashMap<String, CircuitBreaker>>,
    defaults: BreakerOptions,
    configure: Option<ConfigureFn>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options applied underneath every per-call override.
    pub fn with_defaults(mut self, defaults: BreakerOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Installs a builder hook run for every breaker this registry creates.
    pub fn with_configure<F>(mut self, configure: F) -> Self
    where
        F: Fn(&str, CircuitBreakerConfigBuilder) -> CircuitBreakerConfigBuilder
            + Send
            + Sync
            + 'static,
    {
        self.configure = Some(Arc::new(configure));
        self
    }

    pub fn defaults(&self) -> BreakerOptions {
        self.defaults
    }

    /// Returns the breaker registered under `name`, creating it from
    /// `options` (layered over the registry defaults) if absent.
    ///
    /// Concurrent first calls for the same name create exactly one breaker.
    pub fn get_or_create(&self, name: &str, options: BreakerOptions) -> CircuitBreaker {
        if let Some(existing) = self.breakers.get(name) {
            return existing.clone();
        }

        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let breaker = CircuitBreaker::new(self.build_config(name, options));
                tracing::debug!(
                    breaker = name,
                    failure_threshold = breaker.config().failure_threshold(),
                    recovery_timeout_ms = breaker.config().recovery_timeout().as_millis() as u64,
                    timeout_ms = breaker.config().timeout().as_millis() as u64,
                    "registered circuit breaker"
                );
                breaker
            })
            .clone()
    }

    fn build_config(&self, name: &str, options: BreakerOptions) -> CircuitBreakerConfig {
        let builder = CircuitBreakerConfig::builder()
            .name(name)
            .options(self.defaults.merge(options));
        match &self.configure {
            Some(configure) => configure(name, builder).build(),
            None => builder.build(),
        }
    }

    pub fn get(&self, name: &str) -> Option<CircuitBreaker> {
        self.breakers.get(name).map(|entry| entry.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.breakers.contains_key(name)
    }

    /// Snapshot of one breaker, or `None` for an unknown name.
    pub fn get_stats(&self, name: &str) -> Option<CircuitBreakerStats> {
        self.get(name).map(|breaker| breaker.stats())
    }

    /// Snapshot of every registered breaker, keyed by name.
    pub fn get_all_stats(&self) -> HashMap<String, CircuitBreakerStats> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect()
    }

    /// Resets one breaker. Returns false for an unknown name.
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        for breaker in self.breakers() {
            breaker.reset();
        }
    }

    /// Names of breakers currently OPEN, sorted.
    pub fn open_circuits(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .breakers
            .iter()
            .filter(|entry| entry.value().state_sync() == CircuitState::Open)
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    // Cloned out so no shard lock is held while a breaker's own mutex is taken.
    fn breakers(&self) -> Vec<CircuitBreaker> {
        self.breakers.iter().map(|e| e.value().clone()).collect()
    }
}

impl std::fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("breakers", &self.names())
            .field("defaults", &self.defaults)
            .field("configure", &self.configure.is_some())
            .finish()
    }
}
