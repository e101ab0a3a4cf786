use crate::process::MemorySample;
use arc_swap::ArcSwap;
use breakwater_circuitbreaker::CircuitState;
use metrics::{counter, gauge, histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusRecorder};
use std::sync::Arc;
use std::time::Duration;

pub const REQUESTS_TOTAL: &str = "circuit_breaker_requests_total";
pub const FAILURES_TOTAL: &str = "circuit_breaker_failures_total";
pub const REQUEST_DURATION_SECONDS: &str = "circuit_breaker_request_duration_seconds";
pub const STATE: &str = "circuit_breaker_state";
pub const TRANSITIONS_TOTAL: &str = "circuit_breaker_transitions_total";
pub const FALLBACKS_TOTAL: &str = "circuit_breaker_fallbacks_total";
pub const RETRY_ATTEMPTS_TOTAL: &str = "retry_attempts_total";
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const PROCESS_RESIDENT_MEMORY_BYTES: &str = "process_resident_memory_bytes";
pub const PROCESS_VIRTUAL_MEMORY_BYTES: &str = "process_virtual_memory_bytes";
pub const SYSTEM_MEMORY_USED_BYTES: &str = "system_memory_used_bytes";
pub const SYSTEM_MEMORY_TOTAL_BYTES: &str = "system_memory_total_bytes";

const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Outcome label of a retry attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Success,
    Retry,
    Exhausted,
    Ignored,
}

impl RetryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryOutcome::Success => "success",
            RetryOutcome::Retry => "retry",
            RetryOutcome::Exhausted => "exhausted",
            RetryOutcome::Ignored => "ignored",
        }
    }
}

/// Counters, gauges and histograms for breakers, retries and HTTP traffic,
/// exported in the Prometheus text format.
///
/// Each sink owns its recorder; nothing is installed globally, so several
/// sinks can coexist in one process. Share one with `Arc` across every
/// collaborator that records. Recording never fails and never blocks on an
/// exporter.
pub struct MetricsSink {
    recorder: ArcSwap<PrometheusRecorder>,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self {
            recorder: ArcSwap::from_pointee(build_recorder()),
        }
    }

    fn with_recorder<F: FnOnce()>(&self, f: F) {
        let recorder = self.recorder.load();
        metrics::with_local_recorder(&**recorder, f);
    }

    /// A permitted call that completed successfully.
    pub fn record_success(&self, service: &str, duration: Duration) {
        let service = service.to_owned();
        self.with_recorder(|| {
            counter!(REQUESTS_TOTAL, "service" => service.clone(), "outcome" => "success")
                .increment(1);
            histogram!(REQUEST_DURATION_SECONDS, "service" => service, "outcome" => "success")
                .record(duration.as_secs_f64());
        });
    }

    /// A permitted call that failed with the operation's own error.
    ///
    /// `error_type` is a short classification of the error (its type name).
    pub fn record_failure(&self, service: &str, error_type: &str) {
        let service = service.to_owned();
        let error_type = error_type.to_owned();
        self.with_recorder(|| {
            counter!(REQUESTS_TOTAL, "service" => service.clone(), "outcome" => "failure")
                .increment(1);
            counter!(FAILURES_TOTAL, "service" => service, "error_type" => error_type)
                .increment(1);
        });
    }

    /// A permitted call that lost the race against the breaker timeout.
    pub fn record_timeout(&self, service: &str, duration: Duration) {
        let service = service.to_owned();
        self.with_recorder(|| {
            counter!(REQUESTS_TOTAL, "service" => service.clone(), "outcome" => "timeout")
                .increment(1);
            counter!(FAILURES_TOTAL, "service" => service.clone(), "error_type" => "timeout")
                .increment(1);
            histogram!(REQUEST_DURATION_SECONDS, "service" => service, "outcome" => "timeout")
                .record(duration.as_secs_f64());
        });
    }

    /// A call refused by an open breaker.
    pub fn record_rejection(&self, service: &str) {
        let service = service.to_owned();
        self.with_recorder(|| {
            counter!(REQUESTS_TOTAL, "service" => service, "outcome" => "rejected").increment(1);
        });
    }

    /// Current breaker state as a gauge: 0 closed, 1 open, 2 half-open.
    pub fn record_circuit_breaker_state(&self, service: &str, state: CircuitState) {
        let service = service.to_owned();
        self.with_recorder(|| {
            gauge!(STATE, "service" => service).set(state.as_gauge());
        });
    }

    /// One transition between breaker states. Also updates the state gauge.
    pub fn record_state_transition(&self, service: &str, from: CircuitState, to: CircuitState) {
        let service = service.to_owned();
        self.with_recorder(|| {
            counter!(
                TRANSITIONS_TOTAL,
                "service" => service.clone(),
                "from" => from.as_str(),
                "to" => to.as_str()
            )
            .increment(1);
            gauge!(STATE, "service" => service).set(to.as_gauge());
        });
    }

    /// A fallback served in place of a rejected call.
    pub fn record_circuit_breaker_fallback(&self, service: &str) {
        let service = service.to_owned();
        self.with_recorder(|| {
            counter!(FALLBACKS_TOTAL, "service" => service).increment(1);
        });
    }

    pub fn record_retry_attempt(&self, operation: &str, outcome: RetryOutcome) {
        let operation = operation.to_owned();
        self.with_recorder(|| {
            counter!(RETRY_ATTEMPTS_TOTAL, "operation" => operation, "outcome" => outcome.as_str())
                .increment(1);
        });
    }

    /// One served HTTP request.
    pub fn record_http_request(&self, method: &str, route: &str, status: u16, duration: Duration) {
        let method = method.to_ascii_uppercase();
        let route = route.to_owned();
        self.with_recorder(|| {
            counter!(
                HTTP_REQUESTS_TOTAL,
                "method" => method.clone(),
                "route" => route.clone(),
                "status" => status.to_string()
            )
            .increment(1);
            histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "route" => route)
                .record(duration.as_secs_f64());
        });
    }

    /// Publishes a process/system memory sample as gauges.
    pub fn record_memory(&self, sample: &MemorySample) {
        self.with_recorder(|| {
            if let Some(resident) = sample.resident_bytes {
                gauge!(PROCESS_RESIDENT_MEMORY_BYTES).set(resident as f64);
            }
            if let Some(virtual_bytes) = sample.virtual_bytes {
                gauge!(PROCESS_VIRTUAL_MEMORY_BYTES).set(virtual_bytes as f64);
            }
            gauge!(SYSTEM_MEMORY_USED_BYTES).set(sample.system_used_bytes as f64);
            gauge!(SYSTEM_MEMORY_TOTAL_BYTES).set(sample.system_total_bytes as f64);
        });
    }

    /// Snapshot of every series in the Prometheus text exposition format.
    pub fn get_metrics(&self) -> String {
        self.recorder.load().handle().render()
    }

    /// Drops every recorded series.
    ///
    /// A running memory sampler keeps publishing into the fresh recorder.
    pub fn reset_metrics(&self) {
        self.recorder.store(Arc::new(build_recorder()));
        tracing::info!("metrics reset");
    }
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsSink").finish_non_exhaustive()
    }
}

fn build_recorder() -> PrometheusRecorder {
    let builder = PrometheusBuilder::new();
    let builder = match builder.set_buckets_for_metric(
        Matcher::Suffix("duration_seconds".to_string()),
        LATENCY_BUCKETS,
    ) {
        Ok(builder) => builder,
        Err(error) => {
            tracing::warn!(%error, "invalid latency buckets, falling back to summaries");
            PrometheusBuilder::new()
        }
    };
    let recorder = builder.build_recorder();
    describe(&recorder);
    recorder
}

fn describe(recorder: &PrometheusRecorder) {
    metrics::with_local_recorder(recorder, || {
        metrics::describe_counter!(REQUESTS_TOTAL, "Calls routed through a circuit breaker, by outcome");
        metrics::describe_counter!(FAILURES_TOTAL, "Failed calls by error type");
        metrics::describe_histogram!(
            REQUEST_DURATION_SECONDS,
            Unit::Seconds,
            "Duration of permitted circuit breaker calls"
        );
        metrics::describe_gauge!(STATE, "Circuit breaker state (0 closed, 1 open, 2 half-open)");
        metrics::describe_counter!(TRANSITIONS_TOTAL, "Circuit breaker state transitions");
        metrics::describe_counter!(FALLBACKS_TOTAL, "Fallbacks served for rejected calls");
        metrics::describe_counter!(RETRY_ATTEMPTS_TOTAL, "Retry executor attempts by outcome");
        metrics::describe_counter!(HTTP_REQUESTS_TOTAL, "HTTP requests served");
        metrics::describe_histogram!(
            HTTP_REQUEST_DURATION_SECONDS,
            Unit::Seconds,
            "HTTP request duration"
        );
        metrics::describe_gauge!(PROCESS_RESIDENT_MEMORY_BYTES, Unit::Bytes, "Resident set size");
        metrics::describe_gauge!(PROCESS_VIRTUAL_MEMORY_BYTES, Unit::Bytes, "Virtual memory size");
        metrics::describe_gauge!(SYSTEM_MEMORY_USED_BYTES, Unit::Bytes, "Used system memory");
        metrics::describe_gauge!(SYSTEM_MEMORY_TOTAL_BYTES, Unit::Bytes, "Total system memory");
    });
}
