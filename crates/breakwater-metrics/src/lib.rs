//! Metrics sink for breakers, retries and HTTP traffic.
//!
//! [`MetricsSink`] records into its own Prometheus recorder and renders a
//! text snapshot on demand with [`MetricsSink::get_metrics`]. Construct one
//! at startup and pass it (behind an `Arc`) to everything that records.
//!
//! ```rust
//! use breakwater_metrics::MetricsSink;
//! use std::time::Duration;
//!
//! let sink = MetricsSink::new();
//! sink.record_success("inventory-db", Duration::from_millis(4));
//! sink.record_rejection("inventory-db");
//!
//! let text = sink.get_metrics();
//! assert!(text.contains("circuit_breaker_requests_total"));
//! ```
//!
//! [`spawn_process_sampler`] publishes process and system memory gauges on a
//! fixed interval (30s by default).

pub use process::{spawn_process_sampler, MemoryProbe, MemorySample, DEFAULT_SAMPLE_INTERVAL};
pub use sink::{MetricsSink, RetryOutcome};

/// Metric names as they appear in the exported text.
pub mod names {
    pub use crate::sink::{
        FAILURES_TOTAL, FALLBACKS_TOTAL, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS,
        PROCESS_RESIDENT_MEMORY_BYTES, PROCESS_VIRTUAL_MEMORY_BYTES, REQUESTS_TOTAL,
        REQUEST_DURATION_SECONDS, RETRY_ATTEMPTS_TOTAL, STATE, SYSTEM_MEMORY_TOTAL_BYTES,
        SYSTEM_MEMORY_USED_BYTES, TRANSITIONS_TOTAL,
    };
}

mod process;
mod sink;
