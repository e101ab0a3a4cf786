use crate::MetricsSink;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Pid, System};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// How often the background sampler publishes memory gauges by default.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(30);

/// One reading of process and system memory, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemorySample {
    /// `None` when the process could not be inspected.
    pub resident_bytes: Option<u64>,
    pub virtual_bytes: Option<u64>,
    pub system_used_bytes: u64,
    pub system_total_bytes: u64,
}

/// Reads memory figures for the current process.
pub struct MemoryProbe {
    system: System,
    pid: Option<Pid>,
}

impl MemoryProbe {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(error) => {
                tracing::warn!(error, "cannot resolve current pid; process memory gauges disabled");
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }

    pub fn sample(&mut self) -> MemorySample {
        self.system.refresh_memory();

        let (resident_bytes, virtual_bytes) = match self.pid {
            Some(pid) if self.system.refresh_process(pid) => match self.system.process(pid) {
                Some(process) => (Some(process.memory()), Some(process.virtual_memory())),
                None => (None, None),
            },
            _ => (None, None),
        };

        MemorySample {
            resident_bytes,
            virtual_bytes,
            system_used_bytes: self.system.used_memory(),
            system_total_bytes: self.system.total_memory(),
        }
    }
}

impl Default for MemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Samples memory every `interval` and records it into `sink`.
///
/// The first sample is taken immediately. The task runs until the returned
/// handle is aborted or the runtime shuts down; resetting the sink does not
/// stop it.
pub fn spawn_process_sampler(sink: Arc<MetricsSink>, interval: Duration) -> JoinHandle<()> {
    let period = if interval.is_zero() {
        DEFAULT_SAMPLE_INTERVAL
    } else {
        interval
    };

    tokio::spawn(async move {
        let mut probe = MemoryProbe::new();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(interval_ms = period.as_millis() as u64, "process memory sampler started");
        loop {
            ticker.tick().await;
            let sample = probe.sample();
            sink.record_memory(&sample);
            tracing::trace!(
                resident_bytes = sample.resident_bytes,
                system_used_bytes = sample.system_used_bytes,
                "sampled process memory"
            );
        }
    })
}
