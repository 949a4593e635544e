//! Wall-clock and memory measurement around arbitrary work.

use brainsim_env::{EngineContext, SystemContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Measurements for one `measure` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetrics {
    pub label: String,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    /// Process peak resident set size, if the platform reports it
    pub peak_memory_bytes: Option<u64>,
    /// Resident set size right after the measured work
    pub current_memory_bytes: Option<u64>,
}

/// Times callables against an [`EngineContext`] clock.
///
/// The collector holds no reference to anything it measures.
#[derive(Clone)]
pub struct MetricsCollector {
    context: Arc<dyn EngineContext>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_context(Arc::new(SystemContext::new()))
    }

    pub fn with_context(context: Arc<dyn EngineContext>) -> Self {
        Self { context }
    }

    /// Runs `f` and returns its result with elapsed time and memory usage.
    pub fn measure<R>(&self, label: &str, f: impl FnOnce() -> R) -> (R, RunMetrics) {
        let started = self.context.now();
        let result = f();
        let elapsed = self.context.now().saturating_sub(started);

        let memory = memory_snapshot();
        let metrics = RunMetrics {
            label: label.to_string(),
            elapsed,
            peak_memory_bytes: memory.peak,
            current_memory_bytes: memory.current,
        };

        info!("{} executed in {:.4} seconds", label, elapsed.as_secs_f64());
        if let Some(peak) = memory.peak {
            info!("{} peak memory usage: {:.2} MB", label, peak as f64 / (1024.0 * 1024.0));
        }

        (result, metrics)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct MemorySnapshot {
    current: Option<u64>,
    peak: Option<u64>,
}

#[cfg(target_os = "linux")]
fn memory_snapshot() -> MemorySnapshot {
    std::fs::read_to_string("/proc/self/status")
        .map(|status| parse_status(&status))
        .unwrap_or_default()
}

#[cfg(not(target_os = "linux"))]
fn memory_snapshot() -> MemorySnapshot {
    MemorySnapshot::default()
}

/// Reads `VmRSS` and `VmHWM` (reported in kB) from a `/proc/<pid>/status` body.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_status(status: &str) -> MemorySnapshot {
    let mut snapshot = MemorySnapshot::default();
    for line in status.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let kb = value
            .trim()
            .trim_end_matches("kB")
            .trim()
            .parse::<u64>()
            .ok();
        match key {
            "VmRSS" => snapshot.current = kb.map(|v| v * 1024),
            "VmHWM" => snapshot.peak = kb.map(|v| v * 1024),
            _ => {}
        }
    }
    snapshot
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(ms.max(0.0) / 1000.0))
    }
}
