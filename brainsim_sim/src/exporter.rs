//! JSON run report.

use crate::runner::RunRecord;
use brainsim_core::RunMetrics;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Everything one `brainsim run` produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Label the batch was measured under
    pub label: String,

    /// Strategy name (`threads`, `thread-pool`, ...)
    pub strategy: String,

    pub total: usize,
    pub passed: usize,
    pub failed: usize,

    /// Wall-clock time for the whole batch
    pub elapsed_ms: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_memory_bytes: Option<u64>,

    /// One record per run, ordered by index
    pub runs: Vec<RunRecord>,
}

impl RunReport {
    /// Builds a report from run records and the batch measurement.
    pub fn new(strategy: &str, mut runs: Vec<RunRecord>, metrics: &RunMetrics) -> Self {
        runs.sort_by_key(|r| r.index);
        let passed = runs.iter().filter(|r| r.passed()).count();
        Self {
            label: metrics.label.clone(),
            strategy: strategy.to_string(),
            total: runs.len(),
            passed,
            failed: runs.len() - passed,
            elapsed_ms: metrics.elapsed.as_secs_f64() * 1000.0,
            peak_memory_bytes: metrics.peak_memory_bytes,
            runs,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Runs that did not complete.
    pub fn failures(&self) -> impl Iterator<Item = &RunRecord> {
        self.runs.iter().filter(|r| !r.passed())
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
