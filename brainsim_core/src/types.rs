//! Identifiers and lifecycle states shared across the engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one kernel instance.
///
/// Uses UUID v4 for runs that need no reproducibility, and a seed-derived
/// UUID when the same batch must produce the same ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KernelId(pub Uuid);

impl KernelId {
    /// Creates a new random KernelId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic KernelId from a seed.
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for KernelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for KernelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Lifecycle state of a [`SimulationKernel`](crate::SimulationKernel).
///
/// ```text
/// Uninitialized → Initialized → Running → { Stopped, Completed, Failed }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelState {
    Uninitialized,
    Initialized,
    Running,
    /// `stop()` took effect before the duration was reached
    Stopped,
    /// `current_time` reached the requested duration
    Completed,
    /// A model step returned an error
    Failed,
}

impl KernelState {
    /// Returns true for states no transition leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, KernelState::Stopped | KernelState::Completed | KernelState::Failed)
    }

    pub fn name(&self) -> &'static str {
        match self {
            KernelState::Uninitialized => "uninitialized",
            KernelState::Initialized => "initialized",
            KernelState::Running => "running",
            KernelState::Stopped => "stopped",
            KernelState::Completed => "completed",
            KernelState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for KernelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
