//! Error types for the simulation engine.

use crate::types::{KernelId, KernelState};
use brainsim_env::ConfigError;
use thiserror::Error;

/// Boxed error used at the model and unit extension points.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure raised by a model's `initialize` or `step`.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("{0}")]
    Message(String),

    #[error("Invalid model parameter: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Other(BoxError),
}

impl ModelError {
    /// Creates a model error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Wraps any other error.
    pub fn other(error: impl Into<BoxError>) -> Self {
        Self::Other(error.into())
    }
}

/// An operation was invoked in the wrong kernel state.
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    #[error("Kernel {kernel}: step/run requires initialize() first")]
    NotInitialized { kernel: KernelId },

    #[error("Kernel {kernel}: initialize() called in state {state}")]
    AlreadyInitialized { kernel: KernelId, state: KernelState },

    #[error("Kernel {kernel}: no transition out of terminal state {state}")]
    Terminal { kernel: KernelId, state: KernelState },
}

/// Top-level engine error.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// A model failed while initializing (`step` is `None`) or stepping
    #[error("Kernel {kernel} model failed {}: {source}", describe_step(.step))]
    ModelExecution {
        kernel: KernelId,
        step: Option<u64>,
        source: ModelError,
    },

    #[error(transparent)]
    Batch(#[from] BatchError),
}

fn describe_step(step: &Option<u64>) -> String {
    match step {
        Some(step) => format!("at step {}", step),
        None => "during initialize".to_string(),
    }
}

/// Why a single unit of an execution batch failed.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("{0}")]
    Failed(BoxError),

    #[error("panicked: {0}")]
    Panicked(String),

    #[error("failed to spawn: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("process exited with {status}: {stderr}")]
    ProcessExit { status: String, stderr: String },

    #[error("could not decode unit output: {0}")]
    Decode(String),
}

impl UnitError {
    pub fn failed(error: impl Into<BoxError>) -> Self {
        Self::Failed(error.into())
    }
}

/// One failed unit, identified by its index in the batch.
#[derive(Debug)]
pub struct UnitFailure {
    pub index: usize,
    pub error: UnitError,
}

impl std::fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unit {}: {}", self.index, self.error)
    }
}

/// Failure of a coordinator call.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Invalid coordinator configuration: {0}")]
    InvalidConfig(String),

    #[error("Strategy {strategy} runs {expected} units but the target runs as {actual}")]
    IsolationMismatch {
        strategy: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    /// One or more units failed after every unit had finished
    #[error("{} of {} units failed; first: {}", .failures.len(), .total, first_failure(.failures))]
    UnitsFailed {
        total: usize,
        /// Indices of the units that finished successfully
        completed: Vec<usize>,
        failures: Vec<UnitFailure>,
    },
}

impl BatchError {
    /// Failures carried by this error, empty for configuration errors.
    pub fn failures(&self) -> &[UnitFailure] {
        match self {
            BatchError::UnitsFailed { failures, .. } => failures,
            _ => &[],
        }
    }
}

fn first_failure(failures: &[UnitFailure]) -> String {
    failures
        .first()
        .map(|f| f.to_string())
        .unwrap_or_else(|| "none".to_string())
}
