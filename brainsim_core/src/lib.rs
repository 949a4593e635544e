//! brainsim Core - discrete-time simulation kernel and batch execution
//!
//! This library provides the engine half of the harness:
//! 1. **Kernel**: drives any [`Model`] through initialize → run → terminal
//!    state, with cooperative stop at step boundaries
//! 2. **Coordinator**: runs a batch of independent units on unpooled or
//!    pooled threads or child processes, collecting every failure
//! 3. **Metrics**: times and memory-profiles a callable
//!
//! ```text
//!   ParameterStore ──► ParameterSet ──► SimulationKernel<M: Model>
//!                                               │ moved into a unit
//!                                               ▼
//!   batch args ──► ExecutionCoordinator ──► WorkUnit (thread | process)
//!                        │
//!                        └──► BatchReport ──► Vec<R> | BatchError::UnitsFailed
//! ```

pub mod coordinator;
pub mod error;
pub mod kernel;
pub mod metrics;
pub mod model;
pub mod run_length;
pub mod types;
pub mod unit;

// Re-export key types for convenience
pub use coordinator::{
    run_process_pool, run_processes, run_thread_pool, run_threads, BatchReport, ExecutionCoordinator, Strategy,
    UnitOutcome,
};
pub use error::{BatchError, BoxError, LifecycleError, ModelError, SimulationError, UnitError, UnitFailure};
pub use kernel::{RunSummary, SimulationKernel, StopHandle};
pub use metrics::{MetricsCollector, RunMetrics};
pub use model::Model;
pub use run_length::RunLength;
pub use types::{KernelId, KernelState};
pub use unit::{Isolation, ProcessOutput, ProcessTarget, ThreadTarget, WorkUnit};

pub use brainsim_env::{ConfigError, ParameterSet};
