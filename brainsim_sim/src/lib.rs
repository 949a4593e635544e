//! brainsim Batch Harness
//!
//! Runs many independent simulation kernels, parameterized by a persisted
//! configuration store, across threads or child processes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        BatchRunner                           │
//! │   ParameterSet ──► RunPlan (seed + i) ──► ExecutionCoordinator│
//! │                                              │               │
//! │              ┌───────────────────────────────┼────────┐      │
//! │              ▼                               ▼        ▼      │
//! │   ThreadTarget: kernel in-process   ProcessTarget: `brainsim worker`
//! │              │                               │               │
//! │              └──────────► RunRecord ◄────────┘               │
//! │                              │                               │
//! │                         RunReport (JSON)                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use brainsim_sim::{BatchRunner, ModelKind};
//! use brainsim_core::Strategy;
//! use brainsim_env::ParameterSet;
//!
//! let params = ParameterSet::new().with("duration", 100).with("runs", 8);
//! let report = BatchRunner::new(ModelKind::RandomWalk, params)
//!     .with_strategy(Strategy::PooledThread { max_workers: Some(4) })
//!     .run()?;
//! assert!(report.is_success());
//! # Ok::<(), brainsim_core::SimulationError>(())
//! ```

mod context;
mod exporter;
pub mod models;
mod runner;

pub use context::VirtualContext;
pub use exporter::RunReport;
pub use models::{ModelKind, NeuronModel, RandomWalkModel};
pub use runner::{run_model, run_single, run_worker, BatchRunner, RunPlan, RunRecord, DEFAULT_SEED, DEFAULT_STEPS};
