//! The simulation kernel: one model driven through its lifecycle.
//!
//! ```text
//!  new() ──► Uninitialized ──initialize()──► Initialized ──run(d)──► Running
//!                                               │  ▲                   │
//!                                          step()  │      ┌────────────┼────────────┐
//!                                               └──┘      ▼            ▼            ▼
//!                                                     Completed     Stopped      Failed
//!                                                   (time == d)  (stop() seen) (step error)
//! ```
//!
//! A model error inside `initialize()` moves the kernel straight from
//! `Uninitialized` to `Failed`.
//!
//! Cancellation is cooperative. `stop()` (or a [`StopHandle`] held by another
//! thread) raises a flag that the run loop checks once per step boundary, so
//! a step in progress always finishes and no further step begins.

use crate::error::{LifecycleError, SimulationError};
use crate::model::Model;
use crate::run_length::RunLength;
use crate::types::{KernelId, KernelState};

use brainsim_env::{EngineContext, ParameterSet, SystemContext};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, Span};

/// Flags shared between a kernel and its stop handles.
#[derive(Debug, Default)]
struct KernelControl {
    running: AtomicBool,
    stop_requested: AtomicBool,
}

impl KernelControl {
    fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.running.store(false, Ordering::Release);
    }
}

/// Cloneable handle that stops a kernel from another thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    kernel: KernelId,
    control: Arc<KernelControl>,
}

impl StopHandle {
    /// Requests a stop. Takes effect at the next step boundary; a no-op on a
    /// kernel that already finished.
    pub fn stop(&self) {
        debug!(kernel = %self.kernel, "Stop requested via handle");
        self.control.request_stop();
    }

    pub fn is_running(&self) -> bool {
        self.control.running.load(Ordering::Acquire)
    }

    pub fn kernel_id(&self) -> KernelId {
        self.kernel
    }
}

/// Outcome of one `run` call.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub kernel: KernelId,
    pub model: String,
    pub state: KernelState,
    /// Steps performed by this call
    pub steps: u64,
    /// `current_time` when the call returned
    pub current_time: u64,
    /// Elapsed time as seen by the kernel's context
    pub elapsed: Duration,
}

/// One simulation instance: a model, its parameters and its time bookkeeping.
///
/// A kernel is exclusively owned by whoever drives it and is never reused
/// once terminal; build a new one for a fresh run.
pub struct SimulationKernel<M: Model> {
    id: KernelId,
    parameters: ParameterSet,
    model: M,
    current_time: u64,
    state: KernelState,
    control: Arc<KernelControl>,
    context: Arc<dyn EngineContext>,
    span: Span,
}

impl<M: Model> SimulationKernel<M> {
    /// Creates a kernel with a random id on the system clock.
    pub fn new(model: M, parameters: ParameterSet) -> Self {
        let id = KernelId::new();
        let span = kernel_span(id, model.name());
        Self {
            id,
            parameters,
            model,
            current_time: 0,
            state: KernelState::Uninitialized,
            control: Arc::new(KernelControl::default()),
            context: Arc::new(SystemContext::new()),
            span,
        }
    }

    /// Sets the kernel id (e.g. a seed-derived one for reproducible logs).
    pub fn with_id(mut self, id: KernelId) -> Self {
        self.id = id;
        self.span = kernel_span(id, self.model.name());
        self
    }

    /// Sets the context used for elapsed-time measurement.
    pub fn with_context(mut self, context: Arc<dyn EngineContext>) -> Self {
        self.context = context;
        self
    }

    pub fn id(&self) -> KernelId {
        self.id
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn current_time(&self) -> u64 {
        self.current_time
    }

    pub fn is_running(&self) -> bool {
        self.control.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> KernelState {
        self.state
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Consumes the kernel and returns its model.
    pub fn into_model(self) -> M {
        self.model
    }

    /// Returns a handle that can stop this kernel from any thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            kernel: self.id,
            control: Arc::clone(&self.control),
        }
    }

    /// Hands the parameter set to the model. Allowed once, before any step.
    ///
    /// A model error leaves the kernel `Failed`, so it is never initialized twice.
    pub fn initialize(&mut self) -> Result<(), SimulationError> {
        let _enter = self.span.clone().entered();

        if self.state != KernelState::Uninitialized {
            return Err(LifecycleError::AlreadyInitialized {
                kernel: self.id,
                state: self.state,
            }
            .into());
        }

        if let Err(source) = self.model.initialize(&self.parameters) {
            self.state = KernelState::Failed;
            error!("Model initialize failed: {}", source);
            return Err(SimulationError::ModelExecution {
                kernel: self.id,
                step: None,
                source,
            });
        }

        self.state = KernelState::Initialized;
        debug!(params = self.parameters.len(), "Kernel initialized");
        Ok(())
    }

    /// Performs one step outside the run loop.
    pub fn step(&mut self) -> Result<(), SimulationError> {
        let _enter = self.span.clone().entered();
        self.check_can_step()?;
        self.advance()
    }

    /// Runs until `current_time` reaches `duration` or a stop is observed.
    ///
    /// A stop requested before the call makes it perform zero steps. A model
    /// error returns immediately, leaving `is_running` true and
    /// `current_time` at the last completed step.
    pub fn run(&mut self, duration: u64) -> Result<RunSummary, SimulationError> {
        let _enter = self.span.clone().entered();
        self.check_can_step()?;

        let started_at = self.current_time;
        let started = self.context.now();

        if self.control.stop_requested.load(Ordering::Acquire) {
            self.state = KernelState::Stopped;
            info!("Stop requested before run; performed 0 steps");
            return Ok(self.summary(started_at, started));
        }

        self.state = KernelState::Running;
        self.control.running.store(true, Ordering::Release);
        info!(duration, from = self.current_time, "Run started");

        while !self.control.stop_requested.load(Ordering::Acquire) && self.current_time < duration {
            self.advance()?;
        }

        self.control.running.store(false, Ordering::Release);
        self.state = if self.current_time >= duration {
            KernelState::Completed
        } else {
            KernelState::Stopped
        };

        let summary = self.summary(started_at, started);
        info!(
            state = %summary.state,
            steps = summary.steps,
            "Run finished in {:.4}s",
            summary.elapsed.as_secs_f64()
        );
        Ok(summary)
    }

    /// Runs for a length resolved from parameters.
    pub fn run_for(&mut self, length: RunLength) -> Result<RunSummary, SimulationError> {
        self.run(length.get())
    }

    /// Requests a stop; see [`StopHandle::stop`].
    pub fn stop(&self) {
        debug!(kernel = %self.id, "Stop requested");
        self.control.request_stop();
    }

    fn check_can_step(&self) -> Result<(), LifecycleError> {
        match self.state {
            KernelState::Uninitialized => Err(LifecycleError::NotInitialized { kernel: self.id }),
            state if state.is_terminal() => Err(LifecycleError::Terminal { kernel: self.id, state }),
            _ => Ok(()),
        }
    }

    fn advance(&mut self) -> Result<(), SimulationError> {
        let step = self.current_time;
        if let Err(source) = self.model.step(step) {
            self.state = KernelState::Failed;
            error!(step, "Model step failed: {}", source);
            return Err(SimulationError::ModelExecution {
                kernel: self.id,
                step: Some(step),
                source,
            });
        }
        self.current_time += 1;
        Ok(())
    }

    fn summary(&self, started_at: u64, started: Duration) -> RunSummary {
        RunSummary {
            kernel: self.id,
            model: self.model.name().to_string(),
            state: self.state,
            steps: self.current_time - started_at,
            current_time: self.current_time,
            elapsed: self.context.now().saturating_sub(started),
        }
    }
}

fn kernel_span(id: KernelId, model: &str) -> Span {
    tracing::info_span!("kernel", id = %id, model = %model)
}
