//! The capability a kernel drives.

use crate::error::ModelError;
use brainsim_env::ParameterSet;

/// Per-step logic of one simulated system.
///
/// Any type with these two capabilities can be driven by a
/// [`SimulationKernel`](crate::SimulationKernel). Neither method has a default
/// body, so a model that forgets one does not compile.
///
/// # Contract
///
/// - `initialize` is called exactly once, before the first `step`.
/// - `step` advances the model by one discrete time unit. Calls are never
///   replayed: every call is real forward progress.
/// - Both should return promptly; the kernel can only observe a stop
///   request between steps.
pub trait Model {
    /// Prepares model state from the kernel's parameter set.
    fn initialize(&mut self, params: &ParameterSet) -> Result<(), ModelError>;

    /// Advances one step. `current_time` is the index of the step being taken.
    fn step(&mut self, current_time: u64) -> Result<(), ModelError>;

    /// Name used in logs and reports.
    fn name(&self) -> &str {
        "model"
    }
}

impl<M: Model + ?Sized> Model for Box<M> {
    fn initialize(&mut self, params: &ParameterSet) -> Result<(), ModelError> {
        (**self).initialize(params)
    }

    fn step(&mut self, current_time: u64) -> Result<(), ModelError> {
        (**self).step(current_time)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
