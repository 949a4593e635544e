//! Engine context trait: the clock a run observes.

use std::time::Duration;

/// Explicit replacement for process-wide clock state.
///
/// Kernels and the metrics collector read time through this trait so that
/// the same engine code runs against the real clock or a virtual one.
///
/// # Implementations
///
/// - **Production**: `SystemContext` - wraps `std::time::Instant`
/// - **Simulation**: `VirtualContext` (in `brainsim_sim`) - manually advanced clock
pub trait EngineContext: Send + Sync + 'static {
    /// Monotonic time since the context was created.
    fn now(&self) -> Duration;
}
