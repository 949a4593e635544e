//! Virtual clock implementing EngineContext for reproducible timing.

use brainsim_env::EngineContext;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Context whose clock only moves when told to.
///
/// Clones share the same clock, so a model holding one clone can advance
/// the time a kernel holding another measures.
#[derive(Clone, Default)]
pub struct VirtualContext {
    /// Current virtual time (nanoseconds since context creation)
    virtual_time_ns: Arc<Mutex<u64>>,
}

impl VirtualContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_time(&self, duration: Duration) {
        let mut time = self.clock();
        *time = time.saturating_add(duration.as_nanos() as u64);
    }

    pub fn time_ns(&self) -> u64 {
        *self.clock()
    }

    fn clock(&self) -> MutexGuard<'_, u64> {
        // A u64 cannot be left half-written, so a poisoned lock is still usable
        self.virtual_time_ns.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EngineContext for VirtualContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }
}
