//! Production implementation of EngineContext using the system clock.

use crate::EngineContext;
use std::time::{Duration, Instant};

/// Context backed by the real monotonic clock.
pub struct SystemContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl SystemContext {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for SystemContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineContext for SystemContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}
