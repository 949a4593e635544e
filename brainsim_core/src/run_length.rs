//! Resolves how many steps a run takes from its parameters.

use brainsim_env::{ConfigError, ParameterSet};
use tracing::warn;

/// Number of discrete steps a kernel runs for.
///
/// The loop bound is always a step count. Parameters may state it directly
/// (`duration`, in steps) or as simulated milliseconds (`duration_ms`)
/// divided by the step size (`time_step_ms`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLength {
    steps: u64,
}

impl RunLength {
    /// Step size used when `duration_ms` is given without `time_step_ms`.
    pub const DEFAULT_TIME_STEP_MS: f64 = 0.1;

    pub fn steps(steps: u64) -> Self {
        Self { steps }
    }

    /// Reads the run length from `params`, using `default_steps` when
    /// neither `duration` nor `duration_ms` is present.
    pub fn from_parameters(params: &ParameterSet, default_steps: u64) -> Result<Self, ConfigError> {
        let has_steps = params.contains_key("duration");
        let has_ms = params.contains_key("duration_ms");

        if has_steps {
            if has_ms {
                warn!(
                    "Both 'duration' and 'duration_ms' set; using 'duration' ({} steps)",
                    params.get("duration", 0u64)
                );
            }
            return params.require::<u64>("duration").map(Self::steps);
        }

        if !has_ms {
            return Ok(Self::steps(default_steps));
        }

        let duration_ms: f64 = params.require("duration_ms")?;
        let time_step_ms: f64 = params.get("time_step_ms", Self::DEFAULT_TIME_STEP_MS);

        if !time_step_ms.is_finite() || time_step_ms <= 0.0 {
            return Err(ConfigError::invalid("time_step_ms", format!("must be positive, got {}", time_step_ms)));
        }
        if !duration_ms.is_finite() || duration_ms < 0.0 {
            return Err(ConfigError::invalid("duration_ms", format!("must be non-negative, got {}", duration_ms)));
        }

        Ok(Self::steps(steps_for(duration_ms, time_step_ms)))
    }

    /// Step count for the kernel loop.
    pub fn get(&self) -> u64 {
        self.steps
    }
}

/// `ceil(duration / step)`, tolerant of float noise such as `1.0 / 0.1`.
fn steps_for(duration_ms: f64, time_step_ms: f64) -> u64 {
    let raw = duration_ms / time_step_ms;
    let nearest = raw.round();
    if (raw - nearest).abs() <= 1e-9 * nearest.max(1.0) {
        nearest as u64
    } else {
        raw.ceil() as u64
    }
}
