//! Bundled models the harness can run.

use brainsim_core::{Model, ModelError};
use brainsim_env::{ConfigError, ParameterSet};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, info};

/// Model identifiers accepted by the CLI and the worker subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// Logs its parameters and counts steps
    Neuron,

    /// Seeded Gaussian random walk
    RandomWalk,
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Neuron => "neuron",
            ModelKind::RandomWalk => "random_walk",
        }
    }

    /// Builds a fresh, uninitialized model.
    pub fn build(&self) -> Box<dyn Model + Send> {
        match self {
            ModelKind::Neuron => Box::new(NeuronModel::new()),
            ModelKind::RandomWalk => Box::new(RandomWalkModel::new()),
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "neuron" => Ok(ModelKind::Neuron),
            "random_walk" | "walk" => Ok(ModelKind::RandomWalk),
            _ => Err(format!("Unknown model: {}", s)),
        }
    }
}

/// Placeholder neuron simulation. Carries no neural dynamics.
#[derive(Debug, Default)]
pub struct NeuronModel {
    steps_taken: u64,
}

impl NeuronModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }
}

impl Model for NeuronModel {
    fn initialize(&mut self, params: &ParameterSet) -> Result<(), ModelError> {
        info!("Initializing neuron simulation with {} parameters", params.len());
        for (key, value) in params.iter() {
            info!("  {} = {}", key, value);
        }
        Ok(())
    }

    fn step(&mut self, _current_time: u64) -> Result<(), ModelError> {
        self.steps_taken += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        ModelKind::Neuron.name()
    }
}

/// One-dimensional random walk with Gaussian increments.
///
/// Parameters: `seed` (default 0), `step_sigma` (default 1.0, must be
/// finite and non-negative) and `start` (default 0.0). The same seed always
/// produces the same trajectory.
#[derive(Debug, Default)]
pub struct RandomWalkModel {
    walk: Option<(ChaCha8Rng, Normal<f64>)>,
    position: f64,
    max_distance: f64,
    steps_taken: u64,
}

impl RandomWalkModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Largest absolute position seen so far.
    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }
}

impl Model for RandomWalkModel {
    fn initialize(&mut self, params: &ParameterSet) -> Result<(), ModelError> {
        let seed: u64 = params.get("seed", 0);
        let sigma: f64 = params.get("step_sigma", 1.0);
        let normal = Normal::new(0.0, sigma)
            .map_err(|e| ConfigError::invalid("step_sigma", format!("{} ({})", e, sigma)))?;

        self.position = params.get("start", 0.0);
        self.max_distance = self.position.abs();
        self.walk = Some((ChaCha8Rng::seed_from_u64(seed), normal));
        debug!(seed, sigma, "Random walk initialized");
        Ok(())
    }

    fn step(&mut self, current_time: u64) -> Result<(), ModelError> {
        let (rng, normal) = self
            .walk
            .as_mut()
            .ok_or_else(|| ModelError::msg("random walk stepped before initialize"))?;

        self.position += normal.sample(rng);
        self.max_distance = self.max_distance.max(self.position.abs());
        self.steps_taken += 1;

        if !self.position.is_finite() {
            return Err(ModelError::msg(format!("position diverged at step {}", current_time)));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        ModelKind::RandomWalk.name()
    }
}
