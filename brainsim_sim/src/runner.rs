//! Batch runner - turns a parameter set into many kernel runs.

use crate::exporter::RunReport;
use crate::models::ModelKind;

use brainsim_core::{
    BatchError, ExecutionCoordinator, Isolation, KernelId, KernelState, MetricsCollector, Model, ProcessTarget,
    RunLength, SimulationError, SimulationKernel, Strategy, ThreadTarget, UnitError,
};
use brainsim_env::{ConfigError, ConfigSource, EngineContext, ParameterSet, ParameterStore, SystemContext};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use tracing::{info, warn};

/// Step count used when the parameters give no run length.
pub const DEFAULT_STEPS: u64 = 100;

/// Seed used when the parameters carry none.
pub const DEFAULT_SEED: u64 = 42;

/// Result of one kernel run, as reported and as printed by `brainsim worker`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Position of the run in its batch
    pub index: usize,

    /// Seed the run's parameters carried
    pub seed: u64,

    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<KernelId>,

    pub state: KernelState,

    /// Steps performed
    pub steps: u64,

    pub current_time: u64,

    /// Elapsed time as seen by the kernel's context
    pub elapsed_ms: f64,

    /// Failure message if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunRecord {
    /// Record for a run that produced no kernel summary.
    pub fn failed(index: usize, seed: u64, model: &str, error: impl ToString) -> Self {
        Self {
            index,
            seed,
            model: model.to_string(),
            kernel: None,
            state: KernelState::Failed,
            steps: 0,
            current_time: 0,
            elapsed_ms: 0.0,
            error: Some(error.to_string()),
        }
    }

    pub fn passed(&self) -> bool {
        self.state == KernelState::Completed && self.error.is_none()
    }
}

/// Parameters for one run of a batch.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub index: usize,
    pub seed: u64,
    /// Full parameter set handed to the kernel, `seed` included
    pub parameters: ParameterSet,
}

impl RunPlan {
    /// Plan whose seed is read from the `seed` parameter (default [`DEFAULT_SEED`]).
    pub fn from_parameters(index: usize, parameters: ParameterSet) -> Self {
        let seed = parameters.get("seed", DEFAULT_SEED);
        Self { index, seed, parameters }
    }
}

/// Builds a kernel around `model`, initializes it and runs it to the length
/// its parameters ask for.
///
/// A model error becomes a `Failed` record that keeps the steps completed
/// before it. Configuration and lifecycle errors are returned as `Err`.
pub fn run_model<M: Model>(
    model: M,
    plan: &RunPlan,
    context: Arc<dyn EngineContext>,
) -> Result<RunRecord, SimulationError> {
    let length = RunLength::from_parameters(&plan.parameters, DEFAULT_STEPS)?;
    let mut kernel = SimulationKernel::new(model, plan.parameters.clone())
        .with_id(KernelId::from_seed(plan.seed))
        .with_context(Arc::clone(&context));

    let started = context.now();
    let outcome = kernel.initialize().and_then(|()| kernel.run_for(length));

    let (steps, error) = match outcome {
        Ok(summary) => (summary.steps, None),
        Err(e @ SimulationError::ModelExecution { .. }) => (kernel.current_time(), Some(e.to_string())),
        Err(e) => return Err(e),
    };

    Ok(RunRecord {
        index: plan.index,
        seed: plan.seed,
        model: kernel.model().name().to_string(),
        kernel: Some(kernel.id()),
        state: kernel.state(),
        steps: steps,
        current_time: kernel.current_time(),
        elapsed_ms: context.now().saturating_sub(started).as_secs_f64() * 1000.0,
        error,
    })
}

/// [`run_model`] with a bundled model.
pub fn run_single(
    model: ModelKind,
    plan: &RunPlan,
    context: Arc<dyn EngineContext>,
) -> Result<RunRecord, SimulationError> {
    run_model(model.build(), plan, context)
}

/// Body of the `brainsim worker` subcommand: runs one kernel from a JSON
/// parameter document and returns its record as one JSON line.
pub fn run_worker(model: ModelKind, index: usize, params_json: &str) -> Result<String, SimulationError> {
    let value: serde_json::Value = serde_json::from_str(params_json)
        .map_err(|e| ConfigError::malformed("--params", e))?;
    let plan = RunPlan::from_parameters(index, ParameterSet::from_value(value, "--params")?);

    let record = run_single(model, &plan, Arc::new(SystemContext::new()))?;
    Ok(serde_json::to_string(&record).map_err(ConfigError::from)?)
}

/// Arguments of one `brainsim worker` child.
#[derive(Debug, Clone)]
struct WorkerJob {
    index: usize,
    params_json: String,
}

/// Runs a batch of kernels of one model through an execution strategy.
///
/// Thread strategies run kernels in this process. Process strategies spawn
/// one `<exe> worker` child per run and read its record from stdout. `<exe>`
/// is [`std::env::current_exe`] unless [`with_worker_exe`](Self::with_worker_exe)
/// names another binary, so library callers that are not the `brainsim`
/// binary must set it; otherwise every run fails to decode.
pub struct BatchRunner {
    model: ModelKind,

    /// Base parameters shared by every run
    parameters: ParameterSet,

    strategy: Strategy,

    /// Pool size override applied to pooled strategies
    workers: Option<usize>,

    runs: usize,

    /// Run `i` is seeded with `seed + i`
    seed: u64,

    /// Step count override for every run
    duration: Option<u64>,

    /// Clock the kernels measure elapsed time with (thread strategies only)
    context: Arc<dyn EngineContext>,

    /// Executable spawned by process strategies
    worker_exe: Option<PathBuf>,
}

impl BatchRunner {
    /// Creates a runner, reading `runs`, `seed` and `workers` from `parameters`.
    pub fn new(model: ModelKind, parameters: ParameterSet) -> Self {
        let runs = parameters.get("runs", 1usize);
        let seed = parameters.get("seed", DEFAULT_SEED);
        let workers = parameters.get::<Option<usize>>("workers", None);
        Self {
            model,
            parameters,
            strategy: Strategy::PooledThread { max_workers: None },
            workers,
            runs,
            seed,
            duration: None,
            context: Arc::new(SystemContext::new()),
            worker_exe: None,
        }
    }

    /// Creates a runner from the current contents of a store.
    pub fn from_store<S: ConfigSource>(store: &ParameterStore<S>, model: ModelKind) -> Self {
        Self::new(model, store.snapshot())
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_runs(mut self, runs: usize) -> Self {
        self.runs = runs;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the step count of every run, overriding stored durations.
    pub fn with_duration(mut self, steps: u64) -> Self {
        self.duration = Some(steps);
        self
    }

    pub fn with_context(mut self, context: Arc<dyn EngineContext>) -> Self {
        self.context = context;
        self
    }

    /// Sets the binary process strategies spawn. It must accept the
    /// `worker --model <name> --index <i> --params <json>` subcommand.
    pub fn with_worker_exe(mut self, exe: impl Into<PathBuf>) -> Self {
        self.worker_exe = Some(exe.into());
        self
    }

    pub fn model(&self) -> ModelKind {
        self.model
    }

    /// Strategy with the pool size override applied.
    pub fn strategy(&self) -> Strategy {
        match self.workers {
            Some(n) => self.strategy.with_max_workers(Some(n)),
            None => self.strategy,
        }
    }

    /// One plan per run, each with its own `seed` (and `duration` when overridden).
    pub fn plans(&self) -> Vec<RunPlan> {
        (0..self.runs)
            .map(|index| {
                let seed = self.seed.wrapping_add(index as u64);
                let mut parameters = self.parameters.clone();
                parameters.insert("seed", seed);
                if let Some(steps) = self.duration {
                    parameters.insert("duration", steps);
                }
                RunPlan { index, seed, parameters }
            })
            .collect()
    }

    /// Runs every plan and blocks until all of them finished.
    ///
    /// Failed runs appear in the report as `failed` records; `Err` is only
    /// returned when the batch could not be launched at all.
    pub fn run(&self) -> Result<RunReport, SimulationError> {
        let strategy = self.strategy();
        let plans = self.plans();
        let seeds: Vec<u64> = plans.iter().map(|p| p.seed).collect();

        info!(
            "Starting {} run(s) of {} with {} (seed={})",
            plans.len(),
            self.model,
            strategy,
            self.seed
        );

        let coordinator = ExecutionCoordinator::new(strategy);
        let label = format!("{} x{} ({})", self.model, plans.len(), strategy);

        let (records, metrics) = MetricsCollector::new().measure(&label, || match strategy.isolation() {
            Isolation::Thread => self.run_in_threads(&coordinator, plans),
            Isolation::Process => self.run_in_processes(&coordinator, plans),
        });

        let records = records?
            .into_iter()
            .map(|(index, result)| match result {
                Ok(record) => record,
                Err(e) => {
                    warn!(index, "Run failed: {}", e);
                    let seed = seeds.get(index).copied().unwrap_or(self.seed);
                    RunRecord::failed(index, seed, self.model.name(), e)
                }
            })
            .collect();

        Ok(RunReport::new(strategy.name(), records, &metrics))
    }

    fn run_in_threads(
        &self,
        coordinator: &ExecutionCoordinator,
        plans: Vec<RunPlan>,
    ) -> Result<Vec<(usize, Result<RunRecord, UnitError>)>, SimulationError> {
        let model = self.model;
        let context = &self.context;
        let target = ThreadTarget::new(|plan: RunPlan| run_single(model, &plan, Arc::clone(context)));

        let report = coordinator.execute(&target, plans)?;
        Ok(report.outcomes.into_iter().map(|o| (o.index, o.result)).collect())
    }

    fn run_in_processes(
        &self,
        coordinator: &ExecutionCoordinator,
        plans: Vec<RunPlan>,
    ) -> Result<Vec<(usize, Result<RunRecord, UnitError>)>, SimulationError> {
        let exe = match &self.worker_exe {
            Some(exe) => exe.clone(),
            None => std::env::current_exe()
                .map_err(|e| BatchError::InvalidConfig(format!("cannot locate worker executable: {}", e)))?,
        };

        let jobs = plans
            .into_iter()
            .map(|plan| -> Result<WorkerJob, SimulationError> {
                Ok(WorkerJob {
                    index: plan.index,
                    params_json: serde_json::to_string(&plan.parameters).map_err(ConfigError::from)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let model = self.model.name();
        let target = ProcessTarget::new(|job: &WorkerJob| {
            let mut cmd = Command::new(&exe);
            cmd.arg("worker")
                .arg("--model")
                .arg(model)
                .arg("--index")
                .arg(job.index.to_string())
                .arg("--params")
                .arg(&job.params_json);
            cmd
        });

        let report = coordinator.execute(&target, jobs)?;
        Ok(report
            .outcomes
            .into_iter()
            .map(|o| (o.index, o.result.and_then(|out| out.parse_json::<RunRecord>())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::VirtualContext;
    use brainsim_core::ModelError;
    use std::time::Duration;

    /// Advances a shared virtual clock by 1ms per step.
    struct TimedModel {
        clock: VirtualContext,
    }

    impl Model for TimedModel {
        fn initialize(&mut self, _params: &ParameterSet) -> Result<(), ModelError> {
            Ok(())
        }

        fn step(&mut self, _current_time: u64) -> Result<(), ModelError> {
            self.clock.advance_time(Duration::from_millis(1));
            Ok(())
        }
    }

    #[test]
    fn test_run_model_uses_context_clock() {
        let clock = VirtualContext::new();
        let plan = RunPlan::from_parameters(0, ParameterSet::new().with("duration", 25));

        let record = run_model(TimedModel { clock: clock.clone() }, &plan, Arc::new(clock)).unwrap();

        assert_eq!(record.state, KernelState::Completed);
        assert_eq!(record.current_time, 25);
        assert_eq!(record.elapsed_ms, 25.0);
        assert_eq!(record.model, "model");
    }

    /// Fails at a chosen step.
    struct FailsAt {
        step: u64,
    }

    impl Model for FailsAt {
        fn initialize(&mut self, _params: &ParameterSet) -> Result<(), ModelError> {
            Ok(())
        }

        fn step(&mut self, current_time: u64) -> Result<(), ModelError> {
            if current_time == self.step {
                return Err(ModelError::msg("state diverged"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_failed_run_keeps_completed_steps() {
        let plan = RunPlan::from_parameters(1, ParameterSet::new().with("duration", 10).with("seed", 3));

        let record = run_model(FailsAt { step: 3 }, &plan, Arc::new(SystemContext::new())).unwrap();

        assert_eq!(record.state, KernelState::Failed);
        assert_eq!(record.current_time, 3);
        assert_eq!(record.steps, 3);
        assert_eq!(record.kernel, Some(KernelId::from_seed(3)));
        assert!(!record.passed());
        let error = record.error.unwrap_or_default();
        assert!(error.contains("at step 3"), "{}", error);
    }

    #[test]
    fn test_failed_runs_keep_progress_through_the_coordinator() {
        let target = ThreadTarget::new(|plan: RunPlan| {
            let step = plan.parameters.get("fail_at", 0u64);
            run_model(FailsAt { step }, &plan, Arc::new(SystemContext::new()))
        });
        let plans: Vec<RunPlan> = [2u64, 5]
            .into_iter()
            .enumerate()
            .map(|(i, fail_at)| {
                RunPlan::from_parameters(i, ParameterSet::new().with("duration", 8).with("fail_at", fail_at))
            })
            .collect();

        let records = ExecutionCoordinator::new(Strategy::PooledThread { max_workers: Some(2) })
            .execute_all(&target, plans)
            .unwrap();

        assert_eq!(records.iter().map(|r| r.current_time).collect::<Vec<_>>(), vec![2, 5]);
        assert!(records.iter().all(|r| r.state == KernelState::Failed));
    }

    #[test]
    fn test_model_config_error_is_a_failed_record() {
        let plan = RunPlan::from_parameters(0, ParameterSet::new().with("step_sigma", -1.0));
        let record = run_single(ModelKind::RandomWalk, &plan, Arc::new(SystemContext::new())).unwrap();
        assert_eq!(record.state, KernelState::Failed);
        assert_eq!(record.current_time, 0);
        assert!(record.error.unwrap_or_default().contains("during initialize"));
    }

    #[test]
    fn test_bad_run_length_is_an_error() {
        let plan = RunPlan::from_parameters(0, ParameterSet::new().with("time_step_ms", 0.0).with("duration_ms", 5.0));
        assert!(matches!(
            run_single(ModelKind::Neuron, &plan, Arc::new(SystemContext::new())),
            Err(SimulationError::Config(_))
        ));
    }

    #[test]
    fn test_plan_and_runner_share_the_default_seed() {
        let plan = RunPlan::from_parameters(0, ParameterSet::new());
        let runner_plans = BatchRunner::new(ModelKind::Neuron, ParameterSet::new()).plans();

        assert_eq!(plan.seed, DEFAULT_SEED);
        assert_eq!(runner_plans[0].seed, plan.seed);
    }

    #[test]
    fn test_run_single_defaults_to_default_steps() {
        let plan = RunPlan::from_parameters(3, ParameterSet::new());
        let record = run_single(ModelKind::Neuron, &plan, Arc::new(SystemContext::new())).unwrap();
        assert_eq!(record.index, 3);
        assert_eq!(record.steps, DEFAULT_STEPS);
        assert!(record.passed());
    }

    #[test]
    fn test_kernel_ids_follow_seeds() {
        let plan = RunPlan::from_parameters(0, ParameterSet::new().with("seed", 5).with("duration", 1));
        let a = run_single(ModelKind::Neuron, &plan, Arc::new(SystemContext::new())).unwrap();
        let b = run_single(ModelKind::Neuron, &plan, Arc::new(SystemContext::new())).unwrap();
        assert_eq!(a.kernel, b.kernel);
        assert_eq!(a.kernel, Some(KernelId::from_seed(5)));
    }

    #[test]
    fn test_plans_assign_consecutive_seeds() {
        let runner = BatchRunner::new(ModelKind::Neuron, ParameterSet::new().with("runs", 3).with("seed", 10))
            .with_duration(7);

        let plans = runner.plans();

        assert_eq!(plans.iter().map(|p| p.seed).collect::<Vec<_>>(), vec![10, 11, 12]);
        assert!(plans.iter().all(|p| p.parameters.get("duration", 0u64) == 7));
        assert_eq!(plans[2].parameters.get("seed", 0u64), 12);
    }

    #[test]
    fn test_workers_override_applies_to_pooled_strategies() {
        let runner = BatchRunner::new(ModelKind::Neuron, ParameterSet::new().with("workers", 3));
        assert_eq!(runner.strategy(), Strategy::PooledThread { max_workers: Some(3) });

        let runner = runner.with_strategy(Strategy::UnpooledThread).with_workers(2);
        assert_eq!(runner.strategy(), Strategy::UnpooledThread);
    }

    #[test]
    fn test_batch_reports_every_run() {
        let params = ParameterSet::new().with("duration", 20).with("runs", 4);
        let report = BatchRunner::new(ModelKind::RandomWalk, params)
            .with_strategy(Strategy::UnpooledThread)
            .run()
            .unwrap();

        assert_eq!(report.total, 4);
        assert!(report.is_success());
        assert!(report.runs.iter().all(|r| r.current_time == 20));
    }

    #[test]
    fn test_failed_runs_are_recorded_not_raised() {
        let params = ParameterSet::new().with("runs", 2).with("step_sigma", -1.0);
        let report = BatchRunner::new(ModelKind::RandomWalk, params).with_workers(1).run().unwrap();

        assert_eq!(report.failed, 2);
        for run in &report.runs {
            assert_eq!(run.state, KernelState::Failed);
            assert!(run.error.as_deref().unwrap_or("").contains("step_sigma"));
        }
    }

    #[test]
    fn test_zero_workers_fails_the_batch() {
        let err = BatchRunner::new(ModelKind::Neuron, ParameterSet::new())
            .with_workers(0)
            .run()
            .unwrap_err();
        assert!(matches!(err, SimulationError::Batch(BatchError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_worker_exe_fails_every_run() {
        let report = BatchRunner::new(ModelKind::Neuron, ParameterSet::new().with("runs", 2))
            .with_strategy(Strategy::UnpooledProcess)
            .with_worker_exe("/nonexistent/brainsim-worker")
            .run()
            .unwrap();

        assert_eq!(report.failed, 2);
        for run in &report.runs {
            assert_eq!(run.state, KernelState::Failed);
            assert!(run.error.as_deref().unwrap_or("").contains("failed to spawn"));
        }
    }

    #[test]
    fn test_run_worker_prints_record() {
        let line = run_worker(ModelKind::Neuron, 4, r#"{"duration": 3, "seed": 9}"#).unwrap();
        let record: RunRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(record.index, 4);
        assert_eq!(record.seed, 9);
        assert_eq!(record.current_time, 3);
    }

    #[test]
    fn test_run_worker_rejects_bad_params() {
        assert!(run_worker(ModelKind::Neuron, 0, "not json").is_err());
        assert!(run_worker(ModelKind::Neuron, 0, "[1, 2]").is_err());
    }
}
