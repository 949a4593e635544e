//! Execution coordinator: runs a batch of independent units concurrently.
//!
//! Four strategies share one contract: run the target against every
//! argument, return only after all units reached a terminal state, and
//! report every failure.
//!
//! | Strategy          | Concurrency unit            | Simultaneity bound |
//! |-------------------|-----------------------------|--------------------|
//! | `UnpooledThread`  | one thread per argument     | none               |
//! | `UnpooledProcess` | one child process per argument | none            |
//! | `PooledThread`    | fixed worker threads        | pool size          |
//! | `PooledProcess`   | fixed workers, one child each | pool size        |
//!
//! Unpooled strategies launch every unit immediately, with no admission
//! control. Pooled strategies queue every unit on a `rayon` pool sized to the
//! worker limit; each worker runs one unit at a time. Failures are collected
//! fail-late: nothing is retried or cancelled, and the batch error is raised
//! only after the last unit finished.

use crate::error::{BatchError, UnitError, UnitFailure};
use crate::unit::{Isolation, WorkUnit};

use crossbeam::channel;
use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How a batch is spread over threads or processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    UnpooledThread,
    UnpooledProcess,
    /// `max_workers: None` uses the host's core count
    PooledThread { max_workers: Option<usize> },
    PooledProcess { max_workers: Option<usize> },
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::UnpooledThread => "threads",
            Strategy::UnpooledProcess => "processes",
            Strategy::PooledThread { .. } => "thread-pool",
            Strategy::PooledProcess { .. } => "process-pool",
        }
    }

    /// Isolation a target must have to run under this strategy.
    pub fn isolation(&self) -> Isolation {
        match self {
            Strategy::UnpooledThread | Strategy::PooledThread { .. } => Isolation::Thread,
            Strategy::UnpooledProcess | Strategy::PooledProcess { .. } => Isolation::Process,
        }
    }

    /// `Some(max_workers)` for pooled strategies, `None` for unpooled ones.
    pub fn pool_limit(&self) -> Option<Option<usize>> {
        match self {
            Strategy::PooledThread { max_workers } | Strategy::PooledProcess { max_workers } => Some(*max_workers),
            _ => None,
        }
    }

    /// Sets the pool size; ignored by unpooled strategies.
    pub fn with_max_workers(self, max: Option<usize>) -> Self {
        match self {
            Strategy::PooledThread { .. } => Strategy::PooledThread { max_workers: max },
            Strategy::PooledProcess { .. } => Strategy::PooledProcess { max_workers: max },
            other => other,
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "threads" | "thread" | "unpooled-thread" => Ok(Strategy::UnpooledThread),
            "processes" | "process" | "unpooled-process" => Ok(Strategy::UnpooledProcess),
            "thread-pool" | "thread_pool" | "pooled-thread" => Ok(Strategy::PooledThread { max_workers: None }),
            "process-pool" | "process_pool" | "pooled-process" => Ok(Strategy::PooledProcess { max_workers: None }),
            _ => Err(format!("Unknown strategy: {}", s)),
        }
    }
}

/// Terminal outcome of one unit.
#[derive(Debug)]
pub struct UnitOutcome<R> {
    /// Position of the unit's argument in the batch
    pub index: usize,
    pub result: Result<R, UnitError>,
    pub elapsed: Duration,
}

/// Every unit's outcome from one coordinator call, ordered by index.
#[derive(Debug)]
pub struct BatchReport<R> {
    pub strategy: Strategy,
    /// Threads used (pool size, or one per unit when unpooled)
    pub workers: usize,
    pub outcomes: Vec<UnitOutcome<R>>,
    pub elapsed: Duration,
}

impl<R> BatchReport<R> {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Returns all outputs in batch order, or every failure with the
    /// indices of the units that did complete.
    pub fn into_outputs(self) -> Result<Vec<R>, BatchError> {
        let total = self.outcomes.len();
        let mut outputs = Vec::with_capacity(total);
        let mut completed = Vec::with_capacity(total);
        let mut failures = Vec::new();

        for outcome in self.outcomes {
            match outcome.result {
                Ok(output) => {
                    completed.push(outcome.index);
                    outputs.push(output);
                }
                Err(error) => failures.push(UnitFailure {
                    index: outcome.index,
                    error,
                }),
            }
        }

        if failures.is_empty() {
            Ok(outputs)
        } else {
            Err(BatchError::UnitsFailed {
                total,
                completed,
                failures,
            })
        }
    }
}

/// Runs batches of units with one [`Strategy`].
#[derive(Debug, Clone)]
pub struct ExecutionCoordinator {
    strategy: Strategy,
}

impl ExecutionCoordinator {
    pub fn new(strategy: Strategy) -> Self {
        Self { strategy }
    }

    /// Sets the pool size of a pooled strategy.
    pub fn with_max_workers(mut self, max: Option<usize>) -> Self {
        self.strategy = self.strategy.with_max_workers(max);
        self
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Runs `target` once per argument and blocks until every unit finished.
    ///
    /// Returns `Err` only for configuration problems (a zero pool size, or a
    /// target whose isolation does not match the strategy); unit failures are
    /// in the report. No completion order is guaranteed across workers.
    pub fn execute<A, T>(&self, target: &T, batch: Vec<A>) -> Result<BatchReport<T::Output>, BatchError>
    where
        A: Send,
        T: WorkUnit<A>,
    {
        if target.isolation() != self.strategy.isolation() {
            return Err(BatchError::IsolationMismatch {
                strategy: self.strategy.name(),
                expected: self.strategy.isolation().name(),
                actual: target.isolation().name(),
            });
        }

        let units = batch.len();
        let started = Instant::now();

        let (workers, mut outcomes) = match self.strategy.pool_limit() {
            None => {
                info!(strategy = %self.strategy, units, "Launching batch");
                (units, run_unpooled(target, batch))
            }
            Some(limit) => {
                let workers = resolve_pool_size(limit)?.min(units.max(1));
                info!(strategy = %self.strategy, units, workers, "Launching batch");
                (workers, run_pooled(target, batch, workers)?)
            }
        };
        outcomes.sort_by_key(|o| o.index);

        let report = BatchReport {
            strategy: self.strategy,
            workers,
            outcomes,
            elapsed: started.elapsed(),
        };

        if report.is_success() {
            info!(
                strategy = %self.strategy,
                "Batch finished: {} units in {:.4}s",
                report.total(),
                report.elapsed.as_secs_f64()
            );
        } else {
            warn!(
                strategy = %self.strategy,
                "Batch finished with {}/{} failed units in {:.4}s",
                report.failed(),
                report.total(),
                report.elapsed.as_secs_f64()
            );
        }
        Ok(report)
    }

    /// [`execute`](Self::execute) followed by [`BatchReport::into_outputs`].
    pub fn execute_all<A, T>(&self, target: &T, batch: Vec<A>) -> Result<Vec<T::Output>, BatchError>
    where
        A: Send,
        T: WorkUnit<A>,
    {
        self.execute(target, batch)?.into_outputs()
    }
}

/// One thread per argument, all launched immediately.
pub fn run_threads<A: Send, T: WorkUnit<A>>(target: &T, batch: Vec<A>) -> Result<Vec<T::Output>, BatchError> {
    ExecutionCoordinator::new(Strategy::UnpooledThread).execute_all(target, batch)
}

/// One child process per argument, all launched immediately.
pub fn run_processes<A: Send, T: WorkUnit<A>>(target: &T, batch: Vec<A>) -> Result<Vec<T::Output>, BatchError> {
    ExecutionCoordinator::new(Strategy::UnpooledProcess).execute_all(target, batch)
}

/// At most `max_workers` threads (default: core count).
pub fn run_thread_pool<A: Send, T: WorkUnit<A>>(
    target: &T,
    batch: Vec<A>,
    max_workers: Option<usize>,
) -> Result<Vec<T::Output>, BatchError> {
    ExecutionCoordinator::new(Strategy::PooledThread { max_workers }).execute_all(target, batch)
}

/// At most `max_workers` child processes at once (default: core count).
pub fn run_process_pool<A: Send, T: WorkUnit<A>>(
    target: &T,
    batch: Vec<A>,
    max_workers: Option<usize>,
) -> Result<Vec<T::Output>, BatchError> {
    ExecutionCoordinator::new(Strategy::PooledProcess { max_workers }).execute_all(target, batch)
}

fn resolve_pool_size(limit: Option<usize>) -> Result<usize, BatchError> {
    match limit {
        Some(0) => Err(BatchError::InvalidConfig("max_workers must be at least 1".to_string())),
        Some(n) => Ok(n),
        None => Ok(thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(4)),
    }
}

fn run_unpooled<A, T>(target: &T, batch: Vec<A>) -> Vec<UnitOutcome<T::Output>>
where
    A: Send,
    T: WorkUnit<A>,
{
    thread::scope(|scope| {
        let mut outcomes = Vec::with_capacity(batch.len());
        let mut handles = Vec::with_capacity(batch.len());

        for (index, args) in batch.into_iter().enumerate() {
            let spawned = thread::Builder::new()
                .name(format!("unit-{}", index))
                .spawn_scoped(scope, move || run_unit(target, index, args));
            match spawned {
                Ok(handle) => handles.push((index, handle)),
                Err(e) => {
                    warn!(index, "Failed to spawn unit thread: {}", e);
                    outcomes.push(UnitOutcome {
                        index,
                        result: Err(UnitError::Spawn(e)),
                        elapsed: Duration::ZERO,
                    });
                }
            }
        }

        for (index, handle) in handles {
            // run_unit catches panics, so join only fails if that machinery does
            let outcome = handle.join().unwrap_or_else(|payload| UnitOutcome {
                index,
                result: Err(UnitError::Panicked(panic_message(payload.as_ref()))),
                elapsed: Duration::ZERO,
            });
            outcomes.push(outcome);
        }
        outcomes
    })
}

fn run_pooled<A, T>(target: &T, batch: Vec<A>, workers: usize) -> Result<Vec<UnitOutcome<T::Output>>, BatchError>
where
    A: Send,
    T: WorkUnit<A>,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("pool-worker-{}", i))
        .build()
        .map_err(|e| BatchError::InvalidConfig(format!("thread pool: {}", e)))?;

    let (out_tx, out_rx) = channel::unbounded();

    pool.scope(|s| {
        for (index, args) in batch.into_iter().enumerate() {
            let out_tx = out_tx.clone();
            s.spawn(move |_| {
                debug!(index, worker = ?rayon::current_thread_index(), "Worker picked up unit");
                // out_rx outlives the scope, so the send cannot fail
                let _ = out_tx.send(run_unit(target, index, args));
            });
        }
    });
    drop(out_tx);

    Ok(out_rx.try_iter().collect())
}

fn run_unit<A, T>(target: &T, index: usize, args: A) -> UnitOutcome<T::Output>
where
    T: WorkUnit<A>,
{
    let started = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| target.execute(index, args)))
        .unwrap_or_else(|payload| Err(UnitError::Panicked(panic_message(payload.as_ref()))));
    let elapsed = started.elapsed();

    match &result {
        Ok(_) => debug!(index, "Unit finished in {:.4}s", elapsed.as_secs_f64()),
        Err(e) => warn!(index, "Unit failed: {}", e),
    }

    UnitOutcome { index, result, elapsed }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{ProcessTarget, ThreadTarget};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Tracks how many units are inside `execute` at once.
    #[derive(Default)]
    struct ConcurrencyGauge {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ConcurrencyGauge {
        fn enter(&self) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_strategy_parse_and_names() {
        for strategy in [
            Strategy::UnpooledThread,
            Strategy::UnpooledProcess,
            Strategy::PooledThread { max_workers: None },
            Strategy::PooledProcess { max_workers: None },
        ] {
            assert_eq!(strategy.name().parse::<Strategy>().unwrap(), strategy);
        }
        assert!("fork".parse::<Strategy>().is_err());
        assert_eq!(
            Strategy::PooledThread { max_workers: None }.with_max_workers(Some(3)),
            Strategy::PooledThread { max_workers: Some(3) }
        );
        assert_eq!(Strategy::UnpooledThread.with_max_workers(Some(3)), Strategy::UnpooledThread);
    }

    #[test]
    fn test_unpooled_threads_run_every_unit() {
        let target = ThreadTarget::new(|x: u64| Ok::<_, String>(x * x));
        let outputs = run_threads(&target, vec![1, 2, 3, 4]).unwrap();
        assert_eq!(outputs, vec![1, 4, 9, 16]);
    }

    #[test]
    fn test_unpooled_threads_launch_all_at_once() {
        let gauge = ConcurrencyGauge::default();
        let barrier = std::sync::Barrier::new(4);
        let target = ThreadTarget::new(|_: usize| {
            gauge.enter();
            // Only passes when all four units are alive together
            barrier.wait();
            gauge.exit();
            Ok::<_, String>(())
        });

        run_threads(&target, vec![0; 4]).unwrap();
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_pool_never_exceeds_max_workers() {
        let gauge = ConcurrencyGauge::default();
        let target = ThreadTarget::new(|_: usize| {
            gauge.enter();
            thread::sleep(Duration::from_millis(20));
            gauge.exit();
            Ok::<_, String>(())
        });

        let report = ExecutionCoordinator::new(Strategy::PooledThread { max_workers: Some(2) })
            .execute(&target, (0..5).collect::<Vec<usize>>())
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.workers, 2);
        let peak = gauge.peak.load(Ordering::SeqCst);
        assert!(peak <= 2, "peak concurrency {} exceeded pool size", peak);
        assert!(peak >= 1);
    }

    #[test]
    fn test_pool_units_run_on_named_pool_workers() {
        let names = Mutex::new(Vec::new());
        let target = ThreadTarget::new(|_: usize| {
            let name = thread::current().name().map(str::to_string);
            names.lock().unwrap().push(name);
            Ok::<_, String>(())
        });

        run_thread_pool(&target, vec![0; 6], Some(3)).unwrap();

        let names = names.into_inner().unwrap();
        assert_eq!(names.len(), 6);
        for name in names {
            let name = name.expect("pool threads are named");
            assert!(name.starts_with("pool-worker-"), "ran on {}", name);
        }
    }

    #[test]
    fn test_pool_size_is_capped_by_batch_size() {
        let target = ThreadTarget::new(|x: u8| Ok::<_, String>(x));
        let report = ExecutionCoordinator::new(Strategy::PooledThread { max_workers: Some(8) })
            .execute(&target, vec![1, 2])
            .unwrap();
        assert_eq!(report.workers, 2);
    }

    #[test]
    fn test_zero_workers_is_invalid() {
        let target = ThreadTarget::new(|x: u8| Ok::<_, String>(x));
        let err = run_thread_pool(&target, vec![1], Some(0)).unwrap_err();
        assert!(matches!(err, BatchError::InvalidConfig(_)));
    }

    #[test]
    fn test_empty_batch() {
        let target = ThreadTarget::new(|x: u8| Ok::<_, String>(x));
        assert!(run_threads(&target, Vec::new()).unwrap().is_empty());
        assert!(run_thread_pool(&target, Vec::new(), None).unwrap().is_empty());
    }

    #[test]
    fn test_failure_waits_for_remaining_units() {
        for strategy in [
            Strategy::UnpooledThread,
            Strategy::PooledThread { max_workers: Some(2) },
        ] {
            let finished = Mutex::new(Vec::new());
            let target = ThreadTarget::new(|i: usize| {
                if i == 0 {
                    return Err(format!("unit {} diverged", i));
                }
                thread::sleep(Duration::from_millis(10 * i as u64));
                finished.lock().unwrap().push(i);
                Ok(i)
            });

            let err = ExecutionCoordinator::new(strategy)
                .execute_all(&target, (0..5).collect::<Vec<usize>>())
                .unwrap_err();

            let mut done = finished.lock().unwrap().clone();
            done.sort();
            assert_eq!(done, vec![1, 2, 3, 4], "strategy {}", strategy);

            match err {
                BatchError::UnitsFailed { total, completed, failures } => {
                    assert_eq!(total, 5);
                    assert_eq!(completed, vec![1, 2, 3, 4]);
                    assert_eq!(failures.len(), 1);
                    assert_eq!(failures[0].index, 0);
                }
                other => panic!("unexpected error: {}", other),
            }
        }
    }

    #[test]
    fn test_panicking_unit_is_reported_and_worker_survives() {
        let target = ThreadTarget::new(|i: usize| {
            if i == 1 {
                panic!("unit {} blew up", i);
            }
            Ok::<_, String>(i)
        });

        let report = ExecutionCoordinator::new(Strategy::PooledThread { max_workers: Some(1) })
            .execute(&target, (0..4).collect::<Vec<usize>>())
            .unwrap();

        assert_eq!(report.succeeded(), 3);
        match &report.outcomes[1].result {
            Err(UnitError::Panicked(msg)) => assert!(msg.contains("blew up")),
            other => panic!("expected panic outcome, got {:?}", other.as_ref().err()),
        }
    }

    #[test]
    fn test_isolation_mismatch_is_rejected_before_launch() {
        let ran = AtomicUsize::new(0);
        let target = ThreadTarget::new(|_: ()| {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(())
        });

        let err = ExecutionCoordinator::new(Strategy::UnpooledProcess)
            .execute(&target, vec![(), ()])
            .unwrap_err();

        assert!(matches!(err, BatchError::IsolationMismatch { .. }));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[cfg(unix)]
    fn shell_target() -> ProcessTarget<impl Fn(&String) -> std::process::Command + Sync> {
        ProcessTarget::new(|script: &String| {
            let mut cmd = std::process::Command::new("sh");
            cmd.arg("-c").arg(script);
            cmd
        })
    }

    #[cfg(unix)]
    #[test]
    fn test_unpooled_processes() {
        let outputs = run_processes(
            &shell_target(),
            vec!["echo 1".to_string(), "echo 2".to_string()],
        )
        .unwrap();
        let values: Vec<u32> = outputs.iter().map(|o| o.parse_json().unwrap()).collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_pool_collects_exit_failures() {
        let batch = vec![
            "exit 0".to_string(),
            "echo broken >&2; exit 2".to_string(),
            "sleep 0.05; exit 0".to_string(),
        ];

        let err = run_process_pool(&shell_target(), batch, Some(2)).unwrap_err();

        match err {
            BatchError::UnitsFailed { completed, failures, .. } => {
                assert_eq!(completed, vec![0, 2]);
                assert_eq!(failures[0].index, 1);
                assert!(matches!(failures[0].error, UnitError::ProcessExit { .. }));
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
