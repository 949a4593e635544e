//! Work unit targets: what a coordinator runs once per batch argument.

use crate::error::{BoxError, UnitError};
use serde::de::DeserializeOwned;
use std::process::{Command, Stdio};
use tracing::debug;

/// Where a unit's work happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// In-process, sharing memory with the caller
    Thread,
    /// In a child OS process with its own memory
    Process,
}

impl Isolation {
    pub fn name(&self) -> &'static str {
        match self {
            Isolation::Thread => "thread",
            Isolation::Process => "process",
        }
    }
}

/// A callable the coordinator invokes once per argument in a batch.
///
/// # Implementations
///
/// - `ThreadTarget` - wraps a closure, runs in the worker thread
/// - `ProcessTarget` - builds a `Command`, runs it as a child process and
///   waits for it from the worker thread
pub trait WorkUnit<A>: Sync {
    type Output: Send;

    /// Runs one unit. `index` is the argument's position in the batch.
    fn execute(&self, index: usize, args: A) -> Result<Self::Output, UnitError>;

    fn isolation(&self) -> Isolation;
}

/// Runs a closure in-process.
pub struct ThreadTarget<F> {
    f: F,
}

impl<F> ThreadTarget<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<A, R, E, F> WorkUnit<A> for ThreadTarget<F>
where
    F: Fn(A) -> Result<R, E> + Sync,
    R: Send,
    E: Into<BoxError>,
{
    type Output = R;

    fn execute(&self, _index: usize, args: A) -> Result<R, UnitError> {
        (self.f)(args).map_err(UnitError::failed)
    }

    fn isolation(&self) -> Isolation {
        Isolation::Thread
    }
}

/// Captured result of a successful child process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Parses the last non-empty stdout line as JSON.
    pub fn parse_json<T: DeserializeOwned>(&self) -> Result<T, UnitError> {
        let line = self
            .stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| UnitError::Decode("empty stdout".to_string()))?;
        serde_json::from_str(line).map_err(|e| UnitError::Decode(format!("{}: {}", e, line)))
    }
}

/// Runs each unit as a child process built by `build`.
///
/// The child inherits no stdin. A non-zero exit status is a unit failure
/// carrying the tail of the child's stderr.
pub struct ProcessTarget<F> {
    build: F,
}

impl<F> ProcessTarget<F> {
    pub fn new(build: F) -> Self {
        Self { build }
    }
}

impl<A, F> WorkUnit<A> for ProcessTarget<F>
where
    F: Fn(&A) -> Command + Sync,
{
    type Output = ProcessOutput;

    fn execute(&self, index: usize, args: A) -> Result<ProcessOutput, UnitError> {
        let mut command = (self.build)(&args);
        command.stdin(Stdio::null());
        debug!(index, "Spawning {:?}", command);

        let output = command.output().map_err(UnitError::Spawn)?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(UnitError::ProcessExit {
                status: output.status.to_string(),
                stderr: tail(&stderr, 512),
            });
        }

        debug!(index, "Child exited with {}", output.status);
        Ok(ProcessOutput { stdout, stderr })
    }

    fn isolation(&self) -> Isolation {
        Isolation::Process
    }
}

/// Last `max` bytes of `text`, trimmed, on a char boundary.
fn tail(text: &str, max: usize) -> String {
    let text = text.trim_end();
    if text.len() <= max {
        return text.to_string();
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_target_maps_errors() {
        let target = ThreadTarget::new(|x: u32| if x > 2 { Err("too big") } else { Ok(x * 2) });
        assert_eq!(target.execute(0, 2).unwrap(), 4);
        assert!(matches!(target.execute(1, 3), Err(UnitError::Failed(_))));
        assert_eq!(WorkUnit::<u32>::isolation(&target), Isolation::Thread);
    }

    #[test]
    fn test_parse_json_uses_last_line() {
        let output = ProcessOutput {
            stdout: "log line\n{\"steps\": 3}\n\n".to_string(),
            stderr: String::new(),
        };
        let value: serde_json::Value = output.parse_json().unwrap();
        assert_eq!(value["steps"], 3);

        let empty = ProcessOutput {
            stdout: String::new(),
            stderr: String::new(),
        };
        assert!(matches!(empty.parse_json::<serde_json::Value>(), Err(UnitError::Decode(_))));
    }

    #[test]
    fn test_tail_keeps_end() {
        assert_eq!(tail("short\n", 10), "short");
        assert_eq!(tail("abcdefghij", 4), "...ghij");
    }

    #[cfg(unix)]
    #[test]
    fn test_process_target_reports_exit_status() {
        let target = ProcessTarget::new(|code: &i32| {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(format!("echo out; echo err >&2; exit {}", code));
            cmd
        });

        let ok = target.execute(0, 0).unwrap();
        assert_eq!(ok.stdout.trim(), "out");

        match target.execute(1, 3) {
            Err(UnitError::ProcessExit { stderr, .. }) => assert_eq!(stderr, "err"),
            other => panic!("expected ProcessExit, got {:?}", other.map(|o| o.stdout)),
        }
    }

    #[test]
    fn test_process_target_spawn_failure() {
        let target = ProcessTarget::new(|_: &()| Command::new("/nonexistent/brainsim-worker"));
        assert!(matches!(target.execute(0, ()), Err(UnitError::Spawn(_))));
    }
}
