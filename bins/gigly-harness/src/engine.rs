/// Process Engine - Spawning External Processes
///
/// **Core Responsibility:**
/// Start one external program from an argument list and report how it exited.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to run a process (spawn, wait, kill on timeout)
/// - Engine does NOT know what a passing test case is
/// - Engine returns raw exit statuses for the Evaluator to judge
///
/// Arguments are passed to the OS as a list; no shell is involved, so fixture
/// paths with spaces or quotes reach the build tool unchanged.

use gigly_harness_common::types::{Stage, StageOutcome};
use std::ffi::OsString;
use std::future::Future;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// One external process to run for a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub stage: Stage,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Pipe stdout/stderr into the outcome instead of inheriting the console
    pub capture_output: bool,
    pub timeout_ms: Option<u64>,
}

impl Invocation {
    /// Command line as a single string, for logs only
    pub fn display_command(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed while waiting for `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` did not exit within {timeout_ms}ms")]
    Timeout { program: String, timeout_ms: u64 },
}

impl EngineError {
    /// Whether a child process was actually started before the error
    pub fn process_started(&self) -> bool {
        !matches!(self, EngineError::Spawn { .. })
    }
}

/// Result of running one stage
pub type StageResult = Result<StageOutcome, EngineError>;

/// Something that can run an [`Invocation`] to completion.
///
/// Production uses [`ProcessEngine`]; tests substitute a scripted engine to
/// observe invocation order without touching the OS.
pub trait Engine: Send + Sync {
    fn run(&self, invocation: &Invocation) -> impl Future<Output = StageResult> + Send;
}

/// Runs invocations as real child processes via tokio
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEngine;

impl ProcessEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Engine for ProcessEngine {
    async fn run(&self, invocation: &Invocation) -> StageResult {
        let program = invocation.program.display().to_string();

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args).kill_on_drop(true);
        if invocation.capture_output {
            command
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        }

        debug!(stage = %invocation.stage, command = %invocation.display_command(), "Spawning process");

        let start = Instant::now();
        let mut child = command.spawn().map_err(|source| EngineError::Spawn {
            program: program.clone(),
            source,
        })?;

        let timeout = invocation.timeout_ms.map(Duration::from_millis);

        let (status, stdout, stderr) = if invocation.capture_output {
            // Dropping the pending future drops the child, and kill_on_drop reaps it
            let waited = match timeout {
                Some(limit) => tokio::time::timeout(limit, child.wait_with_output()).await,
                None => Ok(child.wait_with_output().await),
            };
            let output = match waited {
                Ok(output) => output.map_err(|source| EngineError::Wait {
                    program: program.clone(),
                    source,
                })?,
                Err(_) => return Err(timed_out(program, invocation)),
            };
            (
                output.status,
                Some(String::from_utf8_lossy(&output.stdout).into_owned()),
                Some(String::from_utf8_lossy(&output.stderr).into_owned()),
            )
        } else {
            let waited = match timeout {
                Some(limit) => tokio::time::timeout(limit, child.wait()).await,
                None => Ok(child.wait().await),
            };
            let status = match waited {
                Ok(status) => status.map_err(|source| EngineError::Wait {
                    program: program.clone(),
                    source,
                })?,
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        warn!(program = %program, error = %e, "Failed to kill timed out process");
                    }
                    return Err(timed_out(program, invocation));
                }
            };
            (status, None, None)
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = exit_code(&status);

        debug!(
            stage = %invocation.stage,
            exit_code = exit_code,
            duration_ms = duration_ms,
            "Process exited"
        );

        Ok(StageOutcome {
            stage: invocation.stage,
            exit_code,
            duration_ms,
            stdout,
            stderr,
        })
    }
}

fn timed_out(program: String, invocation: &Invocation) -> EngineError {
    let timeout_ms = invocation.timeout_ms.unwrap_or_default();
    warn!(program = %program, timeout_ms = timeout_ms, "Process timed out and was killed");
    EngineError::Timeout { program, timeout_ms }
}

/// Exit code of a finished process; `-signal` when it was killed by a signal
pub fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    -1
}
