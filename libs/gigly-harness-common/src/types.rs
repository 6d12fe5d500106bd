use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// One fixture directory handed to the build tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: u32,
    pub source_dir: PathBuf,
}

impl TestCase {
    pub fn new(id: u32, source_dir: impl Into<PathBuf>) -> Self {
        Self {
            id,
            source_dir: source_dir.into(),
        }
    }

    /// Display name used in console output (the fixture path as configured)
    pub fn name(&self) -> String {
        self.source_dir.display().to_string()
    }
}

/// The two external invocations made for every test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Compile,
    Execute,
}

impl Stage {
    /// Noun form used in report lines ("Compilation failed ...")
    pub fn noun(&self) -> &'static str {
        match self {
            Stage::Compile => "compilation",
            Stage::Execute => "execution",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Compile => write!(f, "compile"),
            Stage::Execute => write!(f, "execute"),
        }
    }
}

/// What the engine observed for a single child process that ran to completion.
///
/// A child terminated by a signal carries `-signal` as its exit code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: Stage,
    pub exit_code: i32,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl StageOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Final classification of one test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunResult {
    Success,
    CompileFailed { exit_code: i32 },
    ExecuteFailed { exit_code: i32 },
    /// The process for `stage` could not be started at all
    SpawnFailed { stage: Stage, message: String },
    TimedOut { stage: Stage, timeout_ms: u64 },
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RunResult::Success)
    }

    /// Stage at which the case stopped, `None` for a success
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            RunResult::Success => None,
            RunResult::CompileFailed { .. } => Some(Stage::Compile),
            RunResult::ExecuteFailed { .. } => Some(Stage::Execute),
            RunResult::SpawnFailed { stage, .. } | RunResult::TimedOut { stage, .. } => {
                Some(*stage)
            }
        }
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunResult::Success => write!(f, "Success"),
            RunResult::CompileFailed { exit_code } => write!(f, "CompileFailed({})", exit_code),
            RunResult::ExecuteFailed { exit_code } => write!(f, "ExecuteFailed({})", exit_code),
            RunResult::SpawnFailed { stage, message } => {
                write!(f, "SpawnFailed({}: {})", stage, message)
            }
            RunResult::TimedOut { stage, timeout_ms } => {
                write!(f, "TimedOut({} after {}ms)", stage, timeout_ms)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReport {
    pub case: TestCase,
    pub result: RunResult,
    /// Child processes actually started for this case (0, 1 or 2)
    pub invocations: u32,
    pub compile: Option<StageOutcome>,
    pub execute: Option<StageOutcome>,
    pub artifact: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub reports: Vec<CaseReport>,
}

impl RunSummary {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Per-case classifications in run order
    pub fn classifications(&self) -> Vec<(u32, RunResult)> {
        self.reports
            .iter()
            .map(|r| (r.case.id, r.result.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_result_serializes_with_status_tag() {
        let json = serde_json::to_value(RunResult::CompileFailed { exit_code: 2 }).unwrap();
        assert_eq!(json["status"], "compile_failed");
        assert_eq!(json["exit_code"], 2);

        let json = serde_json::to_value(RunResult::SpawnFailed {
            stage: Stage::Execute,
            message: "No such file or directory".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "spawn_failed");
        assert_eq!(json["stage"], "execute");
    }

    #[test]
    fn failed_stage_points_at_the_stopping_stage() {
        assert_eq!(RunResult::Success.failed_stage(), None);
        assert_eq!(
            RunResult::CompileFailed { exit_code: 1 }.failed_stage(),
            Some(Stage::Compile)
        );
        assert_eq!(
            RunResult::ExecuteFailed { exit_code: 1 }.failed_stage(),
            Some(Stage::Execute)
        );
        assert_eq!(
            RunResult::TimedOut { stage: Stage::Compile, timeout_ms: 10 }.failed_stage(),
            Some(Stage::Compile)
        );
    }

    #[test]
    fn stage_outcome_omits_uncaptured_streams() {
        let outcome = StageOutcome {
            stage: Stage::Compile,
            exit_code: 0,
            duration_ms: 3,
            stdout: None,
            stderr: None,
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(!json.contains("stdout"));
        assert!(outcome.succeeded());
    }
}
