/// Case Evaluator - Exit Status Classification
///
/// **Core Responsibility:**
/// Turn what the engine observed into a `RunResult` per case, and fold case
/// reports into a `RunSummary` with an exit code for the harness itself.
///
/// **Critical Properties:**
/// - Knows nothing about processes or the filesystem
/// - Pure functions: (stage results) → classification
///
/// **Classification Rules:**
/// - exit code 0 passes a stage, anything else fails it
/// - a stage that could not be started is `SpawnFailed`, distinct from a
///   nonzero exit
/// - a stage killed by the timeout is `TimedOut`
/// - a case is `Success` only when both stages passed

use crate::engine::{EngineError, StageResult};
use chrono::{DateTime, Utc};
use gigly_harness_common::types::{CaseReport, RunResult, RunSummary, Stage};
use uuid::Uuid;

/// Judge one stage. `None` means the stage passed and the case may continue.
pub fn evaluate_stage(stage: Stage, result: &StageResult) -> Option<RunResult> {
    match result {
        Ok(outcome) if outcome.succeeded() => None,
        Ok(outcome) => Some(match stage {
            Stage::Compile => RunResult::CompileFailed {
                exit_code: outcome.exit_code,
            },
            Stage::Execute => RunResult::ExecuteFailed {
                exit_code: outcome.exit_code,
            },
        }),
        Err(error) => Some(classify_error(stage, error)),
    }
}

/// Map an engine error onto the per-case error taxonomy
pub fn classify_error(stage: Stage, error: &EngineError) -> RunResult {
    match error {
        EngineError::Timeout { timeout_ms, .. } => RunResult::TimedOut {
            stage,
            timeout_ms: *timeout_ms,
        },
        EngineError::Spawn { .. } | EngineError::Wait { .. } => RunResult::SpawnFailed {
            stage,
            message: error.to_string(),
        },
    }
}

/// Aggregate case reports into the final run summary
pub fn summarize(
    run_id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    reports: Vec<CaseReport>,
) -> RunSummary {
    let total = reports.len();
    let passed = reports.iter().filter(|r| r.result.is_success()).count();

    RunSummary {
        run_id,
        started_at,
        finished_at,
        total,
        passed,
        failed: total - passed,
        reports,
    }
}

/// Exit code for the harness process.
///
/// With `fail_on_error` any non-successful case turns the run red (1); without
/// it the harness always exits 0 once every case was attempted.
pub fn exit_code(summary: &RunSummary, fail_on_error: bool) -> u8 {
    if fail_on_error && !summary.all_passed() {
        1
    } else {
        0
    }
}
