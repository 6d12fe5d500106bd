/// Harness Executor - Per-Case Orchestration
///
/// **Responsibility:**
/// Drive every test case through its two stages and collect the reports.
///
/// **Architecture:**
/// 1. Allocate the artifact location for the case (shared path or temp dir)
/// 2. Run the build tool through the Engine (engine.rs)
/// 3. Only if it exited 0, run the artifact through the Engine
/// 4. Classify with the Evaluator (evaluator.rs) and notify the Reporter
///
/// **Ordering:**
/// With the shared output layout every case writes the same file, so cases run
/// strictly one after another: case i+1 is not compiled before case i's
/// artifact has exited. Concurrency is only allowed with per-case output,
/// and even then reports are emitted in case order.

use crate::engine::{Engine, Invocation};
use crate::evaluator;
use crate::report::{self, NullReporter, Reporter};
use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use gigly_harness_common::config::{HarnessConfig, OutputLayout, ARTIFACT_NAME};
use gigly_harness_common::types::{CaseReport, RunResult, RunSummary, Stage, TestCase};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Where one case's artifact lives for the duration of the case
enum ArtifactSlot {
    Shared(PathBuf),
    /// Removed from disk when the slot is dropped
    Scoped { dir: TempDir, path: PathBuf },
}

impl ArtifactSlot {
    fn allocate(layout: &OutputLayout) -> io::Result<Self> {
        match layout {
            OutputLayout::Shared { path } => Ok(ArtifactSlot::Shared(path.clone())),
            OutputLayout::PerCase => {
                let dir = tempfile::Builder::new().prefix("gigly-case-").tempdir()?;
                let path = dir.path().join(ARTIFACT_NAME);
                Ok(ArtifactSlot::Scoped { dir, path })
            }
        }
    }

    fn path(&self) -> &Path {
        match self {
            ArtifactSlot::Shared(path) => path.as_path(),
            ArtifactSlot::Scoped { path, .. } => path.as_path(),
        }
    }

    /// Make sure a previous case's artifact cannot be mistaken for this one's
    fn clear(&self) {
        if let ArtifactSlot::Shared(path) = self {
            match fs::remove_file(path) {
                Ok(()) => debug!(artifact = %path.display(), "Removed stale artifact"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(artifact = %path.display(), error = %e, "Could not remove stale artifact"),
            }
        }
    }

    fn release(self) {
        if let ArtifactSlot::Scoped { dir, .. } = self {
            let location = dir.path().display().to_string();
            if let Err(e) = dir.close() {
                warn!(dir = %location, error = %e, "Failed to remove per-case output directory");
            }
        }
    }
}

/// Build-tool invocation: `[build_args..] <source_dir> -o <artifact>`
pub fn compile_invocation(case: &TestCase, artifact: &Path, config: &HarnessConfig) -> Invocation {
    let mut args: Vec<OsString> = config.build_args.iter().map(OsString::from).collect();
    args.push(case.source_dir.clone().into_os_string());
    args.push(OsString::from("-o"));
    args.push(artifact.as_os_str().to_os_string());

    Invocation {
        stage: Stage::Compile,
        program: config.build_tool.clone(),
        args,
        capture_output: config.capture_output,
        timeout_ms: config.timeout_ms,
    }
}

/// Artifact invocation: no arguments
pub fn execute_invocation(artifact: &Path, config: &HarnessConfig) -> Invocation {
    Invocation {
        stage: Stage::Execute,
        program: artifact.to_path_buf(),
        args: Vec::new(),
        capture_output: config.capture_output,
        timeout_ms: config.timeout_ms,
    }
}

/// Run both stages of one case against an already allocated artifact path
#[instrument(skip_all, fields(case = case.id))]
pub async fn run_case<E: Engine>(
    case: &TestCase,
    artifact: &Path,
    config: &HarnessConfig,
    engine: &E,
    reporter: &mut dyn Reporter,
) -> Result<CaseReport> {
    let mut report = CaseReport {
        case: case.clone(),
        result: RunResult::Success,
        invocations: 0,
        compile: None,
        execute: None,
        artifact: artifact.to_path_buf(),
    };

    // Stage 1: build
    reporter.stage_started(case, Stage::Compile)?;
    let compiled = engine.run(&compile_invocation(case, artifact, config)).await;
    if compiled.as_ref().map_or_else(|e| e.process_started(), |_| true) {
        report.invocations += 1;
    }
    let failure = evaluator::evaluate_stage(Stage::Compile, &compiled);
    report.compile = compiled.ok();
    reporter.stage_finished(case, Stage::Compile, report.compile.as_ref(), failure.as_ref())?;

    if let Some(failure) = failure {
        info!(source_dir = %case.name(), result = %failure, "Case stopped at compile stage");
        report.result = failure;
        reporter.case_finished(&report)?;
        return Ok(report);
    }

    // Stage 2: run the artifact this case just produced
    reporter.stage_started(case, Stage::Execute)?;
    let executed = engine.run(&execute_invocation(artifact, config)).await;
    if executed.as_ref().map_or_else(|e| e.process_started(), |_| true) {
        report.invocations += 1;
    }
    let failure = evaluator::evaluate_stage(Stage::Execute, &executed);
    report.execute = executed.ok();
    reporter.stage_finished(case, Stage::Execute, report.execute.as_ref(), failure.as_ref())?;

    report.result = failure.unwrap_or(RunResult::Success);
    info!(source_dir = %case.name(), result = %report.result, "Case finished");

    reporter.case_finished(&report)?;
    Ok(report)
}

/// Allocate the artifact slot, run the case, release the slot
async fn run_slotted<E: Engine>(
    case: &TestCase,
    config: &HarnessConfig,
    engine: &E,
    reporter: &mut dyn Reporter,
) -> Result<CaseReport> {
    let slot = match ArtifactSlot::allocate(&config.output) {
        Ok(slot) => slot,
        Err(e) => {
            warn!(case = case.id, error = %e, "Could not allocate output location");
            let report = CaseReport {
                case: case.clone(),
                result: RunResult::SpawnFailed {
                    stage: Stage::Compile,
                    message: format!("could not allocate output location: {}", e),
                },
                invocations: 0,
                compile: None,
                execute: None,
                artifact: PathBuf::new(),
            };
            report::replay(&report, reporter)?;
            return Ok(report);
        }
    };

    slot.clear();
    let report = run_case(case, slot.path(), config, engine, reporter).await;
    slot.release();
    report
}

/// Execute every case and aggregate the results.
///
/// Case failures never abort the run; only reporter I/O errors or an
/// unusable shared output directory do.
pub async fn execute_run<E: Engine>(
    cases: &[TestCase],
    config: &HarnessConfig,
    engine: &E,
    reporter: &mut dyn Reporter,
) -> Result<RunSummary> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();

    info!(
        run_id = %run_id,
        cases = cases.len(),
        build_tool = %config.build_tool.display(),
        jobs = config.jobs,
        "Starting harness run"
    );

    if let OutputLayout::Shared { path } = &config.output {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory {}", parent.display())
            })?;
        }
    }

    reporter.run_started(cases)?;

    let mut reports = Vec::with_capacity(cases.len());
    if config.jobs > 1 && !config.output.is_shared() {
        let mut pending = stream::iter(cases)
            .map(|case| async move {
                let mut quiet = NullReporter;
                run_slotted(case, config, engine, &mut quiet).await
            })
            .buffered(config.jobs);

        while let Some(report) = pending.next().await {
            let report = report?;
            report::replay(&report, reporter)?;
            reports.push(report);
        }
    } else {
        for case in cases {
            reports.push(run_slotted(case, config, engine, reporter).await?);
        }
    }

    let summary = evaluator::summarize(run_id, started_at, Utc::now(), reports);

    info!(
        run_id = %run_id,
        passed = summary.passed,
        failed = summary.failed,
        total = summary.total,
        "Harness run complete"
    );

    reporter.run_finished(&summary)?;
    Ok(summary)
}
