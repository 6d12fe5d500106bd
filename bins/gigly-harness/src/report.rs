//! User-facing output for a harness run.
//!
//! The executor drives a [`Reporter`] as stages start and finish. The console
//! reporter prints colored per-stage lines as they happen; the JSON reporter
//! stays quiet until the run is over and then prints the whole summary.

use gigly_harness_common::types::{CaseReport, RunResult, RunSummary, Stage, StageOutcome, TestCase};
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

const SEPARATOR: &str = "=============================================";

pub trait Reporter {
    fn run_started(&mut self, _cases: &[TestCase]) -> io::Result<()> {
        Ok(())
    }

    fn stage_started(&mut self, _case: &TestCase, _stage: Stage) -> io::Result<()> {
        Ok(())
    }

    /// `failure` is `None` when the stage passed
    fn stage_finished(
        &mut self,
        _case: &TestCase,
        _stage: Stage,
        _outcome: Option<&StageOutcome>,
        _failure: Option<&RunResult>,
    ) -> io::Result<()> {
        Ok(())
    }

    fn case_finished(&mut self, _report: &CaseReport) -> io::Result<()> {
        Ok(())
    }

    fn run_finished(&mut self, _summary: &RunSummary) -> io::Result<()> {
        Ok(())
    }
}

/// Swallows every event
pub struct NullReporter;

impl Reporter for NullReporter {}

/// Re-emit the events of an already finished case, in the order a live run
/// would have produced them.
pub fn replay(report: &CaseReport, reporter: &mut dyn Reporter) -> io::Result<()> {
    let failed_at = report.result.failed_stage();
    let failure_for = |stage: Stage| (failed_at == Some(stage)).then_some(&report.result);

    reporter.stage_started(&report.case, Stage::Compile)?;
    reporter.stage_finished(
        &report.case,
        Stage::Compile,
        report.compile.as_ref(),
        failure_for(Stage::Compile),
    )?;

    if failed_at != Some(Stage::Compile) {
        reporter.stage_started(&report.case, Stage::Execute)?;
        reporter.stage_finished(
            &report.case,
            Stage::Execute,
            report.execute.as_ref(),
            failure_for(Stage::Execute),
        )?;
    }

    reporter.case_finished(report)
}

pub struct ConsoleReporter<W> {
    out: W,
}

impl ConsoleReporter<StandardStream> {
    pub fn stdout(choice: ColorChoice) -> Self {
        Self::new(StandardStream::stdout(choice))
    }
}

impl<W: WriteColor> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Write `label` in `color`, then `detail` uncolored, then a newline
    fn line(&mut self, color: Color, label: &str, detail: Option<&str>) -> io::Result<()> {
        self.out.set_color(ColorSpec::new().set_fg(Some(color)))?;
        write!(self.out, "{}", label)?;
        self.out.reset()?;
        match detail {
            Some(detail) => writeln!(self.out, " {}", detail),
            None => writeln!(self.out),
        }
    }

    fn captured(&mut self, outcome: &StageOutcome) -> io::Result<()> {
        for (stream, text) in [("stdout", &outcome.stdout), ("stderr", &outcome.stderr)] {
            let Some(text) = text.as_deref() else { continue };
            if text.trim().is_empty() {
                continue;
            }
            writeln!(self.out, "--- {} ---", stream)?;
            for line in text.trim_end().lines() {
                writeln!(self.out, "{}", line)?;
            }
        }
        Ok(())
    }
}

fn title(stage: Stage) -> &'static str {
    match stage {
        Stage::Compile => "Compilation",
        Stage::Execute => "Execution",
    }
}

impl<W: WriteColor> Reporter for ConsoleReporter<W> {
    fn run_started(&mut self, cases: &[TestCase]) -> io::Result<()> {
        writeln!(self.out, "Testing {} case(s)", cases.len())
    }

    fn stage_started(&mut self, case: &TestCase, stage: Stage) -> io::Result<()> {
        match stage {
            Stage::Compile => writeln!(self.out, "======== Compiling for {} ========", case.name()),
            Stage::Execute => writeln!(
                self.out,
                "======== Running executable for {} ========",
                case.name()
            ),
        }
    }

    fn stage_finished(
        &mut self,
        case: &TestCase,
        stage: Stage,
        outcome: Option<&StageOutcome>,
        failure: Option<&RunResult>,
    ) -> io::Result<()> {
        if let Some(outcome) = outcome {
            self.captured(outcome)?;
        }

        let name = case.name();
        match failure {
            None | Some(RunResult::Success) => {
                let label = format!("{} successful for {}!", title(stage), name);
                self.line(Color::Green, &label, None)
            }
            Some(RunResult::CompileFailed { exit_code }) | Some(RunResult::ExecuteFailed { exit_code }) => {
                let label = format!("{} failed for {} with return code:", title(stage), name);
                self.line(Color::Red, &label, Some(&exit_code.to_string()))
            }
            Some(RunResult::SpawnFailed { message, .. }) => {
                let label = format!("Could not start {} for {}:", stage.noun(), name);
                self.line(Color::Red, &label, Some(message))
            }
            Some(RunResult::TimedOut { timeout_ms, .. }) => {
                let label = format!("{} timed out for {} after {}ms", title(stage), name, timeout_ms);
                self.line(Color::Red, &label, None)
            }
        }
    }

    fn case_finished(&mut self, _report: &CaseReport) -> io::Result<()> {
        writeln!(self.out, "{}", SEPARATOR)
    }

    fn run_finished(&mut self, summary: &RunSummary) -> io::Result<()> {
        let color = if summary.all_passed() { Color::Green } else { Color::Red };
        let label = format!(
            "{} passed, {} failed, {} total",
            summary.passed, summary.failed, summary.total
        );
        self.line(color, &label, None)?;
        self.out.flush()
    }
}

/// Prints the run summary as pretty JSON once the run is complete
pub struct JsonReporter<W> {
    out: W,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn run_finished(&mut self, summary: &RunSummary) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut self.out, summary)?;
        writeln!(self.out)?;
        self.out.flush()
    }
}

/// Records events as short strings, for asserting on event order
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingReporter {
    pub events: Vec<String>,
}

#[cfg(test)]
impl Reporter for RecordingReporter {
    fn run_started(&mut self, cases: &[TestCase]) -> io::Result<()> {
        self.events.push(format!("run_started {}", cases.len()));
        Ok(())
    }

    fn stage_started(&mut self, case: &TestCase, stage: Stage) -> io::Result<()> {
        self.events.push(format!("start {} {}", stage, case.id));
        Ok(())
    }

    fn stage_finished(
        &mut self,
        case: &TestCase,
        stage: Stage,
        _outcome: Option<&StageOutcome>,
        failure: Option<&RunResult>,
    ) -> io::Result<()> {
        let verdict = failure.map(|f| f.to_string()).unwrap_or_else(|| "ok".to_string());
        self.events.push(format!("finish {} {} {}", stage, case.id, verdict));
        Ok(())
    }

    fn case_finished(&mut self, report: &CaseReport) -> io::Result<()> {
        self.events.push(format!("case {} {}", report.case.id, report.result));
        Ok(())
    }

    fn run_finished(&mut self, summary: &RunSummary) -> io::Result<()> {
        self.events.push(format!("run_finished {}/{}", summary.passed, summary.total));
        Ok(())
    }
}
