// CLI commands for the harness
use crate::config::{self, Overrides};
use crate::engine::ProcessEngine;
use crate::evaluator;
use crate::executor;
use crate::report::{ConsoleReporter, JsonReporter};
use anyhow::Result;
use clap::{Args, ValueEnum};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use termcolor::ColorChoice;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Colored per-stage lines
    Console,
    /// The run summary as JSON, printed once at the end
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn choice(self) -> ColorChoice {
        match self {
            ColorMode::Auto if io::stdout().is_terminal() => ColorChoice::Auto,
            ColorMode::Auto | ColorMode::Never => ColorChoice::Never,
            ColorMode::Always => ColorChoice::Always,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// JSON config file (defaults to ./gigly-harness.json when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to the gigly compiler
    #[arg(long)]
    pub build_tool: Option<PathBuf>,

    /// Extra argument placed before `<dir> -o <artifact>` (repeatable)
    #[arg(long = "build-arg", allow_hyphen_values = true)]
    pub build_args: Vec<String>,

    /// Directory holding the test case folders
    #[arg(long)]
    pub test_root: Option<PathBuf>,

    /// Folder name prefix of a test case (`test` → test1, test2, ...)
    #[arg(long)]
    pub prefix: Option<String>,

    /// First case number of the range
    #[arg(long)]
    pub first: Option<u32>,

    /// Number of cases in the range
    #[arg(long)]
    pub count: Option<u32>,

    /// Find cases by scanning the test root instead of using a range
    #[arg(long, conflicts_with_all = ["first", "count"])]
    pub discover: bool,

    /// Only run these case numbers
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<u32>,

    /// Shared artifact path, overwritten by every case
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Give every case its own temporary artifact location
    #[arg(long, conflicts_with = "output")]
    pub per_case_output: bool,

    /// Cases to run concurrently (needs --per-case-output)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Kill a build or artifact that runs longer than this
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Capture child stdout/stderr and print it with the case
    #[arg(long)]
    pub capture_output: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Console)]
    pub format: OutputFormat,

    #[arg(long, value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,

    /// Exit 0 even when cases fail
    #[arg(long)]
    pub no_fail: bool,

    /// Format of diagnostic logs on stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// More diagnostic logging (-v info, -vv debug); RUST_LOG wins when set
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl RunArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            build_tool: self.build_tool.clone(),
            build_args: self.build_args.clone(),
            test_root: self.test_root.clone(),
            prefix: self.prefix.clone(),
            first: self.first,
            count: self.count,
            discover: self.discover,
            only: self.only.clone(),
            output: self.output.clone(),
            per_case_output: self.per_case_output,
            jobs: self.jobs,
            timeout_ms: self.timeout_ms,
            // Child output would corrupt the JSON document on stdout
            capture_output: self.capture_output || self.format == OutputFormat::Json,
            no_fail: self.no_fail,
        }
    }
}

/// Run every selected case and turn the summary into the process exit code
pub async fn run(args: &RunArgs) -> Result<ExitCode> {
    let config = config::load(args.config.as_deref(), &args.overrides())?;
    let cases = config::resolve_cases(&config)?;
    let engine = ProcessEngine::new();

    info!(cases = cases.len(), build_tool = %config.build_tool.display(), "Loaded harness configuration");

    let summary = match args.format {
        OutputFormat::Console => {
            let mut reporter = ConsoleReporter::stdout(args.color.choice());
            executor::execute_run(&cases, &config, &engine, &mut reporter).await?
        }
        OutputFormat::Json => {
            let mut reporter = JsonReporter::new(io::stdout().lock());
            executor::execute_run(&cases, &config, &engine, &mut reporter).await?
        }
    };

    Ok(ExitCode::from(evaluator::exit_code(&summary, config.fail_on_error)))
}

/// Print the resolved cases, one per line
pub fn list(args: &RunArgs) -> Result<ExitCode> {
    let config = config::load(args.config.as_deref(), &args.overrides())?;
    let cases = config::resolve_cases(&config)?;

    println!("Build tool: {}", config.build_tool.display());
    for case in &cases {
        let marker = if case.source_dir.is_dir() { "" } else { "  (missing)" };
        println!("{:>4}  {}{}", case.id, case.name(), marker);
    }
    println!("{} case(s)", cases.len());

    Ok(ExitCode::SUCCESS)
}
