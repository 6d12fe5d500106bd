mod commands;
mod config;
mod engine;
mod engine_tests;
mod evaluator;
mod executor;
mod report;

use clap::{Parser, Subcommand};
use commands::{LogFormat, RunArgs};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "gigly-harness")]
#[command(about = "Compile every gigly test fixture, run the result and report pass/fail per stage", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Running without a subcommand is the same as `run`
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and execute every selected test case (default)
    Run(RunArgs),

    /// Print the test cases that would run, without running anything
    List(RunArgs),
}

fn init_tracing(args: &RunArgs) {
    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false);

    match args.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::List(args)) => {
            init_tracing(&args);
            commands::list(&args)
        }
        Some(Commands::Run(args)) => {
            init_tracing(&args);
            commands::run(&args).await
        }
        None => {
            init_tracing(&cli.run);
            commands::run(&cli.run).await
        }
    }
}
