//! jitbroker entry point.
//!
//! This binary is the composition root. It parses the command line,
//! initialises logging, wires the compilation core to the telemetry adapters,
//! a scripted backend, and an in-memory code cache, and runs the requests of a
//! manifest on a bounded pool of blocking workers.
//!
//! The core never exits the process. When a task returns a fatal outcome this
//! binary prints its report and then exits with the fatal exit code.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use telemetry::{init_logging, LogFormat};

mod broker;
mod code_cache;
mod manifest;
mod scripted;

#[derive(Parser)]
#[command(name = "jitbroker")]
#[command(version, about = "Runs JIT compilation requests through the compilation task pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every request in a manifest and print one summary line each
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// JSON manifest of units and scripted backend attempts
    #[arg(long)]
    manifest: PathBuf,

    /// JSON compiler options snapshot
    #[arg(long)]
    options: Option<PathBuf>,

    /// Maximum number of compilations in flight
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Write completion and failure events to this file as JSON lines
    #[arg(long)]
    events: Option<PathBuf>,

    /// Directory for diagnostic dumps of contexts without their own location
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// Log output format: pretty or json
    #[arg(long, default_value = "pretty")]
    log_format: LogFormat,

    /// Suppress console status lines
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            init_logging(args.log_format);
            let report = broker::run(broker::RunConfig {
                manifest: args.manifest,
                options: args.options,
                workers: args.workers,
                events: args.events,
                dump_dir: args.dump_dir,
                quiet: args.quiet,
            })
            .await?;
            broker::print_report(&report)?;

            let code = broker::exit_code(&report);
            if code != 0 {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}
