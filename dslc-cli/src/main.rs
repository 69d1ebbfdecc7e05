//! dslc — keep a generated source tree in step with the DSL compiler.
//!
//! # Usage
//!
//! ```text
//! dslc init [TARGET...]
//! dslc targets [--json]
//! dslc plan [--staging DIR] [--output DIR] [--exclude GLOB]... [--json]
//! dslc sync [--staging DIR] [--output DIR] [--exclude GLOB]... [--dry-run] [--no-build]
//! ```
//!
//! Every command works relative to `--project-dir` (default: the current
//! directory), where `dslc.yaml` lives.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{init::InitArgs, plan::PlanArgs, sync::SyncArgs, targets::TargetsArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "dslc",
    version,
    about = "Reconcile generated DSL client/server sources with minimal disk churn",
    long_about = None,
)]
struct Cli {
    /// Project directory holding `dslc.yaml`.
    #[arg(long, short = 'C', global = true, default_value = ".")]
    project_dir: PathBuf,

    /// Log more (`-v` info, `-vv` debug). `RUST_LOG` takes precedence.
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a `dslc.yaml` for the given targets.
    Init(InitArgs),

    /// List the known generation targets.
    Targets(TargetsArgs),

    /// Show what a sync would do, without touching the output tree.
    Plan(PlanArgs),

    /// Reconcile the output tree with the staged generation result.
    Sync(SyncArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Init(args) => args.run(&cli.project_dir),
        Commands::Targets(args) => args.run(),
        Commands::Plan(args) => args.run(&cli.project_dir),
        Commands::Sync(args) => args.run(&cli.project_dir),
    }
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
