//! buch-lasttest: load generator for the Buch REST API
//!
//! Drives a fixed population of virtual users against `GET /rest` lookups
//! and searches, each user capped at a constant iteration rate.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

/// Constant-throughput load generator for the Buch REST API
#[derive(Parser)]
#[command(name = "buch-lasttest")]
#[command(about = "Load test the Buch REST API", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: commands::LasttestCommand,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    cli.command.execute()
}

/// Initialize logging to stderr so stdout stays reserved for the summary.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
