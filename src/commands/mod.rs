//! `buch-lasttest` CLI subcommands.
//!
//! Provides `run` (execute a load test), `init` (write the built-in profile)
//! and `plan` (show what a profile will do without sending traffic).

mod init;
mod plan;
mod run;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

/// Directory holding the profile and generated reports.
pub(crate) const LASTTEST_DIR: &str = ".lasttest";

/// Profile file name inside [`LASTTEST_DIR`].
pub(crate) const PROFILE_FILE: &str = "lasttest.toml";

/// Load test commands for the Buch REST API.
#[derive(Debug, Subcommand)]
pub enum LasttestCommand {
    /// Run a load test against a Buch server
    ///
    /// Uses the profile in .lasttest/lasttest.toml (or a custom config path),
    /// falling back to the built-in Buch profile. Reports results to the
    /// terminal and writes a JSON report to .lasttest/reports/.
    Run {
        /// Target host, e.g. https://localhost:3000
        host: String,

        /// Path to profile file (default: auto-discover .lasttest/lasttest.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of virtual users (overrides profile)
        #[arg(long)]
        users: Option<u32>,

        /// Iterations per second per user (overrides profile)
        #[arg(long)]
        throughput: Option<f64>,

        /// Test duration in seconds (overrides profile)
        #[arg(long)]
        duration: Option<u64>,

        /// Users started per second (overrides profile)
        #[arg(long)]
        spawn_rate: Option<f64>,

        /// Stop after this many iterations across all users
        #[arg(long)]
        iterations: Option<u64>,

        /// Verify TLS certificates of the target
        #[arg(long)]
        verify_tls: bool,

        /// Disable JSON report output
        #[arg(long)]
        no_report: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Write the built-in Buch profile to .lasttest/lasttest.toml
    Init {
        /// Overwrite existing profile
        #[arg(long)]
        force: bool,
    },

    /// Print tasks, weights and expected rates without sending traffic
    Plan {
        /// Path to profile file (default: auto-discover .lasttest/lasttest.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl LasttestCommand {
    /// Execute the selected subcommand.
    pub fn execute(self) -> Result<()> {
        match self {
            LasttestCommand::Run {
                host,
                config,
                users,
                throughput,
                duration,
                spawn_rate,
                iterations,
                verify_tls,
                no_report,
                no_color,
            } => {
                let overrides = run::Overrides {
                    users,
                    throughput,
                    duration,
                    spawn_rate,
                    verify_tls,
                };
                let runtime = tokio::runtime::Runtime::new()?;
                runtime.block_on(run::execute_run(
                    host, config, overrides, iterations, no_report, no_color,
                ))
            },
            LasttestCommand::Init { force } => init::execute_init(force),
            LasttestCommand::Plan { config } => plan::execute_plan(config),
        }
    }
}
