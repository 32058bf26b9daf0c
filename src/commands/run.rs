//! `buch-lasttest run` command implementation.

use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::warn;

use buch_lasttest::loadtest::config::LoadTestConfig;
use buch_lasttest::loadtest::engine::LoadTestEngine;
use buch_lasttest::loadtest::report::{write_report, LoadTestReport};
use buch_lasttest::loadtest::summary::render_summary;

use super::{LASTTEST_DIR, PROFILE_FILE};

/// CLI flags that override profile settings.
#[derive(Debug, Default, Clone, Copy)]
pub struct Overrides {
    pub users: Option<u32>,
    pub throughput: Option<f64>,
    pub duration: Option<u64>,
    pub spawn_rate: Option<f64>,
    pub verify_tls: bool,
}

/// Execute the `run` command.
///
/// Loads the profile (explicit path, discovered file or built-in), applies
/// CLI overrides, runs the engine, prints the summary and writes the report.
pub async fn execute_run(
    host: String,
    config_path: Option<PathBuf>,
    overrides: Overrides,
    iterations: Option<u64>,
    no_report: bool,
    no_color: bool,
) -> Result<()> {
    let mut config = load_profile(config_path)?;
    apply_overrides(&mut config, overrides);
    config
        .validate()
        .context("Profile is invalid after applying command line overrides")?;

    let mut engine = LoadTestEngine::new(config, host.clone()).with_no_color(no_color);
    if let Some(n) = iterations {
        engine = engine.with_iterations(n);
    }

    let result = engine.run().await.context("Load test failed")?;

    if no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let summary = render_summary(&result, engine.config(), &host);
    println!("{summary}");

    if !no_report {
        let report = LoadTestReport::from_result(&result, engine.config(), &host);
        let cwd = std::env::current_dir()?;
        match write_report(&report, &cwd) {
            Ok(path) => {
                eprintln!();
                eprintln!("Report written to: {}", path.display());
            },
            // Non-fatal -- the test still completed
            Err(e) => warn!(error = %e, "failed to write report"),
        }
    }

    Ok(())
}

/// Resolve the profile to use.
///
/// An explicit path must exist. Without one, `.lasttest/lasttest.toml` is
/// searched from the working directory upwards; when nothing is found the
/// built-in Buch profile is used.
pub fn load_profile(config_path: Option<PathBuf>) -> Result<LoadTestConfig> {
    let path = match config_path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: {}\nUse `buch-lasttest init` to create one.",
                    path.display()
                );
            }
            Some(path)
        },
        None => discover_config(&std::env::current_dir()?),
    };

    match path {
        Some(path) => {
            eprintln!("Loading profile from: {}", path.display());
            LoadTestConfig::load(&path)
                .with_context(|| format!("Failed to load profile '{}'", path.display()))
        },
        None => {
            eprintln!("No {LASTTEST_DIR}/{PROFILE_FILE} found, using the built-in Buch profile");
            Ok(LoadTestConfig::buch_profile())
        },
    }
}

/// Apply CLI flag overrides to a loaded profile.
fn apply_overrides(config: &mut LoadTestConfig, overrides: Overrides) {
    let settings = &mut config.settings;
    if let Some(users) = overrides.users {
        settings.users = users;
    }
    if let Some(throughput) = overrides.throughput {
        settings.throughput_per_user = throughput;
    }
    if let Some(duration) = overrides.duration {
        settings.duration_secs = duration;
    }
    if let Some(rate) = overrides.spawn_rate {
        settings.spawn_rate = Some(rate);
    }
    if overrides.verify_tls {
        settings.accept_invalid_certs = false;
    } else if settings.accept_invalid_certs {
        warn!("TLS certificate verification is disabled");
    }
}

/// Discover `.lasttest/lasttest.toml` by walking parent directories.
///
/// Starts from `start` and walks up until either the file is found or the
/// filesystem root is reached, like `.git` discovery.
fn discover_config(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(LASTTEST_DIR).join(PROFILE_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}
