//! `buch-lasttest init` command implementation.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use buch_lasttest::loadtest::config::LoadTestConfig;

use super::{LASTTEST_DIR, PROFILE_FILE};

/// Leading comment block of a generated profile.
const PROFILE_HEADER: &str = "\
# Load profile for the Buch REST API.
#
# Every iteration picks one [[task]] by weight and issues one GET per entry
# of `values`, in order. Each user runs at most `throughput_per_user`
# iterations per second.
#
# Run with: buch-lasttest run https://localhost:3000

";

/// Execute the `init` command.
///
/// Writes the built-in profile to `.lasttest/lasttest.toml` in the working
/// directory.
pub fn execute_init(force: bool) -> Result<()> {
    let path = write_profile(&std::env::current_dir()?, force)?;
    eprintln!("Created {}", path.display());
    eprintln!("Edit the file to customize your load profile.");
    Ok(())
}

/// Write the built-in profile below `base_dir`, refusing to overwrite an
/// existing file unless `force` is set.
fn write_profile(base_dir: &Path, force: bool) -> Result<PathBuf> {
    let config_dir = base_dir.join(LASTTEST_DIR);
    let config_path = config_dir.join(PROFILE_FILE);

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}\n\
             Use `--force` to overwrite.",
            config_path.display()
        );
    }

    let content = format!(
        "{PROFILE_HEADER}{}",
        LoadTestConfig::buch_profile().to_toml()?
    );

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;
    std::fs::write(&config_path, content)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    Ok(config_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_profile_round_trips_builtin() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_profile(tmp.path(), false).unwrap();
        assert_eq!(path, tmp.path().join(".lasttest").join("lasttest.toml"));

        let loaded = LoadTestConfig::load(&path).unwrap();
        assert_eq!(loaded, LoadTestConfig::buch_profile());
    }

    #[test]
    fn test_write_profile_refuses_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        write_profile(tmp.path(), false).unwrap();
        let err = write_profile(tmp.path(), false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_write_profile_force_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_profile(tmp.path(), false).unwrap();
        std::fs::write(&path, "garbage").unwrap();

        write_profile(tmp.path(), true).unwrap();
        assert!(LoadTestConfig::load(&path).is_ok());
    }
}
