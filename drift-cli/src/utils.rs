//! # Utility Functions
//!
//! Path validation and configuration loading shared by the commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use drift_core::{ConfigDirs, StatusConfig};

/// Check that `arg` names an existing directory containing a `.git` entry
pub fn validate_repository_path(arg: &str) -> Result<PathBuf> {
  let path = validate_directory(arg)?;
  if !path.join(".git").exists() {
    bail!("Path '{arg}' is not a git repository (missing .git directory).");
  }
  Ok(path)
}

/// Check that `arg` names an existing directory
pub fn validate_directory(arg: &str) -> Result<PathBuf> {
  let path = Path::new(arg);
  if !path.exists() {
    bail!("Path '{arg}' does not exist.");
  }
  if !path.is_dir() {
    bail!("Path '{arg}' is not a directory.");
  }
  Ok(path.to_path_buf())
}

/// Settings from the config file and environment
pub fn load_status_config() -> Result<StatusConfig> {
  let config_dirs = ConfigDirs::new()?;
  StatusConfig::load(&config_dirs).context("Failed to load drift configuration")
}

#[cfg(test)]
mod tests {
  use std::fs;

  use drift_test_utils::GitRepoTestGuard;
  use tempfile::TempDir;

  use super::*;

  fn arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
  }

  #[test]
  fn test_validate_repository_path_accepts_git_repository() {
    let git_repo = GitRepoTestGuard::new();
    let path = validate_repository_path(&arg(git_repo.path())).unwrap();
    assert_eq!(path, git_repo.path());
  }

  #[test]
  fn test_validate_repository_path_messages() {
    let temp_dir = TempDir::new().unwrap();
    let missing = arg(&temp_dir.path().join("missing"));
    let err = validate_repository_path(&missing).unwrap_err();
    assert_eq!(err.to_string(), format!("Path '{missing}' does not exist."));

    let file = temp_dir.path().join("file.txt");
    fs::write(&file, "x").unwrap();
    let err = validate_repository_path(&arg(&file)).unwrap_err();
    assert_eq!(err.to_string(), format!("Path '{}' is not a directory.", arg(&file)));

    let err = validate_repository_path(&arg(temp_dir.path())).unwrap_err();
    assert!(err.to_string().ends_with("is not a git repository (missing .git directory)."));
  }
}
