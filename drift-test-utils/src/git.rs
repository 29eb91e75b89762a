//! Git repository management for testing
//!
//! This module provides utilities for creating temporary git repositories and
//! shaping their history.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use git2::{BranchType, Repository, RepositoryInitOptions, Signature};
use tempfile::TempDir;

/// A test guard that owns a temporary git repository whose unborn HEAD points
/// at `main`. The directory is removed when the guard is dropped.
pub struct GitRepoTestGuard {
  /// The temporary directory containing the git repository
  pub temp_dir: TempDir,
  /// The git repository
  pub repo: Repository,
}

impl GitRepoTestGuard {
  /// Create a new test git repository
  pub fn new() -> Self {
    let temp_dir = TempDir::new().expect("Failed to create temporary directory");
    let repo = init_repository(temp_dir.path()).expect("Failed to initialize git repository");

    assert!(
      temp_dir.path().join(".git").exists(),
      "Git repository was not properly initialized"
    );

    Self { temp_dir, repo }
  }

  /// Get the path to the git repository
  pub fn path(&self) -> &Path {
    self.temp_dir.path()
  }
}

impl Default for GitRepoTestGuard {
  fn default() -> Self {
    Self::new()
  }
}

/// Initialize a non-bare repository at `path` with `main` as the initial
/// branch and a test identity.
pub fn init_repository(path: &Path) -> Result<Repository> {
  let mut opts = RepositoryInitOptions::new();
  opts.initial_head("main");
  let repo = Repository::init_opts(path, &opts)?;

  let mut config = repo.config()?;
  config.set_str("user.name", "Drift Test User")?;
  config.set_str("user.email", "drift-test@example.com")?;
  drop(config);

  Ok(repo)
}

/// Helper function to create a commit in a repository
pub fn create_commit(repo: &Repository, file_name: &str, content: &str, message: &str) -> Result<()> {
  let workdir = repo.workdir().context("Repository has no working directory")?;
  let file_path = workdir.join(file_name);
  if let Some(parent) = file_path.parent() {
    fs::create_dir_all(parent)?;
  }
  fs::write(&file_path, content)?;

  let mut index = repo.index()?;
  index.add_path(Path::new(file_name))?;
  index.write()?;

  let tree_id = index.write_tree()?;
  let tree = repo.find_tree(tree_id)?;

  let signature = Signature::now("Test User", "test@example.com")?;

  match repo.head().and_then(|head| head.peel_to_commit()) {
    Ok(parent) => repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &[&parent])?,
    Err(_) => repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &[])?,
  };

  Ok(())
}

/// Helper function to create a branch in a repository
pub fn create_branch(repo: &Repository, branch_name: &str, start_point: Option<&str>) -> Result<()> {
  let head = if let Some(start) = start_point {
    repo
      .find_branch(start, BranchType::Local)?
      .into_reference()
      .peel_to_commit()?
  } else {
    repo.head()?.peel_to_commit()?
  };

  repo.branch(branch_name, &head, false)?;
  Ok(())
}

/// Helper function to checkout a branch
pub fn checkout_branch(repo: &Repository, branch_name: &str) -> Result<()> {
  let obj = repo
    .revparse_single(&format!("refs/heads/{branch_name}"))?
    .peel_to_commit()?;

  repo.checkout_tree(&obj.into_object(), None)?;
  repo.set_head(&format!("refs/heads/{branch_name}"))?;

  Ok(())
}

/// Merge `branch_name` into the checked-out branch without committing,
/// leaving conflicts in the index and working tree. Returns whether the merge
/// conflicted.
pub fn merge_branch(repo: &Repository, branch_name: &str) -> Result<bool> {
  let branch = repo.find_branch(branch_name, BranchType::Local)?;
  let annotated = repo.reference_to_annotated_commit(branch.get())?;
  repo
    .merge(&[&annotated], None, None)
    .with_context(|| format!("Failed to merge {branch_name}"))?;
  Ok(repo.index()?.has_conflicts())
}

/// Point HEAD directly at the current commit
pub fn detach_head(repo: &Repository) -> Result<()> {
  let commit = repo.head()?.peel_to_commit()?;
  repo.set_head_detached(commit.id())?;
  Ok(())
}
