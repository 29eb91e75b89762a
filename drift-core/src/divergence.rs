//! Divergence between a local branch and its remote counterpart, and the
//! state of the working tree.

use std::fmt;

use serde::Serialize;

use crate::backend::{BackendResult, RepoHandle};
use crate::resolver::BranchRef;

/// Commits unique to each side of a local/remote pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DivergenceResult {
  pub ahead: usize,
  pub behind: usize,
}

impl DivergenceResult {
  pub fn new(ahead: usize, behind: usize) -> Self {
    Self { ahead, behind }
  }

  pub fn state(&self) -> SyncState {
    match (self.ahead, self.behind) {
      (0, 0) => SyncState::UpToDate,
      (_, 0) => SyncState::Ahead,
      (0, _) => SyncState::Behind,
      _ => SyncState::Diverged,
    }
  }
}

/// Classification of a [`DivergenceResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
  UpToDate,
  Ahead,
  Behind,
  Diverged,
}

impl fmt::Display for SyncState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      SyncState::UpToDate => "up to date",
      SyncState::Ahead => "ahead",
      SyncState::Behind => "behind",
      SyncState::Diverged => "diverged",
    };
    f.write_str(label)
  }
}

/// Count commits reachable from one side but not the other.
pub fn compute<R: RepoHandle>(repo: &R, local: &BranchRef, remote: &BranchRef) -> BackendResult<DivergenceResult> {
  let (ahead, behind) = repo.ahead_behind(&local.commit, &remote.commit)?;
  Ok(DivergenceResult { ahead, behind })
}

/// Pending changes in a working copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkingTreeState {
  pub staged: usize,
  pub unstaged: usize,
  pub untracked: usize,
  pub untracked_paths: Vec<String>,
}

impl WorkingTreeState {
  pub fn is_clean(&self) -> bool {
    self.staged == 0 && self.unstaged == 0 && self.untracked == 0
  }

  pub fn needs_attention(&self) -> bool {
    !self.is_clean()
  }

  /// `S` for staged, `U` for unstaged, `?` for untracked changes, in that
  /// order. Empty when clean.
  pub fn status_code(&self) -> String {
    let mut code = String::new();
    if self.staged > 0 {
      code.push('S');
    }
    if self.unstaged > 0 {
      code.push('U');
    }
    if self.untracked > 0 {
      code.push('?');
    }
    code
  }
}

/// Collect staged, unstaged, and untracked changes.
pub fn inspect_working_tree<R: RepoHandle>(repo: &R) -> BackendResult<WorkingTreeState> {
  let staged = repo.staged_paths()?.len();
  let unstaged = repo.unstaged_paths()?.len();
  let untracked_paths = repo.untracked_paths()?;

  Ok(WorkingTreeState {
    staged,
    unstaged,
    untracked: untracked_paths.len(),
    untracked_paths,
  })
}
