//! Version-control backend abstraction.
//!
//! The status engine only needs a narrow set of primitives: open a working
//! copy, list and resolve refs, count commits between two tips, fetch, pull,
//! and inspect the index and working tree. [`Backend`] opens repositories and
//! [`RepoHandle`] exposes those primitives for one opened working copy.

mod git;
#[cfg(any(test, feature = "test-utils"))]
mod memory;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use self::git::{Git2Backend, Git2Repo};
#[cfg(any(test, feature = "test-utils"))]
pub use self::memory::{MemoryBackend, MemoryRepo};
use crate::error::BackendError;

/// Result alias for backend primitives.
pub type BackendResult<T> = Result<T, BackendError>;

/// Identity of a commit, as the backend spells it (a hex object id for git).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Abbreviated form used in human-readable output.
  pub fn short(&self) -> &str {
    let end = self.0.char_indices().nth(7).map_or(self.0.len(), |(idx, _)| idx);
    &self.0[..end]
  }
}

impl fmt::Debug for CommitId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("CommitId").field(&self.as_str()).finish()
  }
}

impl fmt::Display for CommitId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl From<git2::Oid> for CommitId {
  fn from(oid: git2::Oid) -> Self {
    Self(oid.to_string())
  }
}

/// What a successful pull did to the local branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PullSummary {
  /// The local branch already contained the remote tip.
  UpToDate,
  /// The local branch was moved forward to the remote tip.
  FastForwarded { from: CommitId, to: CommitId },
}

impl fmt::Display for PullSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PullSummary::UpToDate => f.write_str("Already up to date."),
      PullSummary::FastForwarded { from, to } => write!(f, "Fast-forward {}..{}", from.short(), to.short()),
    }
  }
}

/// Opens working copies by path.
pub trait Backend: Send + Sync {
  type Repo: RepoHandle;

  /// Open the working copy rooted at `path`.
  ///
  /// Must fail with [`BackendError::NotARepository`] when `path` is not a
  /// repository and [`BackendError::Bare`] when it has no working tree.
  fn open(&self, path: &Path) -> BackendResult<Self::Repo>;
}

/// Primitives available on an opened, non-bare working copy.
pub trait RepoHandle {
  /// Root of the working tree.
  fn workdir(&self) -> &Path;

  /// Private metadata area of the repository (the `.git` directory).
  fn metadata_dir(&self) -> &Path;

  /// Names of all local branches.
  fn local_branches(&self) -> BackendResult<Vec<String>>;

  /// Name of the checked-out branch, or `None` when HEAD is detached. An
  /// unborn branch is still reported by name.
  fn current_branch(&self) -> BackendResult<Option<String>>;

  /// Resolve a full reference name (`refs/heads/main`) to a commit.
  fn resolve_ref(&self, refname: &str) -> BackendResult<Option<CommitId>>;

  /// Number of commits reachable from `from` but not from `hide`.
  fn count_unique_commits(&self, from: &CommitId, hide: &CommitId) -> BackendResult<usize>;

  /// Commits unique to `local` and to `upstream`, in that order.
  fn ahead_behind(&self, local: &CommitId, upstream: &CommitId) -> BackendResult<(usize, usize)> {
    Ok((
      self.count_unique_commits(local, upstream)?,
      self.count_unique_commits(upstream, local)?,
    ))
  }

  /// Names of the configured remotes.
  fn remotes(&self) -> BackendResult<Vec<String>>;

  /// Update the remote-tracking refs of `remote`.
  fn fetch(&self, remote: &str, timeout: Duration) -> BackendResult<()>;

  /// Fetch `remote` and fast-forward local `branch` to
  /// `<remote>/<upstream>`.
  fn pull(&self, remote: &str, branch: &str, upstream: &str, timeout: Duration) -> BackendResult<PullSummary>;

  /// Paths whose index entry differs from HEAD.
  fn staged_paths(&self) -> BackendResult<Vec<String>>;

  /// Tracked paths whose working tree content differs from the index.
  fn unstaged_paths(&self) -> BackendResult<Vec<String>>;

  /// Paths present in the working tree but not tracked.
  fn untracked_paths(&self) -> BackendResult<Vec<String>>;

  /// Commit timestamp of `commit`.
  fn commit_time(&self, commit: &CommitId) -> BackendResult<DateTime<Utc>>;
}

/// Full reference name of a local branch.
pub fn local_refname(branch: &str) -> String {
  format!("refs/heads/{branch}")
}

/// Full reference name of a remote-tracking branch.
pub fn remote_refname(remote: &str, branch: &str) -> String {
  format!("refs/remotes/{remote}/{branch}")
}
