//! Error types for backend access and repository status evaluation.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures reported by a version-control backend primitive.
#[derive(Debug, Error)]
pub enum BackendError {
  /// The path does not contain a repository.
  #[error("'{}' is not a git repository", path.display())]
  NotARepository { path: PathBuf },
  /// The path is a repository without a working tree.
  #[error("'{}' is a bare repository", path.display())]
  Bare { path: PathBuf },
  /// A network operation ran past its deadline.
  #[error("{operation} timed out after {}s", timeout.as_secs())]
  TimedOut {
    operation: &'static str,
    timeout: Duration,
  },
  /// The backend refused the operation.
  #[error("{0}")]
  Rejected(String),
  /// Wrapper for lower-level errors originating from `git2`.
  #[error(transparent)]
  Git(#[from] git2::Error),
}

/// Fatal conditions that stop the evaluation of a single repository.
///
/// Soft conditions (pull failures, unreadable fetch cache, unknown commit
/// timestamps) are never represented here; they travel as data on the
/// resulting record or are swallowed where they occur.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatusError {
  #[error(
    "Could not open the repository at '{}'. Please check that the directory exists and is a valid git repository.",
    path.display()
  )]
  NotARepository { path: PathBuf },

  #[error("Repository at '{}' is bare.", path.display())]
  BareRepository { path: PathBuf },

  #[error("Detached HEAD state. Please checkout a branch.")]
  DetachedHead,

  #[error("Local branch {branch} not found.")]
  LocalBranchNotFound { branch: String },

  #[error("{}", describe_missing_remote(.remote, .available))]
  RemoteNotFound { remote: String, available: Vec<String> },

  #[error("Remote branch {expected} not found.")]
  NoRemoteBranch { expected: String },

  #[error("Failed to fetch from remote '{remote}': {reason}")]
  FetchFailed { remote: String, reason: String },

  #[error("Git operation failed: {0}")]
  Backend(String),
}

fn describe_missing_remote(remote: &str, available: &[String]) -> String {
  if available.is_empty() {
    format!(
      "No git remotes found in this repository. Please add a remote named '{remote}' or specify an existing one."
    )
  } else {
    format!(
      "Remote '{remote}' not found. Available remotes: {}",
      available.join(", ")
    )
  }
}

impl From<BackendError> for StatusError {
  fn from(err: BackendError) -> Self {
    match err {
      BackendError::NotARepository { path } => StatusError::NotARepository { path },
      BackendError::Bare { path } => StatusError::BareRepository { path },
      other => StatusError::Backend(other.to_string()),
    }
  }
}
