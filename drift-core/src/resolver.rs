//! Branch resolution.
//!
//! Decides which local branch represents a working copy and which
//! remote-tracking reference it is compared against. Both choices walk an
//! ordered list of candidates and take the first one that resolves.

use serde::Serialize;
use tracing::{debug, trace};

use crate::backend::{CommitId, RepoHandle, local_refname, remote_refname};
use crate::error::StatusError;

/// A branch resolved to the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchRef {
  pub name: String,
  /// Remote the branch belongs to; `None` for local branches.
  pub remote: Option<String>,
  pub commit: CommitId,
}

impl BranchRef {
  pub fn local(name: impl Into<String>, commit: CommitId) -> Self {
    Self {
      name: name.into(),
      remote: None,
      commit,
    }
  }

  pub fn remote_tracking(remote: impl Into<String>, name: impl Into<String>, commit: CommitId) -> Self {
    Self {
      name: name.into(),
      remote: Some(remote.into()),
      commit,
    }
  }

  /// `main` for local branches, `origin/main` for remote-tracking ones.
  pub fn display_name(&self) -> String {
    match &self.remote {
      Some(remote) => format!("{remote}/{}", self.name),
      None => self.name.clone(),
    }
  }

  /// Full reference name.
  pub fn refname(&self) -> String {
    match &self.remote {
      Some(remote) => remote_refname(remote, &self.name),
      None => local_refname(&self.name),
    }
  }
}

/// A way of picking the local branch to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalCandidate {
  /// A branch with this exact name, if it exists.
  Named(&'static str),
  /// Whatever branch HEAD points at.
  CurrentCheckout,
}

/// Conventional trunk names win over the current checkout.
pub const LOCAL_BRANCH_CANDIDATES: [LocalCandidate; 3] = [
  LocalCandidate::Named("main"),
  LocalCandidate::Named("master"),
  LocalCandidate::CurrentCheckout,
];

/// Pick the local branch to evaluate.
///
/// Fails with [`StatusError::DetachedHead`] when no candidate names a branch
/// and with [`StatusError::LocalBranchNotFound`] when the chosen branch has no
/// commit yet.
pub fn resolve_local_branch<R: RepoHandle>(repo: &R) -> Result<BranchRef, StatusError> {
  let branches = repo.local_branches()?;

  let mut chosen = None;
  for candidate in LOCAL_BRANCH_CANDIDATES {
    let name = match candidate {
      LocalCandidate::Named(name) => branches.iter().any(|branch| branch == name).then(|| name.to_string()),
      LocalCandidate::CurrentCheckout => repo.current_branch()?,
    };
    if let Some(name) = name {
      trace!("Local branch candidate {candidate:?} matched '{name}'");
      chosen = Some(name);
      break;
    }
  }

  let name = chosen.ok_or(StatusError::DetachedHead)?;
  let commit = repo
    .resolve_ref(&local_refname(&name))?
    .ok_or_else(|| StatusError::LocalBranchNotFound { branch: name.clone() })?;

  debug!("Evaluating local branch '{name}' at {}", commit.short());
  Ok(BranchRef::local(name, commit))
}

/// Remote branch names to try for `local`, most specific first.
pub fn remote_candidates(local: &str) -> Vec<String> {
  let mut candidates = vec![local.to_string()];
  match local {
    "main" => candidates.push("master".to_string()),
    "master" => candidates.push("main".to_string()),
    _ => {}
  }
  candidates
}

/// Pick the remote-tracking reference `local` is compared against.
///
/// On failure the error names `<remote>/<local>`, the reference that was
/// expected in the first place.
pub fn resolve_remote_ref<R: RepoHandle>(repo: &R, local: &BranchRef, remote: &str) -> Result<BranchRef, StatusError> {
  for candidate in remote_candidates(&local.name) {
    if let Some(commit) = repo.resolve_ref(&remote_refname(remote, &candidate))? {
      debug!("Comparing against {remote}/{candidate} at {}", commit.short());
      return Ok(BranchRef::remote_tracking(remote, candidate, commit));
    }
    trace!("No remote-tracking ref {remote}/{candidate}");
  }

  Err(StatusError::NoRemoteBranch {
    expected: format!("{remote}/{}", local.name),
  })
}

/// Check that `remote` is configured, listing the alternatives if not.
pub fn ensure_remote<R: RepoHandle>(repo: &R, remote: &str) -> Result<(), StatusError> {
  let available = repo.remotes()?;
  if available.iter().any(|name| name == remote) {
    return Ok(());
  }

  Err(StatusError::RemoteNotFound {
    remote: remote.to_string(),
    available,
  })
}
