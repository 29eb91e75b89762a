//! libgit2-backed implementation of the backend primitives.

use std::ffi::c_int;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use git2::build::CheckoutBuilder;
use git2::{BranchType, Cred, ErrorCode, FetchOptions, Oid, RemoteCallbacks, Repository, Status, StatusOptions};
use tracing::{debug, trace};

use super::{Backend, BackendResult, CommitId, PullSummary, RepoHandle, local_refname, remote_refname};
use crate::error::BackendError;

/// libgit2 asks again after every rejected credential; stop after a few.
const MAX_CREDENTIAL_ATTEMPTS: u8 = 3;

/// Opens working copies with libgit2.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Backend;

impl Git2Backend {
  /// Bound connecting to a remote and every socket read or write for all
  /// libgit2 transports in this process. Progress callbacks only run while
  /// data arrives, so this is what stops a silent server from hanging a fetch.
  ///
  /// # Safety
  ///
  /// Writes libgit2 globals without synchronization. Call before any other
  /// thread is spawned.
  pub unsafe fn set_network_timeout(timeout: Duration) -> BackendResult<()> {
    let millis = c_int::try_from(timeout.as_millis()).unwrap_or(c_int::MAX);
    debug!(millis, "Setting libgit2 server timeouts");
    // SAFETY: the caller guarantees no other thread is running yet.
    unsafe {
      git2::opts::set_server_connect_timeout_in_milliseconds(millis)?;
      git2::opts::set_server_timeout_in_milliseconds(millis)?;
    }
    Ok(())
  }
}

impl Backend for Git2Backend {
  type Repo = Git2Repo;

  fn open(&self, path: &Path) -> BackendResult<Git2Repo> {
    let repo = Repository::open(path).map_err(|err| match err.code() {
      ErrorCode::NotFound => BackendError::NotARepository {
        path: path.to_path_buf(),
      },
      _ => BackendError::Git(err),
    })?;

    if repo.is_bare() {
      return Err(BackendError::Bare {
        path: path.to_path_buf(),
      });
    }

    let workdir = repo
      .workdir()
      .map(Path::to_path_buf)
      .ok_or_else(|| BackendError::Bare {
        path: path.to_path_buf(),
      })?;
    let git_dir = repo.path().to_path_buf();

    Ok(Git2Repo { repo, workdir, git_dir })
  }
}

/// An opened, non-bare git working copy.
pub struct Git2Repo {
  repo: Repository,
  workdir: PathBuf,
  git_dir: PathBuf,
}

impl Git2Repo {
  fn paths_with_status(&self, mask: Status) -> BackendResult<Vec<String>> {
    let mut options = StatusOptions::new();
    options
      .include_untracked(true)
      .recurse_untracked_dirs(true)
      .include_ignored(false)
      .renames_head_to_index(true)
      .exclude_submodules(true);

    let statuses = self.repo.statuses(Some(&mut options))?;
    Ok(
      statuses
        .iter()
        .filter(|entry| entry.status().intersects(mask))
        .filter_map(|entry| entry.path().map(str::to_string))
        .collect(),
    )
  }
}

fn staged_mask() -> Status {
  Status::INDEX_NEW | Status::INDEX_MODIFIED | Status::INDEX_DELETED | Status::INDEX_RENAMED | Status::INDEX_TYPECHANGE
}

/// Unmerged entries carry only the `CONFLICTED` bit; the conflict markers in
/// the working tree differ from every index stage.
fn unstaged_mask() -> Status {
  Status::WT_MODIFIED | Status::WT_DELETED | Status::WT_RENAMED | Status::WT_TYPECHANGE | Status::CONFLICTED
}

fn parse_oid(commit: &CommitId) -> BackendResult<Oid> {
  Ok(Oid::from_str(commit.as_str())?)
}

/// Callbacks shared by fetch and pull: credentials from the ssh agent or the
/// configured credential helper, and a transfer deadline.
fn remote_callbacks<'a>(deadline: Instant, config: Option<git2::Config>) -> RemoteCallbacks<'a> {
  let mut callbacks = RemoteCallbacks::new();
  let mut attempts = 0u8;

  callbacks.credentials(move |url, username_from_url, allowed| {
    attempts += 1;
    if attempts > MAX_CREDENTIAL_ATTEMPTS {
      return Err(git2::Error::from_str("no usable credentials for remote"));
    }
    if allowed.is_ssh_key()
      && let Some(user) = username_from_url
    {
      return Cred::ssh_key_from_agent(user);
    }
    if allowed.is_user_pass_plaintext()
      && let Some(ref cfg) = config
      && let Ok(cred) = Cred::credential_helper(cfg, url, username_from_url)
    {
      return Ok(cred);
    }
    Cred::default()
  });
  callbacks.transfer_progress(move |_| Instant::now() < deadline);
  callbacks.sideband_progress(move |_| Instant::now() < deadline);

  callbacks
}

impl RepoHandle for Git2Repo {
  fn workdir(&self) -> &Path {
    &self.workdir
  }

  fn metadata_dir(&self) -> &Path {
    &self.git_dir
  }

  fn local_branches(&self) -> BackendResult<Vec<String>> {
    let mut names = Vec::new();
    for branch_result in self.repo.branches(Some(BranchType::Local))? {
      let (branch, _) = branch_result?;
      if let Some(name) = branch.name()? {
        names.push(name.to_string());
      }
    }
    Ok(names)
  }

  fn current_branch(&self) -> BackendResult<Option<String>> {
    match self.repo.head() {
      Ok(head) if head.is_branch() => Ok(head.shorthand().map(str::to_string)),
      Ok(_) => Ok(None),
      Err(err) if err.code() == ErrorCode::UnbornBranch => {
        let head = self.repo.find_reference("HEAD")?;
        Ok(
          head
            .symbolic_target()
            .and_then(|target| target.strip_prefix("refs/heads/"))
            .map(str::to_string),
        )
      }
      Err(err) => Err(err.into()),
    }
  }

  fn resolve_ref(&self, refname: &str) -> BackendResult<Option<CommitId>> {
    match self.repo.find_reference(refname) {
      Ok(reference) => Ok(Some(reference.peel_to_commit()?.id().into())),
      Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
      Err(err) => Err(err.into()),
    }
  }

  fn count_unique_commits(&self, from: &CommitId, hide: &CommitId) -> BackendResult<usize> {
    let mut walk = self.repo.revwalk()?;
    walk.push(parse_oid(from)?)?;
    walk.hide(parse_oid(hide)?)?;

    let mut count = 0;
    for oid in walk {
      oid?;
      count += 1;
    }
    Ok(count)
  }

  fn ahead_behind(&self, local: &CommitId, upstream: &CommitId) -> BackendResult<(usize, usize)> {
    Ok(self.repo.graph_ahead_behind(parse_oid(local)?, parse_oid(upstream)?)?)
  }

  fn remotes(&self) -> BackendResult<Vec<String>> {
    Ok(self.repo.remotes()?.iter().flatten().map(str::to_string).collect())
  }

  fn fetch(&self, remote: &str, timeout: Duration) -> BackendResult<()> {
    let deadline = Instant::now() + timeout;
    let mut handle = self.repo.find_remote(remote)?;

    let mut options = FetchOptions::new();
    options.remote_callbacks(remote_callbacks(deadline, self.repo.config().ok()));

    debug!(remote, workdir = %self.workdir.display(), "Fetching remote");
    handle
      .fetch(&[] as &[&str], Some(&mut options), None)
      .map_err(|err| {
        if Instant::now() >= deadline {
          BackendError::TimedOut {
            operation: "fetch",
            timeout,
          }
        } else {
          BackendError::Git(err)
        }
      })
  }

  fn pull(&self, remote: &str, branch: &str, upstream: &str, timeout: Duration) -> BackendResult<PullSummary> {
    self.fetch(remote, timeout).map_err(|err| match err {
      BackendError::TimedOut { timeout, .. } => BackendError::TimedOut {
        operation: "pull",
        timeout,
      },
      other => other,
    })?;

    let target = self
      .repo
      .find_reference(&remote_refname(remote, upstream))?
      .peel_to_commit()?;
    let branch_ref = local_refname(branch);
    let mut local = self.repo.find_reference(&branch_ref)?;
    let current = local.peel_to_commit()?;

    if current.id() == target.id() || self.repo.graph_descendant_of(current.id(), target.id())? {
      return Ok(PullSummary::UpToDate);
    }

    if !self.repo.graph_descendant_of(target.id(), current.id())? {
      return Err(BackendError::Rejected(format!(
        "Cannot fast-forward '{branch}': it has diverged from '{remote}/{upstream}'"
      )));
    }

    let checked_out = self
      .repo
      .head()
      .is_ok_and(|head| head.name() == Some(branch_ref.as_str()));
    if checked_out {
      // Refuses to overwrite local modifications that the update would touch.
      self
        .repo
        .checkout_tree(target.as_object(), Some(CheckoutBuilder::new().safe()))?;
    }

    local.set_target(
      target.id(),
      &format!("drift: fast-forward {branch} to {remote}/{upstream}"),
    )?;
    trace!(branch, from = %current.id(), to = %target.id(), "Fast-forwarded branch");

    Ok(PullSummary::FastForwarded {
      from: current.id().into(),
      to: target.id().into(),
    })
  }

  fn staged_paths(&self) -> BackendResult<Vec<String>> {
    self.paths_with_status(staged_mask())
  }

  fn unstaged_paths(&self) -> BackendResult<Vec<String>> {
    self.paths_with_status(unstaged_mask())
  }

  fn untracked_paths(&self) -> BackendResult<Vec<String>> {
    self.paths_with_status(Status::WT_NEW)
  }

  fn commit_time(&self, commit: &CommitId) -> BackendResult<DateTime<Utc>> {
    let seconds = self.repo.find_commit(parse_oid(commit)?)?.time().seconds();
    DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
      BackendError::Rejected(format!("Commit {} has an out-of-range timestamp", commit.short()))
    })
  }
}
