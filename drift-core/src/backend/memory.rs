//! In-memory repository model implementing the backend primitives.
//!
//! Repositories are described with a small builder: commits with explicit
//! parents and timestamps, refs pointing at them, the checked-out branch, and
//! working-tree paths. Fetch and pull can be scripted to succeed, fail, time
//! out, or hang past their timeout, and every network call is counted so tests
//! can assert how often the engine went to the network.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{Backend, BackendResult, CommitId, PullSummary, RepoHandle, local_refname, remote_refname};
use crate::error::BackendError;

/// Backend serving [`MemoryRepo`]s registered by working-tree path.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
  repos: HashMap<PathBuf, MemoryRepo>,
}

impl MemoryBackend {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a repository under its working-tree path.
  pub fn with_repo(mut self, repo: MemoryRepo) -> Self {
    self.repos.insert(repo.workdir.clone(), repo);
    self
  }
}

impl Backend for MemoryBackend {
  type Repo = MemoryRepo;

  fn open(&self, path: &Path) -> BackendResult<MemoryRepo> {
    let repo = self.repos.get(path).ok_or_else(|| BackendError::NotARepository {
      path: path.to_path_buf(),
    })?;

    if repo.state().bare {
      return Err(BackendError::Bare {
        path: path.to_path_buf(),
      });
    }

    Ok(repo.clone())
  }
}

#[derive(Debug, Clone)]
enum Head {
  Branch(String),
  Detached(CommitId),
}

#[derive(Debug, Clone)]
struct MemoryCommit {
  parents: Vec<CommitId>,
  time: Option<i64>,
}

#[derive(Debug, Clone, Default)]
enum NetworkBehavior {
  #[default]
  Succeed,
  Fail(String),
  Stall(Duration),
  Hang(Duration),
}

#[derive(Debug)]
struct RepoModel {
  bare: bool,
  commits: HashMap<CommitId, MemoryCommit>,
  refs: BTreeMap<String, CommitId>,
  head: Head,
  remotes: Vec<String>,
  upstream_refs: BTreeMap<String, CommitId>,
  staged: Vec<String>,
  unstaged: Vec<String>,
  untracked: Vec<String>,
  fetch_behavior: NetworkBehavior,
  pull_behavior: NetworkBehavior,
  fetch_count: usize,
  pull_count: usize,
}

/// A repository held entirely in memory. Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryRepo {
  workdir: PathBuf,
  metadata_dir: PathBuf,
  model: Arc<Mutex<RepoModel>>,
}

impl MemoryRepo {
  /// An empty repository at `workdir` with `main` checked out (unborn) and a
  /// single remote named `origin`. Metadata lives in `<workdir>/.git`.
  pub fn new(workdir: impl Into<PathBuf>) -> Self {
    let workdir = workdir.into();
    let metadata_dir = workdir.join(".git");
    Self {
      workdir,
      metadata_dir,
      model: Arc::new(Mutex::new(RepoModel {
        bare: false,
        commits: HashMap::new(),
        refs: BTreeMap::new(),
        head: Head::Branch("main".to_string()),
        remotes: vec!["origin".to_string()],
        upstream_refs: BTreeMap::new(),
        staged: Vec::new(),
        unstaged: Vec::new(),
        untracked: Vec::new(),
        fetch_behavior: NetworkBehavior::Succeed,
        pull_behavior: NetworkBehavior::Succeed,
        fetch_count: 0,
        pull_count: 0,
      })),
    }
  }

  fn state(&self) -> MutexGuard<'_, RepoModel> {
    self.model.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Store the fetch cache somewhere other than `<workdir>/.git`.
  pub fn with_metadata_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.metadata_dir = dir.into();
    self
  }

  pub fn bare(self) -> Self {
    self.state().bare = true;
    self
  }

  /// Add a commit with the given parents and Unix timestamp.
  pub fn with_commit(self, id: &str, parents: &[&str], time: i64) -> Self {
    self.insert_commit(id, parents, Some(time));
    self
  }

  /// Add a commit whose timestamp cannot be read.
  pub fn with_undated_commit(self, id: &str, parents: &[&str]) -> Self {
    self.insert_commit(id, parents, None);
    self
  }

  /// Add `len` commits `<prefix>1..=<prefix>len` on top of `parent`, one
  /// second apart starting at `start_time`.
  pub fn with_chain(self, prefix: &str, parent: Option<&str>, len: usize, start_time: i64) -> Self {
    let mut previous = parent.map(str::to_string);
    for step in 1..=len {
      let id = format!("{prefix}{step}");
      let parents: Vec<&str> = previous.as_deref().into_iter().collect();
      self.insert_commit(&id, &parents, Some(start_time + step as i64));
      previous = Some(id);
    }
    self
  }

  fn insert_commit(&self, id: &str, parents: &[&str], time: Option<i64>) {
    self.state().commits.insert(
      CommitId::new(id),
      MemoryCommit {
        parents: parents.iter().map(|parent| CommitId::new(*parent)).collect(),
        time,
      },
    );
  }

  /// Point local branch `name` at `commit`.
  pub fn with_branch(self, name: &str, commit: &str) -> Self {
    self.state().refs.insert(local_refname(name), CommitId::new(commit));
    self
  }

  /// Point remote-tracking branch `<remote>/<name>` at `commit`.
  pub fn with_remote_branch(self, remote: &str, name: &str, commit: &str) -> Self {
    self
      .state()
      .refs
      .insert(remote_refname(remote, name), CommitId::new(commit));
    self
  }

  /// Remote-tracking ref that only appears once a fetch has run, as if the
  /// branch had moved on the server.
  pub fn with_upstream_update(self, remote: &str, name: &str, commit: &str) -> Self {
    self
      .state()
      .upstream_refs
      .insert(remote_refname(remote, name), CommitId::new(commit));
    self
  }

  pub fn checkout(self, branch: &str) -> Self {
    self.state().head = Head::Branch(branch.to_string());
    self
  }

  pub fn detach_at(self, commit: &str) -> Self {
    self.state().head = Head::Detached(CommitId::new(commit));
    self
  }

  pub fn with_remotes(self, remotes: &[&str]) -> Self {
    self.state().remotes = remotes.iter().map(|remote| remote.to_string()).collect();
    self
  }

  pub fn with_staged(self, paths: &[&str]) -> Self {
    self.state().staged = paths.iter().map(|path| path.to_string()).collect();
    self
  }

  pub fn with_unstaged(self, paths: &[&str]) -> Self {
    self.state().unstaged = paths.iter().map(|path| path.to_string()).collect();
    self
  }

  pub fn with_untracked(self, paths: &[&str]) -> Self {
    self.state().untracked = paths.iter().map(|path| path.to_string()).collect();
    self
  }

  pub fn failing_fetch(self, reason: &str) -> Self {
    self.state().fetch_behavior = NetworkBehavior::Fail(reason.to_string());
    self
  }

  /// Fetches take `delay`; a fetch whose timeout is shorter times out.
  pub fn stalling_fetch(self, delay: Duration) -> Self {
    self.state().fetch_behavior = NetworkBehavior::Stall(delay);
    self
  }

  /// Fetches take `delay` and ignore their timeout, like a transport that
  /// never notices a silent server.
  pub fn hanging_fetch(self, delay: Duration) -> Self {
    self.state().fetch_behavior = NetworkBehavior::Hang(delay);
    self
  }

  pub fn failing_pull(self, reason: &str) -> Self {
    self.state().pull_behavior = NetworkBehavior::Fail(reason.to_string());
    self
  }

  pub fn fetch_count(&self) -> usize {
    self.state().fetch_count
  }

  pub fn pull_count(&self) -> usize {
    self.state().pull_count
  }

  /// Current target of a full reference name.
  pub fn ref_target(&self, refname: &str) -> Option<CommitId> {
    self.state().refs.get(refname).cloned()
  }
}

impl RepoModel {
  fn reachable(&self, tip: &CommitId) -> HashSet<CommitId> {
    let mut seen = HashSet::new();
    let mut pending = vec![tip.clone()];
    while let Some(id) = pending.pop() {
      if !seen.insert(id.clone()) {
        continue;
      }
      if let Some(commit) = self.commits.get(&id) {
        pending.extend(commit.parents.iter().cloned());
      }
    }
    seen
  }

  fn run_network(behavior: &NetworkBehavior, operation: &'static str, timeout: Duration) -> BackendResult<()> {
    match behavior {
      NetworkBehavior::Succeed => Ok(()),
      NetworkBehavior::Fail(reason) => Err(BackendError::Rejected(reason.clone())),
      NetworkBehavior::Stall(delay) if *delay > timeout => {
        thread::sleep(timeout);
        Err(BackendError::TimedOut { operation, timeout })
      }
      NetworkBehavior::Stall(delay) | NetworkBehavior::Hang(delay) => {
        thread::sleep(*delay);
        Ok(())
      }
    }
  }

  fn apply_upstream_updates(&mut self) {
    let updates: Vec<(String, CommitId)> = self
      .upstream_refs
      .iter()
      .map(|(name, id)| (name.clone(), id.clone()))
      .collect();
    self.refs.extend(updates);
  }
}

impl RepoHandle for MemoryRepo {
  fn workdir(&self) -> &Path {
    &self.workdir
  }

  fn metadata_dir(&self) -> &Path {
    &self.metadata_dir
  }

  fn local_branches(&self) -> BackendResult<Vec<String>> {
    Ok(
      self
        .state()
        .refs
        .keys()
        .filter_map(|name| name.strip_prefix("refs/heads/"))
        .map(str::to_string)
        .collect(),
    )
  }

  fn current_branch(&self) -> BackendResult<Option<String>> {
    Ok(match &self.state().head {
      Head::Branch(name) => Some(name.clone()),
      Head::Detached(_) => None,
    })
  }

  fn resolve_ref(&self, refname: &str) -> BackendResult<Option<CommitId>> {
    Ok(self.state().refs.get(refname).cloned())
  }

  fn count_unique_commits(&self, from: &CommitId, hide: &CommitId) -> BackendResult<usize> {
    let state = self.state();
    let hidden = state.reachable(hide);
    Ok(state.reachable(from).difference(&hidden).count())
  }

  fn remotes(&self) -> BackendResult<Vec<String>> {
    Ok(self.state().remotes.clone())
  }

  fn fetch(&self, remote: &str, timeout: Duration) -> BackendResult<()> {
    let behavior = {
      let mut state = self.state();
      state.fetch_count += 1;
      if !state.remotes.iter().any(|name| name == remote) {
        return Err(BackendError::Rejected(format!("remote '{remote}' does not exist")));
      }
      state.fetch_behavior.clone()
    };

    RepoModel::run_network(&behavior, "fetch", timeout)?;
    self.state().apply_upstream_updates();
    Ok(())
  }

  fn pull(&self, remote: &str, branch: &str, upstream: &str, timeout: Duration) -> BackendResult<PullSummary> {
    let behavior = {
      let mut state = self.state();
      state.pull_count += 1;
      state.pull_behavior.clone()
    };
    RepoModel::run_network(&behavior, "pull", timeout)?;

    let mut state = self.state();
    state.apply_upstream_updates();

    let branch_ref = local_refname(branch);
    let upstream_ref = remote_refname(remote, upstream);
    let current = state
      .refs
      .get(&branch_ref)
      .cloned()
      .ok_or_else(|| BackendError::Rejected(format!("branch '{branch}' does not exist")))?;
    let target = state
      .refs
      .get(&upstream_ref)
      .cloned()
      .ok_or_else(|| BackendError::Rejected(format!("'{remote}/{upstream}' does not exist")))?;

    if state.reachable(&current).contains(&target) {
      return Ok(PullSummary::UpToDate);
    }
    if !state.reachable(&target).contains(&current) {
      return Err(BackendError::Rejected(format!(
        "Cannot fast-forward '{branch}': it has diverged from '{remote}/{upstream}'"
      )));
    }

    state.refs.insert(branch_ref, target.clone());
    Ok(PullSummary::FastForwarded {
      from: current,
      to: target,
    })
  }

  fn staged_paths(&self) -> BackendResult<Vec<String>> {
    Ok(self.state().staged.clone())
  }

  fn unstaged_paths(&self) -> BackendResult<Vec<String>> {
    Ok(self.state().unstaged.clone())
  }

  fn untracked_paths(&self) -> BackendResult<Vec<String>> {
    Ok(self.state().untracked.clone())
  }

  fn commit_time(&self, commit: &CommitId) -> BackendResult<DateTime<Utc>> {
    self
      .state()
      .commits
      .get(commit)
      .and_then(|entry| entry.time)
      .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
      .ok_or_else(|| BackendError::Rejected(format!("no timestamp recorded for commit {commit}")))
  }
}
