//! Single-repository status evaluation.
//!
//! [`StatusEngine::evaluate`] opens a working copy, resolves the local branch
//! and the remote-tracking reference to compare it with, fetches when the
//! cache says a fetch is due, and gathers divergence, working-tree state, and
//! the tip's commit time into a [`RepoStatusRecord`]. An optional pull runs
//! last and never fails the evaluation.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::backend::{Backend, RepoHandle};
use crate::cache::{Clock, FetchCache, SystemClock};
use crate::config::StatusConfig;
use crate::divergence::{compute, inspect_working_tree};
use crate::error::StatusError;
use crate::record::{PullOutcome, RepoStatusRecord};
use crate::resolver::{ensure_remote, resolve_local_branch, resolve_remote_ref};

/// Per-call switches for [`StatusEngine::evaluate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluateOptions {
  /// Pull after evaluating.
  pub pull: bool,
  /// Fetch even when the cache holds a recent fetch.
  pub force: bool,
}

pub struct StatusEngine<B> {
  backend: B,
  cache: FetchCache,
  config: StatusConfig,
  clock: Arc<dyn Clock>,
}

impl<B: Backend> StatusEngine<B> {
  pub fn new(backend: B, config: StatusConfig) -> Self {
    Self::with_clock(backend, config, Arc::new(SystemClock))
  }

  pub fn with_clock(backend: B, config: StatusConfig, clock: Arc<dyn Clock>) -> Self {
    Self {
      backend,
      cache: FetchCache::new(config.cache_max_age),
      config,
      clock,
    }
  }

  pub fn config(&self) -> &StatusConfig {
    &self.config
  }

  /// Evaluate the working copy at `path`.
  #[instrument(skip(self, path), fields(path = %path.display()))]
  pub fn evaluate(&self, path: &Path, options: EvaluateOptions) -> Result<RepoStatusRecord, StatusError> {
    let repo = self.backend.open(path)?;
    let remote = self.config.remote.as_str();

    let local = resolve_local_branch(&repo)?;
    ensure_remote(&repo, remote)?;

    let fetch_cached = !self.fetch_if_due(&repo, remote, options.force)?;

    let upstream = resolve_remote_ref(&repo, &local, remote)?;
    let divergence = compute(&repo, &local, &upstream)?;
    let working_tree = inspect_working_tree(&repo)?;

    let last_commit = match repo.commit_time(&local.commit) {
      Ok(time) => Some(time),
      Err(err) => {
        debug!("Could not read commit time of {}: {err}", local.commit);
        None
      }
    };

    let pull = options.pull.then(|| {
      info!("Pulling {} from {}", local.name, upstream.display_name());
      match repo.pull(remote, &local.name, &upstream.name, self.config.network_timeout) {
        Ok(summary) => PullOutcome::Succeeded { summary },
        Err(err) => {
          warn!("Pull failed in {}: {err}", path.display());
          PullOutcome::Failed {
            reason: err.to_string(),
          }
        }
      }
    });

    Ok(RepoStatusRecord {
      name: repository_name(repo.workdir()),
      path: repo.workdir().to_path_buf(),
      branch: local.name.clone(),
      remote_branch: upstream.display_name(),
      divergence,
      working_tree,
      last_commit,
      fetch_cached,
      pull,
    })
  }

  /// Fetch `remote` unless a recent fetch is cached. Returns whether a fetch
  /// actually ran.
  fn fetch_if_due(&self, repo: &B::Repo, remote: &str, force: bool) -> Result<bool, StatusError> {
    let metadata_dir = repo.metadata_dir();
    if !force && !self.cache.should_fetch(metadata_dir, remote, self.clock.now()) {
      debug!("Skipping fetch of {remote}: cached");
      return Ok(false);
    }

    debug!("Fetching {remote}");
    repo
      .fetch(remote, self.config.network_timeout)
      .map_err(|err| StatusError::FetchFailed {
        remote: remote.to_string(),
        reason: err.to_string(),
      })?;

    self.cache.record_fetch(metadata_dir, remote, self.clock.now());
    Ok(true)
  }
}

fn repository_name(workdir: &Path) -> String {
  workdir
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_else(|| workdir.display().to_string())
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;
  use std::time::Duration;

  use chrono::DateTime;
  use tempfile::TempDir;

  use super::*;
  use crate::backend::{CommitId, MemoryBackend, MemoryRepo, PullSummary};
  use crate::cache::FixedClock;
  use crate::divergence::SyncState;

  const NOW: f64 = 1_700_000_000.0;

  struct Harness {
    _dir: TempDir,
    path: PathBuf,
    repo: MemoryRepo,
    clock: Arc<FixedClock>,
    engine: StatusEngine<MemoryBackend>,
  }

  /// Engine over a single in-memory repository whose metadata directory is a
  /// real temp directory, so the fetch cache persists between evaluations.
  fn harness(build: impl FnOnce(MemoryRepo) -> MemoryRepo) -> Harness {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app");
    let repo = build(MemoryRepo::new(&path).with_metadata_dir(dir.path()));
    let clock = Arc::new(FixedClock::new(NOW));
    let engine = StatusEngine::with_clock(
      MemoryBackend::new().with_repo(repo.clone()),
      StatusConfig::default(),
      clock.clone(),
    );
    Harness {
      _dir: dir,
      path,
      repo,
      clock,
      engine,
    }
  }

  fn tracking(repo: MemoryRepo) -> MemoryRepo {
    repo
      .with_commit("base", &[], 1_000)
      .with_branch("main", "base")
      .with_remote_branch("origin", "main", "base")
  }

  #[test]
  fn up_to_date_repository() {
    let h = harness(tracking);
    let record = h.engine.evaluate(&h.path, EvaluateOptions::default()).unwrap();

    assert_eq!(record.name, "app");
    assert_eq!(record.branch, "main");
    assert_eq!(record.remote_branch, "origin/main");
    assert_eq!(record.sync_state(), SyncState::UpToDate);
    assert!(record.working_tree.is_clean());
    assert_eq!(record.last_commit, DateTime::from_timestamp(1_000, 0));
    assert!(!record.fetch_cached);
    assert_eq!(record.pull, None);
    assert_eq!(h.repo.fetch_count(), 1);
  }

  #[test]
  fn second_evaluation_within_max_age_skips_fetch() {
    let h = harness(tracking);
    h.engine.evaluate(&h.path, EvaluateOptions::default()).unwrap();

    h.clock.advance(Duration::from_secs(599));
    let record = h.engine.evaluate(&h.path, EvaluateOptions::default()).unwrap();
    assert!(record.fetch_cached);
    assert_eq!(h.repo.fetch_count(), 1);

    h.clock.advance(Duration::from_secs(1));
    let record = h.engine.evaluate(&h.path, EvaluateOptions::default()).unwrap();
    assert!(!record.fetch_cached);
    assert_eq!(h.repo.fetch_count(), 2);
  }

  #[test]
  fn force_bypasses_the_cache() {
    let h = harness(tracking);
    h.engine.evaluate(&h.path, EvaluateOptions::default()).unwrap();

    let options = EvaluateOptions {
      force: true,
      ..Default::default()
    };
    let record = h.engine.evaluate(&h.path, options).unwrap();
    assert!(!record.fetch_cached);
    assert_eq!(h.repo.fetch_count(), 2);
  }

  #[test]
  fn corrupted_cache_means_fetch() {
    let h = harness(tracking);
    std::fs::write(h.repo.metadata_dir().join(crate::cache::CACHE_FILE_NAME), "[oops").unwrap();

    let record = h.engine.evaluate(&h.path, EvaluateOptions::default()).unwrap();
    assert!(!record.fetch_cached);
    assert_eq!(h.repo.fetch_count(), 1);
  }

  #[test]
  fn ahead_by_two_with_clean_tree() {
    let h = harness(|repo| {
      repo
        .with_commit("base", &[], 1_000)
        .with_chain("local", Some("base"), 2, 2_000)
        .with_branch("main", "local2")
        .with_remote_branch("origin", "main", "base")
    });

    let record = h.engine.evaluate(&h.path, EvaluateOptions::default()).unwrap();
    assert_eq!(record.divergence.ahead, 2);
    assert_eq!(record.divergence.behind, 0);
    assert_eq!(record.sync_state(), SyncState::Ahead);
    assert_eq!(record.last_commit, DateTime::from_timestamp(2_002, 0));
  }

  #[test]
  fn fetch_brings_in_remote_commits_before_counting() {
    let h = harness(|repo| {
      tracking(repo)
        .with_chain("up", Some("base"), 3, 5_000)
        .with_upstream_update("origin", "main", "up3")
    });

    let record = h.engine.evaluate(&h.path, EvaluateOptions::default()).unwrap();
    assert_eq!(record.divergence.behind, 3);
  }

  #[test]
  fn staged_and_unstaged_changes() {
    let h = harness(|repo| tracking(repo).with_staged(&["a.rs"]).with_unstaged(&["b.rs", "c.rs"]));

    let record = h.engine.evaluate(&h.path, EvaluateOptions::default()).unwrap();
    assert_eq!(record.working_tree.staged, 1);
    assert_eq!(record.working_tree.unstaged, 2);
    assert_eq!(record.working_tree.status_code(), "SU");
    assert!(record.needs_attention());
  }

  #[test]
  fn main_falls_back_to_origin_master() {
    let h = harness(|repo| {
      repo
        .with_commit("base", &[], 1_000)
        .with_branch("main", "base")
        .with_remote_branch("origin", "master", "base")
    });

    let record = h.engine.evaluate(&h.path, EvaluateOptions::default()).unwrap();
    assert_eq!(record.remote_branch, "origin/master");
  }

  #[test]
  fn missing_remote_branch_is_fatal() {
    let h = harness(|repo| repo.with_commit("base", &[], 1_000).with_branch("main", "base"));

    let err = h.engine.evaluate(&h.path, EvaluateOptions::default()).unwrap_err();
    assert_eq!(
      err,
      StatusError::NoRemoteBranch {
        expected: "origin/main".to_string()
      }
    );
    assert_eq!(err.to_string(), "Remote branch origin/main not found.");
  }

  #[test]
  fn missing_origin_is_checked_before_fetching() {
    let h = harness(|repo| tracking(repo).with_remotes(&["upstream"]));

    let err = h.engine.evaluate(&h.path, EvaluateOptions::default()).unwrap_err();
    assert!(matches!(err, StatusError::RemoteNotFound { .. }));
    assert_eq!(h.repo.fetch_count(), 0);
  }

  #[test]
  fn detached_head_is_fatal() {
    let h = harness(|repo| {
      repo
        .with_commit("base", &[], 1_000)
        .with_branch("feature", "base")
        .detach_at("base")
    });

    let err = h.engine.evaluate(&h.path, EvaluateOptions::default()).unwrap_err();
    assert_eq!(err, StatusError::DetachedHead);
  }

  #[test]
  fn unknown_path_is_not_a_repository() {
    let h = harness(tracking);
    let err = h
      .engine
      .evaluate(Path::new("/definitely/not/here"), EvaluateOptions::default())
      .unwrap_err();
    assert!(matches!(err, StatusError::NotARepository { .. }));
  }

  #[test]
  fn bare_repository_is_rejected() {
    let h = harness(|repo| tracking(repo).bare());
    let err = h.engine.evaluate(&h.path, EvaluateOptions::default()).unwrap_err();
    assert!(matches!(err, StatusError::BareRepository { .. }));
  }

  #[test]
  fn fetch_failure_is_fatal_and_not_cached() {
    let h = harness(|repo| tracking(repo).failing_fetch("network unreachable"));

    let err = h.engine.evaluate(&h.path, EvaluateOptions::default()).unwrap_err();
    assert_eq!(
      err,
      StatusError::FetchFailed {
        remote: "origin".to_string(),
        reason: "network unreachable".to_string(),
      }
    );
    assert!(crate::cache::CacheStore::for_repository(h.repo.metadata_dir()).load().unwrap().is_empty());
  }

  #[test]
  fn fetch_timeout_is_a_fetch_failure() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("slow");
    let repo = tracking(MemoryRepo::new(&path).with_metadata_dir(dir.path())).stalling_fetch(Duration::from_secs(30));
    let config = StatusConfig::default().with_network_timeout(Duration::from_millis(20));
    let engine = StatusEngine::new(MemoryBackend::new().with_repo(repo), config);

    let err = engine.evaluate(&path, EvaluateOptions::default()).unwrap_err();
    match err {
      StatusError::FetchFailed { reason, .. } => assert!(reason.contains("timed out")),
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[test]
  fn unreadable_commit_time_is_unknown() {
    let h = harness(|repo| {
      repo
        .with_undated_commit("base", &[])
        .with_branch("main", "base")
        .with_remote_branch("origin", "main", "base")
    });

    let record = h.engine.evaluate(&h.path, EvaluateOptions::default()).unwrap();
    assert_eq!(record.last_commit, None);
  }

  #[test]
  fn pull_fast_forwards_behind_branch() {
    let h = harness(|repo| {
      tracking(repo)
        .with_chain("up", Some("base"), 2, 5_000)
        .with_remote_branch("origin", "main", "up2")
    });

    let options = EvaluateOptions {
      pull: true,
      ..Default::default()
    };
    let record = h.engine.evaluate(&h.path, options).unwrap();

    assert_eq!(record.divergence.behind, 2);
    assert_eq!(
      record.pull,
      Some(PullOutcome::Succeeded {
        summary: PullSummary::FastForwarded {
          from: CommitId::new("base"),
          to: CommitId::new("up2"),
        }
      })
    );
    assert_eq!(h.repo.ref_target("refs/heads/main"), Some(CommitId::new("up2")));
  }

  #[test]
  fn pull_failure_is_recorded_not_raised() {
    let h = harness(|repo| tracking(repo).failing_pull("merge conflict"));

    let options = EvaluateOptions {
      pull: true,
      ..Default::default()
    };
    let record = h.engine.evaluate(&h.path, options).unwrap();
    assert_eq!(
      record.pull,
      Some(PullOutcome::Failed {
        reason: "merge conflict".to_string()
      })
    );
    assert_eq!(h.repo.pull_count(), 1);
  }

  #[test]
  fn pull_of_diverged_branch_is_soft_failure() {
    let h = harness(|repo| {
      tracking(repo)
        .with_commit("mine", &["base"], 2_000)
        .with_commit("theirs", &["base"], 3_000)
        .with_branch("main", "mine")
        .with_remote_branch("origin", "main", "theirs")
    });

    let options = EvaluateOptions {
      pull: true,
      ..Default::default()
    };
    let record = h.engine.evaluate(&h.path, options).unwrap();
    assert_eq!(record.sync_state(), SyncState::Diverged);
    assert!(matches!(record.pull, Some(PullOutcome::Failed { .. })));
    assert_eq!(h.repo.ref_target("refs/heads/main"), Some(CommitId::new("mine")));
  }
}
