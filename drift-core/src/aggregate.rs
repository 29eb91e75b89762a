//! Multi-repository aggregation.
//!
//! Every immediate subdirectory of a parent directory is evaluated with the
//! status engine on a bounded pool of blocking workers. Directories that are
//! not usable repositories are skipped; everything else is collected and
//! ranked with [`sort_records`].

use std::cmp::Ordering;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::{task, time};
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::engine::{EvaluateOptions, StatusEngine};
use crate::record::RepoStatusRecord;

/// Upper bound on the slack added on top of two network timeouts (fetch and
/// pull) before an evaluation is abandoned.
const MAX_EVALUATION_SLACK: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum AggregateError {
  #[error("Failed to read directory {}: {source}", path.display())]
  ReadDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Progress notifications emitted while aggregating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
  /// Discovery finished; `total` directories will be evaluated.
  Started { total: usize },
  /// A worker picked up directory number `index` (1-based).
  Checking { index: usize, total: usize, name: String },
  /// A directory was evaluated; `included` is false when it was skipped.
  Finished { name: String, included: bool },
  /// All evaluations are done.
  Completed { included: usize, total: usize },
}

/// Receives [`ProgressEvent`]s. Called from worker tasks.
pub trait ProgressSink: Send + Sync {
  fn report(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
  F: Fn(ProgressEvent) + Send + Sync,
{
  fn report(&self, event: ProgressEvent) {
    self(event)
  }
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
  fn report(&self, _event: ProgressEvent) {}
}

pub struct Aggregator<B> {
  engine: Arc<StatusEngine<B>>,
}

impl<B: Backend + 'static> Aggregator<B> {
  pub fn new(engine: StatusEngine<B>) -> Self {
    Self {
      engine: Arc::new(engine),
    }
  }

  /// Evaluate every immediate subdirectory of `parent` and return the
  /// successful records, sorted.
  ///
  /// Only failing to list `parent` is an error. Each repository is handled by
  /// exactly one worker, and at most `jobs` evaluations run at once.
  pub async fn aggregate(
    &self,
    parent: &Path,
    options: EvaluateOptions,
    progress: Arc<dyn ProgressSink>,
  ) -> Result<Vec<RepoStatusRecord>, AggregateError> {
    let candidates = discover_repositories(parent)?;
    let total = candidates.len();
    info!("Checking {total} directories under {}", parent.display());
    progress.report(ProgressEvent::Started { total });

    let config = self.engine.config();
    let semaphore = Arc::new(Semaphore::new(config.jobs.max(1)));
    let budget = evaluation_budget(config.network_timeout);

    let mut handles = Vec::with_capacity(total);
    for (index, path) in candidates.into_iter().enumerate() {
      let engine = Arc::clone(&self.engine);
      let semaphore = Arc::clone(&semaphore);
      let progress = Arc::clone(&progress);

      handles.push(task::spawn(async move {
        let name = directory_name(&path);
        let Ok(permit) = semaphore.acquire_owned().await else {
          return None;
        };
        progress.report(ProgressEvent::Checking {
          index: index + 1,
          total,
          name: name.clone(),
        });

        let target = path.clone();
        let evaluation = task::spawn_blocking(move || engine.evaluate(&target, options));

        let record = match time::timeout(budget, evaluation).await {
          Ok(Ok(Ok(record))) => Some(record),
          Ok(Ok(Err(err))) => {
            debug!("Skipping {}: {err}", path.display());
            None
          }
          Ok(Err(err)) => {
            warn!("Evaluation of {} did not complete: {err}", path.display());
            None
          }
          Err(_) => {
            warn!("Evaluation of {} exceeded {budget:?}, skipping", path.display());
            None
          }
        };
        // An abandoned evaluation keeps its thread but gives up its slot.
        drop(permit);

        progress.report(ProgressEvent::Finished {
          name,
          included: record.is_some(),
        });
        record
      }));
    }

    let mut records = Vec::with_capacity(total);
    for handle in handles {
      match handle.await {
        Ok(Some(record)) => records.push(record),
        Ok(None) => {}
        Err(err) => warn!("Aggregation task failed: {err}"),
      }
    }

    sort_records(&mut records);
    progress.report(ProgressEvent::Completed {
      included: records.len(),
      total,
    });
    Ok(records)
  }
}

/// Immediate subdirectories of `parent`, hidden ones included, symlinks
/// followed, sorted by name. Two entries resolving to the same directory are
/// evaluated once. A `.git` entry belongs to `parent` itself and is skipped.
pub fn discover_repositories(parent: &Path) -> Result<Vec<PathBuf>, AggregateError> {
  let read_err = |source| AggregateError::ReadDir {
    path: parent.to_path_buf(),
    source,
  };

  let mut dirs = Vec::new();
  for entry in fs::read_dir(parent).map_err(read_err)? {
    let path = entry.map_err(read_err)?.path();
    if path.is_dir() && path.file_name() != Some(OsStr::new(".git")) {
      dirs.push(path);
    }
  }
  dirs.sort();

  let mut seen = HashSet::new();
  dirs.retain(|path| {
    let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.clone());
    seen.insert(canonical)
  });

  Ok(dirs)
}

/// Order records for display: working copies with pending changes first,
/// then most recent commit first (unknown dates last), then by name.
pub fn sort_records(records: &mut [RepoStatusRecord]) {
  records.sort_by(|a, b| {
    b.needs_attention()
      .cmp(&a.needs_attention())
      .then_with(|| match (&a.last_commit, &b.last_commit) {
        (Some(a_time), Some(b_time)) => b_time.cmp(a_time),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
      })
      .then_with(|| a.name.cmp(&b.name))
  });
}

fn evaluation_budget(network_timeout: Duration) -> Duration {
  network_timeout
    .saturating_mul(2)
    .saturating_add(network_timeout.min(MAX_EVALUATION_SLACK))
}

fn directory_name(path: &Path) -> String {
  path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_else(|| path.display().to_string())
}
