//! The per-repository result of a status evaluation.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backend::PullSummary;
use crate::divergence::{DivergenceResult, SyncState, WorkingTreeState};

/// Result of an attempted pull. A failed pull does not fail the evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PullOutcome {
  Succeeded { summary: PullSummary },
  Failed { reason: String },
}

/// Everything known about one repository after evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoStatusRecord {
  /// Directory name of the working copy.
  pub name: String,
  pub path: PathBuf,
  /// Local branch that was evaluated.
  pub branch: String,
  /// Remote-tracking branch it was compared with, e.g. `origin/main`.
  pub remote_branch: String,
  pub divergence: DivergenceResult,
  pub working_tree: WorkingTreeState,
  /// Commit time of the local branch tip; `None` when it could not be read.
  pub last_commit: Option<DateTime<Utc>>,
  /// Whether the fetch was skipped because a recent one was cached.
  pub fetch_cached: bool,
  /// Present only when a pull was requested.
  pub pull: Option<PullOutcome>,
}

impl RepoStatusRecord {
  pub fn sync_state(&self) -> SyncState {
    self.divergence.state()
  }

  /// True when the working copy has staged, unstaged, or untracked changes.
  pub fn needs_attention(&self) -> bool {
    self.working_tree.needs_attention()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::CommitId;

  fn record() -> RepoStatusRecord {
    RepoStatusRecord {
      name: "app".to_string(),
      path: PathBuf::from("/work/app"),
      branch: "main".to_string(),
      remote_branch: "origin/main".to_string(),
      divergence: DivergenceResult::new(1, 0),
      working_tree: WorkingTreeState::default(),
      last_commit: DateTime::from_timestamp(1_700_000_000, 0),
      fetch_cached: true,
      pull: None,
    }
  }

  #[test]
  fn derived_state() {
    let record = record();
    assert_eq!(record.sync_state(), SyncState::Ahead);
    assert!(!record.needs_attention());
  }

  #[test]
  fn serializes_to_json() {
    let mut record = record();
    record.pull = Some(PullOutcome::Succeeded {
      summary: PullSummary::FastForwarded {
        from: CommitId::new("aaaa"),
        to: CommitId::new("bbbb"),
      },
    });

    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(value["name"], "app");
    assert_eq!(value["divergence"]["ahead"], 1);
    assert_eq!(value["fetch_cached"], true);
    assert_eq!(value["last_commit"], "2023-11-14T22:13:20Z");
    assert_eq!(value["pull"]["status"], "succeeded");
    assert_eq!(value["pull"]["summary"]["kind"], "fast_forwarded");
    assert_eq!(value["pull"]["summary"]["to"], "bbbb");
  }

  #[test]
  fn failed_pull_serializes_reason() {
    let outcome = PullOutcome::Failed {
      reason: "diverged".to_string(),
    };
    let value = serde_json::to_value(&outcome).unwrap();
    assert_eq!(value, serde_json::json!({ "status": "failed", "reason": "diverged" }));
  }
}
