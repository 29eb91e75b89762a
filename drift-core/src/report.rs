//! Human-readable report for a single repository.

use crate::divergence::SyncState;
use crate::output::{self, format_commit_time};
use crate::record::{PullOutcome, RepoStatusRecord};

/// How a report line should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
  Success,
  Info,
  Warning,
  Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLine {
  pub tone: Tone,
  pub text: String,
}

impl ReportLine {
  fn new(tone: Tone, text: impl Into<String>) -> Self {
    Self {
      tone,
      text: text.into(),
    }
  }

  /// Print with the matching status icon.
  pub fn print(&self) {
    match self.tone {
      Tone::Success => output::print_success(&self.text),
      Tone::Info => output::print_info(&self.text),
      Tone::Warning => output::print_warning(&self.text),
      Tone::Error => output::print_error(&self.text),
    }
  }
}

/// Lines describing `record`, in display order.
pub fn status_report(record: &RepoStatusRecord) -> Vec<ReportLine> {
  let mut lines = Vec::new();
  let branch = &record.branch;
  let remote = &record.remote_branch;
  let divergence = record.divergence;

  if record.fetch_cached {
    lines.push(ReportLine::new(Tone::Info, "(fetch skipped, cached)"));
  }

  lines.push(match record.sync_state() {
    SyncState::UpToDate => ReportLine::new(Tone::Success, format!("Your branch '{branch}' is up to date with '{remote}'.")),
    SyncState::Ahead => ReportLine::new(
      Tone::Warning,
      format!(
        "Your branch '{branch}' is ahead of '{remote}' by {} commit(s). You may want to push.",
        divergence.ahead
      ),
    ),
    SyncState::Behind => ReportLine::new(
      Tone::Warning,
      format!(
        "Your branch '{branch}' is behind '{remote}' by {} commit(s). You may want to pull.",
        divergence.behind
      ),
    ),
    SyncState::Diverged => ReportLine::new(
      Tone::Warning,
      format!(
        "Your branch and '{remote}' have diverged. Local is ahead by {} and behind by {} commit(s). Consider merging or rebasing.",
        divergence.ahead, divergence.behind
      ),
    ),
  });

  let tree = &record.working_tree;
  if tree.staged > 0 {
    lines.push(ReportLine::new(Tone::Info, "There are staged changes ready to be committed."));
  }
  if tree.unstaged > 0 {
    lines.push(ReportLine::new(
      Tone::Warning,
      "There are unstaged changes in your working directory.",
    ));
  }
  if tree.untracked > 0 {
    lines.push(ReportLine::new(
      Tone::Warning,
      format!("There are untracked files: {}", tree.untracked_paths.join(", ")),
    ));
  }
  if tree.is_clean() {
    lines.push(ReportLine::new(
      Tone::Success,
      "Working directory clean (no staged, unstaged, or untracked changes).",
    ));
  }

  if let Some(time) = &record.last_commit {
    lines.push(ReportLine::new(Tone::Info, format!("Last commit: {}", format_commit_time(time))));
  }

  if let Some(pull) = &record.pull {
    lines.push(ReportLine::new(Tone::Info, format!("Pulling from {remote}...")));
    lines.push(match pull {
      PullOutcome::Succeeded { summary } => ReportLine::new(Tone::Success, format!("Pull result: {summary}")),
      PullOutcome::Failed { reason } => ReportLine::new(Tone::Error, format!("Error during pull: {reason}")),
    });
  }

  lines
}
