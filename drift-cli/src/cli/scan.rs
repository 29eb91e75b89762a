//! # Scan Command
//!
//! Checks every repository under a parent directory and prints a table or
//! JSON.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use drift_core::output::{format_commit_time, print_warning};
use drift_core::{
  Aggregator, EvaluateOptions, Git2Backend, ProgressEvent, ProgressSink, PullOutcome, RepoStatusRecord, StatusEngine,
};
use indicatif::{ProgressBar, ProgressStyle};
use tabled::builder::Builder;
use tabled::settings::Style;
use tracing::info;

use crate::consts::{CACHED_MARKER, CLEAN_STATUS, EMPTY_CELL, PROGRESS_TEMPLATE};
use crate::utils::{load_status_config, validate_directory};

/// How results are printed
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
  /// Table for humans
  Text,
  /// Array of status records
  Json,
}

/// Check every repository under a directory
#[derive(Args)]
pub struct ScanArgs {
  /// Directory whose immediate subdirectories are checked
  #[arg(value_name = "PARENT")]
  pub parent: String,

  /// Pull each repository after checking it
  #[arg(long)]
  pub pull: bool,

  /// Fetch every repository, ignoring the fetch cache
  #[arg(long)]
  pub no_cache: bool,

  /// Number of repositories checked at once
  #[arg(long, short = 'j', value_name = "N")]
  pub jobs: Option<usize>,

  /// Output format
  #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
  pub format: OutputFormat,
}

pub fn handle_scan_command(args: ScanArgs) -> Result<()> {
  let parent = validate_directory(&args.parent)?;

  let mut config = load_status_config()?;
  if let Some(jobs) = args.jobs {
    config = config.with_jobs(jobs);
  }
  info!("Scanning {} with {:?}", parent.display(), config);

  // SAFETY: runs before the tokio runtime and the progress bar start threads.
  unsafe { Git2Backend::set_network_timeout(config.network_timeout) }
    .context("Failed to configure network timeouts")?;

  let aggregator = Aggregator::new(StatusEngine::new(Git2Backend, config));
  let options = EvaluateOptions {
    pull: args.pull,
    force: args.no_cache,
  };
  let progress = Arc::new(ProgressBarSink::new());

  // Create a tokio runtime for parallel execution
  let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
  let result = rt.block_on(aggregator.aggregate(&parent, options, progress.clone()));
  // Do not wait for evaluations that were abandoned after timing out
  rt.shutdown_background();
  progress.clear();
  let records = result?;

  match args.format {
    OutputFormat::Json => {
      println!(
        "{}",
        serde_json::to_string_pretty(&records).context("Failed to serialize status records")?
      );
    }
    OutputFormat::Text => {
      if records.is_empty() {
        print_warning(&format!("No git repositories found in '{}'.", args.parent));
      } else {
        println!("{}", render_table(&records, args.pull));
      }
    }
  }

  Ok(())
}

/// Transient progress bar on stderr
struct ProgressBarSink {
  bar: ProgressBar,
}

impl ProgressBarSink {
  fn new() -> Self {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template(PROGRESS_TEMPLATE).unwrap_or_else(|_| ProgressStyle::default_spinner());
    bar.set_style(style);
    Self { bar }
  }

  fn clear(&self) {
    self.bar.finish_and_clear();
  }
}

impl ProgressSink for ProgressBarSink {
  fn report(&self, event: ProgressEvent) {
    match event {
      ProgressEvent::Started { total } => {
        self.bar.set_length(total as u64);
        self.bar.enable_steady_tick(Duration::from_millis(120));
      }
      ProgressEvent::Checking { name, .. } => self.bar.set_message(name),
      ProgressEvent::Finished { .. } => self.bar.inc(1),
      ProgressEvent::Completed { .. } => self.bar.finish_and_clear(),
    }
  }
}

/// Render the scan table. The Pull column only appears when pulling.
pub fn render_table(records: &[RepoStatusRecord], include_pull: bool) -> String {
  let mut builder = Builder::default();

  let mut header = vec![
    "Repo",
    "Branch",
    "Remote",
    "Status",
    "Cached",
    "Ahead",
    "Behind",
    "Staged",
    "Unstaged",
    "Untracked",
    "Last Commit",
  ];
  if include_pull {
    header.push("Pull");
  }
  builder.push_record(header);

  for record in records {
    let tree = &record.working_tree;
    let status = tree.status_code();

    let mut row = vec![
      record.name.clone(),
      record.branch.clone(),
      record.remote_branch.clone(),
      if status.is_empty() {
        CLEAN_STATUS.to_string()
      } else {
        status
      },
      if record.fetch_cached {
        CACHED_MARKER.to_string()
      } else {
        String::new()
      },
      count_cell(record.divergence.ahead),
      count_cell(record.divergence.behind),
      count_cell(tree.staged),
      count_cell(tree.unstaged),
      count_cell(tree.untracked),
      record
        .last_commit
        .as_ref()
        .map_or_else(|| EMPTY_CELL.to_string(), format_commit_time),
    ];
    if include_pull {
      row.push(pull_cell(record.pull.as_ref()));
    }
    builder.push_record(row);
  }

  let mut table = builder.build();
  table.with(Style::sharp());
  table.to_string()
}

fn count_cell(count: usize) -> String {
  if count == 0 {
    EMPTY_CELL.to_string()
  } else {
    count.to_string()
  }
}

fn pull_cell(outcome: Option<&PullOutcome>) -> String {
  match outcome {
    Some(PullOutcome::Succeeded { summary }) => summary.to_string(),
    Some(PullOutcome::Failed { reason }) => format!("failed: {reason}"),
    None => EMPTY_CELL.to_string(),
  }
}
