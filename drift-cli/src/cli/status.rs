//! # Status Command
//!
//! Checks a single repository and prints the sync report.

use anyhow::{Context, Result};
use clap::Args;
use drift_core::output::{format_repo_name, format_repo_path, print_header};
use drift_core::report::status_report;
use drift_core::{EvaluateOptions, Git2Backend, StatusEngine};
use tracing::info;

use crate::utils::{load_status_config, validate_repository_path};

/// Check one repository against its remote
#[derive(Args)]
pub struct StatusArgs {
  /// Path to the repository (defaults to current directory)
  #[arg(default_value = ".", value_name = "PATH")]
  pub path: String,

  /// Pull the evaluated branch from the remote after checking status
  #[arg(long)]
  pub pull: bool,

  /// Fetch from the remote even if a recent fetch is cached
  #[arg(long)]
  pub force: bool,
}

pub fn handle_status_command(args: StatusArgs) -> Result<()> {
  let path = validate_repository_path(&args.path)?;
  let config = load_status_config()?;
  info!("Checking {} with {:?}", path.display(), config);

  // SAFETY: the status command never spawns threads.
  unsafe { Git2Backend::set_network_timeout(config.network_timeout) }
    .context("Failed to configure network timeouts")?;

  let engine = StatusEngine::new(Git2Backend, config);
  let options = EvaluateOptions {
    pull: args.pull,
    force: args.force,
  };
  let record = engine.evaluate(&path, options)?;

  print_header(&format!(
    "{} {}",
    format_repo_name(&record.name),
    format_repo_path(&record.path.display().to_string())
  ));
  for line in status_report(&record) {
    line.print();
  }

  Ok(())
}
