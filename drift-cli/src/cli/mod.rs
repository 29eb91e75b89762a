//! # Command Line Interface
//!
//! Defines the CLI structure and command handlers for the drift tool.

mod scan;
mod status;

use anyhow::Result;
use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{ArgAction, Parser, Subcommand};
use drift_core::ColorMode;

/// Top-level CLI command for the drift tool
#[derive(Parser)]
#[command(name = "drift")]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(about = "Report how far local git repositories have drifted from their remotes")]
#[command(
  long_about = "Drift compares local branches with their remote-tracking counterparts.\n\n\
        It reports commits ahead and behind, staged, unstaged, and untracked changes,\n\
        and can fast-forward branches that are only behind. Fetches are cached per\n\
        repository so repeated checks stay fast."
)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(propagate_version = true)]
#[command(subcommand_required(true))]
#[command(disable_help_subcommand = true)]
#[command(max_term_width = 120)]
#[command(styles = Styles::styled()
    .header(AnsiColor::BrightGreen.on_default().bold().underline())
    .usage(AnsiColor::Green.on_default().bold())
    .literal(AnsiColor::BrightGreen.on_default().bold())
    .placeholder(AnsiColor::BrightWhite.on_default().italic())
    .valid(AnsiColor::Green.on_default())
    .invalid(AnsiColor::BrightRed.on_default().bold())
)]
pub struct Cli {
  /// Sets the level of verbosity (can be used multiple times)
  #[arg(
    short = 'v',
    long = "verbose",
    action = ArgAction::Count,
    global = true,
    long_help = "Sets the level of verbosity for tracing and logging output.\n\n\
             -v: Show info level messages\n\
             -vv: Show debug level messages\n\
             -vvv: Show trace level messages"
  )]
  pub verbose: u8,

  /// Controls when colored output is used
  #[arg(
    long,
    value_enum,
    ignore_case = true,
    global = true,
    default_value_t = ColorMode::Auto,
  )]
  pub colors: ColorMode,

  /// Subcommands
  #[command(subcommand)]
  pub command: Commands,
}

/// Subcommands for the drift tool
#[derive(Subcommand)]
pub enum Commands {
  /// Check one repository against its remote
  #[command(long_about = "Checks a single repository against origin.\n\n\
            The local branch is main, then master, then whatever is checked out. It is\n\
            compared with origin/<branch>, falling back between main and master. A fetch\n\
            runs first unless one happened recently; use --force to fetch regardless.")]
  #[command(alias = "st")]
  Status(status::StatusArgs),

  /// Check every repository under a directory
  #[command(long_about = "Checks every immediate subdirectory of PARENT and prints a table.\n\n\
            Directories that are not usable repositories are skipped. Repositories with\n\
            pending changes are listed first, then the most recently committed.")]
  Scan(scan::ScanArgs),
}

pub fn handle_cli(cli: Cli) -> Result<()> {
  cli.colors.apply();

  match cli.command {
    Commands::Status(status) => status::handle_status_command(status),
    Commands::Scan(scan) => scan::handle_scan_command(scan),
  }
}
