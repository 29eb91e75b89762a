//! # Configuration Management
//!
//! Locates drift's configuration directory and resolves the settings the
//! status engine runs with. Settings are layered: built-in defaults, then the
//! optional `config.toml`, then environment variables. Command-line flags are
//! applied on top by the caller.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Maximum age in seconds of a cached fetch before the remote is fetched again.
pub const FETCH_CACHE_SECONDS_ENV: &str = "GIT_FETCH_CACHE_SECONDS";
/// Timeout in seconds for a single fetch or pull.
pub const NETWORK_TIMEOUT_ENV: &str = "DRIFT_NETWORK_TIMEOUT";
/// Number of repositories evaluated at once by `drift scan`.
pub const JOBS_ENV: &str = "DRIFT_JOBS";

const DEFAULT_CACHE_SECONDS: u64 = 600;
const DEFAULT_NETWORK_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_JOBS: usize = 4;
const DEFAULT_REMOTE: &str = "origin";

/// Represents the configuration directories for the drift application
#[derive(Debug, Clone)]
pub struct ConfigDirs {
  pub config_dir: PathBuf,
}

impl ConfigDirs {
  /// Create a new ConfigDirs instance
  pub fn new() -> Result<Self> {
    let proj_dirs = ProjectDirs::from("", "", "drift").context("Failed to determine project directories")?;

    Ok(Self {
      config_dir: proj_dirs.config_dir().to_path_buf(),
    })
  }

  /// Config directory rooted somewhere explicit.
  pub fn at(config_dir: impl Into<PathBuf>) -> Self {
    Self {
      config_dir: config_dir.into(),
    }
  }

  pub fn config_dir(&self) -> &Path {
    &self.config_dir
  }

  /// Get the path to the settings file
  pub fn config_path(&self) -> PathBuf {
    self.config_dir.join("config.toml")
  }

  /// Load the settings file, or defaults when it does not exist
  pub fn load_config_file(&self) -> Result<ConfigFile> {
    let config_path = self.config_path();

    if !config_path.exists() {
      debug!("No config file at {}", config_path.display());
      return Ok(ConfigFile::default());
    }

    let content = fs::read_to_string(&config_path)
      .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

    toml::from_str(&content).with_context(|| format!("Failed to parse config from {}", config_path.display()))
  }
}

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
  pub fetch_cache_seconds: Option<u64>,
  pub network_timeout_seconds: Option<u64>,
  pub jobs: Option<usize>,
}

/// Resolved settings for the status engine and aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusConfig {
  /// A fetch younger than this is served from the cache.
  pub cache_max_age: Duration,
  /// Deadline for a single fetch or pull.
  pub network_timeout: Duration,
  /// Concurrent evaluations during aggregation.
  pub jobs: usize,
  /// Remote every repository is compared against.
  pub remote: String,
}

impl Default for StatusConfig {
  fn default() -> Self {
    Self {
      cache_max_age: Duration::from_secs(DEFAULT_CACHE_SECONDS),
      network_timeout: Duration::from_secs(DEFAULT_NETWORK_TIMEOUT_SECONDS),
      jobs: DEFAULT_JOBS,
      remote: DEFAULT_REMOTE.to_string(),
    }
  }
}

impl StatusConfig {
  /// Defaults, overlaid with the config file in `dirs` and the process
  /// environment.
  pub fn load(dirs: &ConfigDirs) -> Result<Self> {
    let file = dirs.load_config_file()?;
    Ok(Self::from_sources(&file, |key| std::env::var(key).ok()))
  }

  /// Overlay `file` and then the variables returned by `env` on the defaults.
  /// Unparseable environment values are reported and ignored.
  pub fn from_sources(file: &ConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
    let mut config = Self::default();

    if let Some(seconds) = file.fetch_cache_seconds {
      config.cache_max_age = Duration::from_secs(seconds);
    }
    if let Some(seconds) = file.network_timeout_seconds {
      config.network_timeout = Duration::from_secs(seconds);
    }
    if let Some(jobs) = file.jobs {
      config.jobs = jobs;
    }

    if let Some(seconds) = parse_env::<u64>(&env, FETCH_CACHE_SECONDS_ENV) {
      config.cache_max_age = Duration::from_secs(seconds);
    }
    if let Some(seconds) = parse_env::<u64>(&env, NETWORK_TIMEOUT_ENV) {
      config.network_timeout = Duration::from_secs(seconds);
    }
    if let Some(jobs) = parse_env::<usize>(&env, JOBS_ENV) {
      config.jobs = jobs;
    }

    config.jobs = config.jobs.max(1);
    config
  }

  pub fn with_jobs(mut self, jobs: usize) -> Self {
    self.jobs = jobs.max(1);
    self
  }

  pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
    self.network_timeout = timeout;
    self
  }
}

fn parse_env<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
  let raw = env(key)?;
  match raw.trim().parse() {
    Ok(value) => Some(value),
    Err(_) => {
      warn!("Ignoring {key}={raw:?}: expected a non-negative integer");
      None
    }
  }
}
