//! Per-repository fetch cache.
//!
//! Each repository keeps a small JSON document in its metadata directory that
//! maps remote names to the time of the last successful fetch, in fractional
//! seconds since the Unix epoch. A fetch is skipped while the recorded time is
//! younger than the configured maximum age.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// File name of the cache document inside the repository metadata directory.
pub const CACHE_FILE_NAME: &str = ".fetch_cache.json";

/// Source of the current time, in seconds since the Unix epoch.
pub trait Clock: Send + Sync {
  fn now(&self) -> f64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> f64 {
    SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|elapsed| elapsed.as_secs_f64())
      .unwrap_or(0.0)
  }
}

/// Settable clock for deterministic cache behavior.
#[derive(Debug)]
pub struct FixedClock {
  bits: AtomicU64,
}

impl FixedClock {
  pub fn new(now: f64) -> Self {
    Self {
      bits: AtomicU64::new(now.to_bits()),
    }
  }

  pub fn set(&self, now: f64) {
    self.bits.store(now.to_bits(), Ordering::SeqCst);
  }

  pub fn advance(&self, by: Duration) {
    self.set(self.now() + by.as_secs_f64());
  }
}

impl Clock for FixedClock {
  fn now(&self) -> f64 {
    f64::from_bits(self.bits.load(Ordering::SeqCst))
  }
}

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("failed to access fetch cache at {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
  #[error("fetch cache at {} is not valid JSON: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

/// Reads and writes the cache document of one repository.
#[derive(Debug, Clone)]
pub struct CacheStore {
  path: PathBuf,
}

impl CacheStore {
  /// Store backed by `<metadata_dir>/.fetch_cache.json`.
  pub fn for_repository(metadata_dir: &Path) -> Self {
    Self {
      path: metadata_dir.join(CACHE_FILE_NAME),
    }
  }

  /// Load the remote → timestamp map. A missing file is an empty map.
  pub fn load(&self) -> Result<BTreeMap<String, f64>, CacheError> {
    let contents = match fs::read_to_string(&self.path) {
      Ok(contents) => contents,
      Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
      Err(source) => {
        return Err(CacheError::Io {
          path: self.path.clone(),
          source,
        });
      }
    };

    serde_json::from_str(&contents).map_err(|source| CacheError::Parse {
      path: self.path.clone(),
      source,
    })
  }

  /// Record `timestamp` for `remote`, keeping entries for other remotes.
  ///
  /// The document is rewritten through a temporary file in the same
  /// directory and renamed into place, so readers never see a torn write. A
  /// corrupt existing document is replaced.
  pub fn upsert(&self, remote: &str, timestamp: f64) -> Result<(), CacheError> {
    let mut entries = match self.load() {
      Ok(entries) => entries,
      Err(CacheError::Parse { .. }) => {
        warn!("Replacing unreadable fetch cache at {}", self.path.display());
        BTreeMap::new()
      }
      Err(err) => return Err(err),
    };
    entries.insert(remote.to_string(), timestamp);

    let io_err = |source: io::Error| CacheError::Io {
      path: self.path.clone(),
      source,
    };

    let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
    let json = serde_json::to_string(&entries).map_err(|source| CacheError::Parse {
      path: self.path.clone(),
      source,
    })?;

    let mut file = NamedTempFile::new_in(dir).map_err(io_err)?;
    file.write_all(json.as_bytes()).map_err(io_err)?;
    file.flush().map_err(io_err)?;
    file.persist(&self.path).map_err(|err| io_err(err.error))?;

    trace!("Recorded fetch of {remote} at {timestamp} in {}", self.path.display());
    Ok(())
  }
}

/// Decides whether a remote is due for a fetch.
#[derive(Debug, Clone, Copy)]
pub struct FetchCache {
  max_age: Duration,
}

impl FetchCache {
  pub fn new(max_age: Duration) -> Self {
    Self { max_age }
  }

  pub fn max_age(&self) -> Duration {
    self.max_age
  }

  /// Whether `remote` should be fetched at time `now`.
  ///
  /// Any problem reading the cache means "fetch". A recorded time in the
  /// future is treated as absent.
  pub fn should_fetch(&self, metadata_dir: &Path, remote: &str, now: f64) -> bool {
    let store = CacheStore::for_repository(metadata_dir);
    let entries = match store.load() {
      Ok(entries) => entries,
      Err(err) => {
        debug!("Ignoring fetch cache: {err}");
        return true;
      }
    };

    let Some(&last) = entries.get(remote) else {
      return true;
    };

    let age = now - last;
    if !age.is_finite() || age < 0.0 {
      return true;
    }

    age >= self.max_age.as_secs_f64()
  }

  /// Remember a successful fetch of `remote` at time `now`. Failures are
  /// logged and otherwise ignored.
  pub fn record_fetch(&self, metadata_dir: &Path, remote: &str, now: f64) {
    let store = CacheStore::for_repository(metadata_dir);
    if let Err(err) = store.upsert(remote, now) {
      debug!("Could not update fetch cache: {err}");
    }
  }
}
