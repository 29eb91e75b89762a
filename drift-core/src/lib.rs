//! # Drift Core Library
//!
//! The repository status reconciliation engine behind the `drift` command. It
//! decides which local branch to evaluate, which remote-tracking reference to
//! compare it against, how far the two have diverged, and whether a network
//! fetch is due. Results for many repositories can be aggregated and ranked.
//!
//! Version-control access goes through the [`backend::Backend`] trait so the
//! engine can run against libgit2 ([`backend::Git2Backend`]) or, with the
//! `test-utils` feature, an in-memory repository model.

pub mod aggregate;
pub mod backend;
pub mod cache;
pub mod config;
pub mod divergence;
pub mod engine;
pub mod error;
pub mod output;
pub mod record;
pub mod report;
pub mod resolver;

pub use aggregate::{AggregateError, Aggregator, NoProgress, ProgressEvent, ProgressSink, sort_records};
pub use backend::{Backend, CommitId, Git2Backend, PullSummary, RepoHandle};
#[cfg(any(test, feature = "test-utils"))]
pub use backend::{MemoryBackend, MemoryRepo};
pub use cache::{CacheStore, Clock, FetchCache, FixedClock, SystemClock};
pub use config::{ConfigDirs, StatusConfig};
pub use divergence::{DivergenceResult, SyncState, WorkingTreeState};
pub use engine::{EvaluateOptions, StatusEngine};
pub use error::{BackendError, StatusError};
pub use output::ColorMode;
pub use record::{PullOutcome, RepoStatusRecord};
pub use resolver::BranchRef;
