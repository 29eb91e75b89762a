//! Constants for the Drift CLI
//!
//! Placeholder cells and templates shared by the command renderers.

/// Table cell shown for a zero count or a missing value
pub const EMPTY_CELL: &str = "-";

/// Status cell for a working copy without pending changes
pub const CLEAN_STATUS: &str = "clean";

/// Cached cell for a repository whose fetch was served from the cache
pub const CACHED_MARKER: &str = "cached";

/// indicatif template for the scan progress bar
pub const PROGRESS_TEMPLATE: &str = "{spinner:.green} Checking repo {pos}/{len}: {msg}";
