//! Test utilities shared across the drift workspace
//!
//! This crate provides on-disk git fixtures:
//! - A throwaway working copy with no remotes ([`GitRepoTestGuard`])
//! - A working copy paired with a bare `origin` ([`OriginFixture`])
//!
//! The clippy dead_code lint is disabled for this crate because test utilities
//! may not be used by all tests, and the compiler cannot detect usage across
//! crate boundaries in development dependencies.

#![allow(dead_code)]

pub mod git;
pub mod remote;

// Re-export commonly used items
pub use git::{GitRepoTestGuard, checkout_branch, create_branch, create_commit, detach_head, merge_branch};
pub use remote::OriginFixture;
