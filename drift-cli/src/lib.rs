//! # Drift CLI Library
//!
//! Command surface for the `drift` tool: argument parsing, path validation,
//! and rendering of status reports, tables, and progress.

pub mod cli;
pub mod consts;
pub mod utils;
