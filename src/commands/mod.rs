//! CLI command implementations for netstat-collector.
//!
//! This module provides implementations for all CLI subcommands:
//! - `once`: Single collection pass
//! - `check`: Source validation

pub mod check;
pub mod once;

// Re-export command functions
pub use check::command_check;
pub use once::command_once;
