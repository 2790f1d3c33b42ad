//! Command-line interface for augustus.
//!
//! Provides the `scan`, `list` and `version` commands.

mod commands;

pub use commands::{exit_code, parse_cli, run_with_cli, Cli, Commands, ScanArgs};
