//! Command-line interface for mimicforge.
//!
//! Provides the per-stage commands plus the all-encompassing `forge`
//! pipeline command.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
