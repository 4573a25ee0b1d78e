//! Command-line interface for bookwise.
//!
//! Provides commands for running the generation pipeline, ingesting books
//! from metadata sources, inspecting stats, and applying migrations.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
