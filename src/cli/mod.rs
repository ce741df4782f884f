//! CLI module for the qclife tool.
//!
//! This module provides the command-line interface for creating, reading,
//! updating and deleting QingCloud resources.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
