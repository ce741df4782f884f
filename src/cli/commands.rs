//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CONFIG_ENV_VAR;
use crate::lifecycle::ResourceKind;

/// qclife - Lifecycle orchestration for QingCloud instances and caches.
#[derive(Parser, Debug)]
#[command(name = "qclife")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the provider configuration file.
    #[arg(short, long, global = true, env = CONFIG_ENV_VAR)]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Abort the command after this many seconds.
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a resource manifest without calling the API.
    Validate {
        /// Manifest file.
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Create the resource described by a manifest.
    Create {
        /// Manifest file.
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show the current attributes of a resource.
    Read {
        /// Resource kind.
        #[arg(short, long)]
        kind: ResourceKind,

        /// Resource ID.
        id: String,
    },

    /// Bring an existing resource in line with a manifest.
    Update {
        /// Manifest file.
        #[arg(short, long)]
        file: PathBuf,

        /// Resource ID.
        id: String,
    },

    /// Delete a resource and wait until it is gone.
    Delete {
        /// Resource kind.
        #[arg(short, long)]
        kind: ResourceKind,

        /// Resource ID.
        id: String,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
