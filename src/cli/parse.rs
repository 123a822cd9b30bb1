//! CLI parse: clap types for branchlog. No behavior; definitions only.

use crate::backend::BackendKind;
use crate::session::ShellCommand;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// branchlog CLI - branching, mergeable command log
#[derive(Parser, Debug)]
#[command(name = "branchlog")]
#[command(about = "Branching, mergeable command log with push/fetch between clones")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Branch to open on (path from the root or branch id)
    #[arg(long)]
    pub branch: Option<String>,

    /// Output format for command results
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new store in the workspace
    Init {
        /// Store name (defaults to the workspace directory name)
        #[arg(long)]
        name: Option<String>,

        /// Storage backend (sled, file)
        #[arg(long)]
        backend: Option<BackendKind>,
    },
    /// Create a new workspace holding a clone of another workspace's store
    Clone {
        /// Workspace of the store to clone
        upstream: PathBuf,

        /// Directory for the new workspace
        path: PathBuf,

        /// Name for the clone (defaults to the directory name)
        #[arg(long)]
        name: Option<String>,

        /// Storage backend for the clone (sled, file)
        #[arg(long)]
        backend: Option<BackendKind>,
    },
    /// Interactive shell; `@file` runs the commands in a file instead
    Shell {
        script: Option<String>,
    },
    #[command(flatten)]
    Session(ShellCommand),
}
