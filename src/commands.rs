//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a YAML test scenario against a freshly started agent
    Run {
        /// Path to the YAML test scenario file
        path: PathBuf,

        /// Verbose output
        #[arg(long, short)]
        verbose: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start the configured agent and keep it running until Ctrl-C
    Supervise {
        /// Readiness marker (overrides the configured one; empty disables the wait)
        #[arg(long)]
        marker: Option<String>,

        /// Readiness timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Program and arguments to run instead of the configured agent
        #[arg(last = true)]
        command: Vec<String>,
    },

    /// Show the effective configuration
    Config,
}
