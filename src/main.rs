//! UBT agent test harness
//!
//! Starts the agent under test, waits until it reports readiness and runs
//! YAML scenarios against its gRPC API.

use std::path::PathBuf;

use clap::Parser;
use commands::Commands;
use ubt_harness::common::config::Config;
use ubt_harness::common::logging;
use ubt_harness::{cli, commands};

#[derive(Parser)]
#[command(name = "ubt-harness", about = "Test harness for UBT chain agents")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let _guard = logging::init_cli(cli.log_file.as_deref());

    let config = match cli.config.as_deref() {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    };

    let result = match config {
        Ok(config) => cli::dispatch(cli.command, config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
