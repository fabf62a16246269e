//! CLI command handling
//!
//! Dispatches CLI commands and formats output.

use std::time::Duration;

use colored::Colorize;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::supervisor::{SpawnSpec, Supervisor, SupervisorOptions};
use crate::testing;

/// How often `supervise` checks whether the agent died on its own
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Run {
            path,
            verbose,
            json,
        } => {
            let result = testing::run_scenario(&path, &config, verbose).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if let Some(error) = &result.error {
                println!(
                    "\n{} {} ({}/{} steps): {}\n",
                    "✗".red().bold(),
                    "Test Failed".red().bold(),
                    result.steps_run,
                    result.steps_total,
                    error
                );
            }

            if result.passed {
                Ok(())
            } else {
                Err(Error::TestAssertion(format!(
                    "scenario '{}' failed",
                    result.name
                )))
            }
        }

        Commands::Supervise {
            marker,
            timeout,
            command,
        } => {
            let mut spec = match command.split_first() {
                Some((program, args)) => {
                    let mut spec = SpawnSpec::new(program).args(args.iter().cloned());
                    if let Some(marker) = config.readiness_marker() {
                        spec = spec.readiness_marker(marker);
                    }
                    spec
                }
                None => SpawnSpec::from_config(&config),
            };
            if let Some(marker) = marker {
                spec = spec.readiness_marker(marker);
            }

            let mut options = SupervisorOptions::from_config(&config);
            if let Some(secs) = timeout {
                options.readiness_timeout = Some(Duration::from_secs(secs));
            }

            supervise(spec, options).await
        }

        Commands::Config => {
            let path = paths::config_path();
            match &path {
                Some(path) if path.exists() => println!("# {}", path.display()),
                Some(path) => println!("# {} (not found, using defaults)", path.display()),
                None => println!("# no config directory, using defaults"),
            }
            let text = toml::to_string_pretty(&config)
                .map_err(|e| Error::Config(format!("Failed to serialize configuration: {}", e)))?;
            print!("{}", text);
            Ok(())
        }
    }
}

async fn supervise(spec: SpawnSpec, options: SupervisorOptions) -> Result<()> {
    let mut supervisor = Supervisor::new(spec, options);

    println!(
        "{} {}",
        "Starting".cyan(),
        supervisor.spec().program.display()
    );
    supervisor.start().await?;

    print!("{} Agent ready", "✓".green());
    if let Some(pid) = supervisor.pid() {
        print!(" (pid {})", pid);
    }
    println!();
    if let Some(address) = supervisor.advertised_address() {
        println!("  Listening at {}", address);
    }
    println!("  Press Ctrl-C to stop");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut poll = tokio::time::interval(EXIT_POLL_INTERVAL);
    let code = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                println!("\n{}", "Stopping agent...".cyan());
                break supervisor.stop().await?;
            }
            _ = poll.tick() => {
                if let Some(code) = supervisor.poll_exit().await? {
                    println!("{} Agent exited on its own", "✗".red());
                    break code;
                }
            }
        }
    };

    println!("Agent exited with code {}", code);
    Ok(())
}
