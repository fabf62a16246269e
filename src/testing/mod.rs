//! Scenario runner
//!
//! Reads YAML test scenarios, starts the agent through an [`AgentFixture`]
//! and checks its RPC responses against the scenario's expectations.

mod config;
mod fixture;
mod runner;

pub use config::*;
pub use fixture::AgentFixture;
pub use runner::{load_scenario, run_scenario, TestResult};
