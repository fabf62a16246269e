//! Test scenario configuration types
//!
//! Defines the data structures for deserializing YAML test scenarios.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::common::config::{Config, TransportSecurity};

/// A complete test scenario loaded from a YAML file
#[derive(Deserialize, Debug)]
pub struct TestScenario {
    /// Name of the test scenario
    pub name: String,
    /// Optional description of what the test verifies
    pub description: Option<String>,
    /// Overrides for the configured agent
    pub agent: Option<AgentOverride>,
    /// Overrides for the configured endpoint
    pub endpoint: Option<EndpointOverride>,
    /// The sequence of test steps to execute
    pub steps: Vec<TestStep>,
}

impl TestScenario {
    /// Apply the scenario's overrides on top of `config`
    ///
    /// Relative program and working directory paths are resolved against
    /// `scenario_dir`.
    pub fn apply_to(&self, config: &mut Config, scenario_dir: &Path) {
        if let Some(agent) = &self.agent {
            if let Some(program) = &agent.program {
                config.agent.program = resolve(scenario_dir, program);
            }
            if let Some(args) = &agent.args {
                config.agent.args = args.clone();
            }
            if let Some(dir) = &agent.working_dir {
                config.agent.working_dir = Some(resolve(scenario_dir, dir));
            }
            if let Some(marker) = &agent.readiness_marker {
                config.agent.readiness_marker = Some(marker.clone());
            }
            if let Some(build) = &agent.build {
                config.agent.build = Some(build.clone());
            }
            if let Some(secs) = agent.readiness_secs {
                config.timeouts.readiness_secs = secs;
            }
        }

        if let Some(endpoint) = &self.endpoint {
            if let Some(address) = &endpoint.address {
                config.endpoint.address = address.clone();
            }
            if let Some(security) = endpoint.security {
                config.endpoint.security = security;
            }
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    // Bare program names are looked up on PATH, not next to the scenario.
    if path.is_relative() && path.components().count() > 1 {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

/// Agent fields a scenario may override
#[derive(Deserialize, Debug, Default)]
pub struct AgentOverride {
    pub program: Option<PathBuf>,
    pub args: Option<Vec<String>>,
    pub working_dir: Option<PathBuf>,
    /// Empty string disables the readiness wait
    pub readiness_marker: Option<String>,
    /// Shell command run before the agent is spawned
    pub build: Option<String>,
    pub readiness_secs: Option<u64>,
}

/// Endpoint fields a scenario may override
#[derive(Deserialize, Debug, Default)]
pub struct EndpointOverride {
    pub address: Option<String>,
    pub security: Option<TransportSecurity>,
}

/// A single test step in the execution flow
#[derive(Deserialize, Debug)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Stream the served chains
    ListChains {
        /// Chain type filter
        #[serde(rename = "type")]
        chain_type: Option<String>,
        expect: Option<ListChainsExpectation>,
    },
    /// Look up one chain
    GetChain {
        #[serde(rename = "type")]
        chain_type: String,
        network: String,
        expect: Option<GetChainExpectation>,
    },
    /// Stream a block range and collect it
    ListBlocks {
        /// Chain as `TYPE:NETWORK`
        chain: String,
        start: u64,
        count: u64,
        expect: Option<ListBlocksExpectation>,
    },
    /// Look up a currency
    GetCurrency {
        chain: String,
        id: String,
        expect: Option<GetCurrencyExpectation>,
    },
    /// Build an unsigned transfer
    CreateTransfer {
        chain: String,
        from: String,
        to: String,
        currency: String,
        amount: u64,
        expect: Option<CreateTransferExpectation>,
    },
}

impl TestStep {
    /// Substring the step's call is expected to fail with, if any
    pub fn expected_error(&self) -> Option<&str> {
        let expected = match self {
            TestStep::ListChains { expect, .. } => expect.as_ref().and_then(|e| e.error_contains.as_ref()),
            TestStep::GetChain { expect, .. } => expect.as_ref().and_then(|e| e.error_contains.as_ref()),
            TestStep::ListBlocks { expect, .. } => expect.as_ref().and_then(|e| e.error_contains.as_ref()),
            TestStep::GetCurrency { expect, .. } => expect.as_ref().and_then(|e| e.error_contains.as_ref()),
            TestStep::CreateTransfer { expect, .. } => expect.as_ref().and_then(|e| e.error_contains.as_ref()),
        };
        expected.map(String::as_str)
    }
}

/// Expectations for a list_chains step
#[derive(Deserialize, Debug, Default)]
pub struct ListChainsExpectation {
    /// Expected number of chains
    pub count: Option<usize>,
    /// Substring the call must fail with
    pub error_contains: Option<String>,
}

/// Expectations for a get_chain step
#[derive(Deserialize, Debug, Default)]
pub struct GetChainExpectation {
    /// Expected network of the returned chain
    pub network: Option<String>,
    pub error_contains: Option<String>,
}

/// Expectations for a list_blocks step
#[derive(Deserialize, Debug, Default)]
pub struct ListBlocksExpectation {
    /// Expected number of blocks
    pub count: Option<usize>,
    /// Expected block numbers, in order
    pub numbers: Option<Vec<u64>>,
    /// Substring the stream must fail with
    pub error_contains: Option<String>,
}

/// Expectations for a get_currency step
#[derive(Deserialize, Debug, Default)]
pub struct GetCurrencyExpectation {
    pub symbol: Option<String>,
    pub decimals: Option<u32>,
    pub error_contains: Option<String>,
}

/// Expectations for a create_transfer step
#[derive(Deserialize, Debug, Default)]
pub struct CreateTransferExpectation {
    pub error_contains: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK_SCENARIO: &str = r#"
name: Block service
description: Streams a block range
agent:
  program: ./bin/agent-eth
  readiness_marker: "API listening at"
endpoint:
  address: "127.0.0.1:50051"
  security: insecure
steps:
  - action: list_blocks
    chain: "ETH:SEPOLIA"
    start: 0
    count: 2
    expect:
      count: 2
      numbers: [0, 1]
  - action: list_blocks
    chain: "ETH:SEPOLIA"
    start: 3
    count: 1
    expect:
      error_contains: "not found"
  - action: get_chain
    type: ETH
    network: WRONG
    expect:
      error_contains: "chain not supported"
"#;

    #[test]
    fn test_parse_scenario() {
        let scenario: TestScenario = serde_yaml::from_str(BLOCK_SCENARIO).unwrap();
        assert_eq!(scenario.name, "Block service");
        assert_eq!(scenario.steps.len(), 3);

        match &scenario.steps[0] {
            TestStep::ListBlocks { start, count, expect, .. } => {
                assert_eq!((*start, *count), (0, 2));
                assert_eq!(expect.as_ref().unwrap().numbers, Some(vec![0, 1]));
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert_eq!(scenario.steps[1].expected_error(), Some("not found"));
        assert!(matches!(&scenario.steps[2], TestStep::GetChain { chain_type, .. } if chain_type == "ETH"));
    }

    #[test]
    fn test_overrides_resolve_against_scenario_dir() {
        let scenario: TestScenario = serde_yaml::from_str(BLOCK_SCENARIO).unwrap();
        let mut config = Config::default();
        scenario.apply_to(&mut config, Path::new("/suites"));

        assert_eq!(config.agent.program, PathBuf::from("/suites/./bin/agent-eth"));
        assert_eq!(config.endpoint.address, "127.0.0.1:50051");
        assert_eq!(config.endpoint.security, TransportSecurity::Insecure);
        // Untouched fields keep the configured defaults.
        assert_eq!(config.timeouts.readiness_secs, 60);
    }

    #[test]
    fn test_bare_program_name_is_not_resolved() {
        assert_eq!(resolve(Path::new("/suites"), Path::new("agent-eth")), PathBuf::from("agent-eth"));
    }

    #[test]
    fn test_unknown_action_rejected() {
        let yaml = "name: x\nsteps:\n  - action: teleport\n";
        assert!(serde_yaml::from_str::<TestScenario>(yaml).is_err());
    }
}
