//! Test runner implementation
//!
//! Starts the agent, drives its RPC surface through the typed client and
//! checks structured responses rather than log output.

use std::path::Path;

use colored::Colorize;
use serde::Serialize;
use tonic::Status;

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::rpc::proto::{
    ChainId, CreateTransferRequest, CurrencyAmount, GetCurrencyRequest, ListBlocksRequest,
    ListChainsRequest, Uint256,
};
use crate::rpc::{collect_call, UbtClient};

use super::config::{
    GetChainExpectation, GetCurrencyExpectation, ListBlocksExpectation, ListChainsExpectation,
    TestScenario, TestStep,
};
use super::fixture::AgentFixture;

/// Result of a test run
#[derive(Debug, Serialize)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub steps_run: usize,
    pub steps_total: usize,
    pub error: Option<String>,
    /// Exit code reported when the agent was stopped
    pub agent_exit_code: Option<i32>,
}

/// Load a scenario file
pub fn load_scenario(path: &Path) -> Result<TestScenario> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;

    serde_yaml::from_str(&content)
        .map_err(|e| Error::ConfigParse(format!("Failed to parse test scenario: {}", e)))
}

/// Run a test scenario from a YAML file
pub async fn run_scenario(path: &Path, config: &Config, verbose: bool) -> Result<TestResult> {
    let scenario = load_scenario(path)?;
    let steps_total = scenario.steps.len();

    let mut config = config.clone();
    // Absolute, so relative program paths survive the agent's working_dir
    let scenario_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let scenario_dir = scenario_dir
        .canonicalize()
        .unwrap_or_else(|_| scenario_dir.to_path_buf());
    scenario.apply_to(&mut config, &scenario_dir);

    println!(
        "\n{} {}",
        "Running Test:".blue().bold(),
        scenario.name.white().bold()
    );

    if let Some(desc) = &scenario.description {
        println!("  {}", desc.dimmed());
    }

    println!("\n{}", "Starting agent...".cyan());
    if verbose {
        println!(
            "  Program: {}",
            config.agent.program.display().to_string().dimmed()
        );
        if let Some(build) = &config.agent.build {
            println!("  Build: {}", build.dimmed());
        }
        println!("  Endpoint: {}", config.endpoint.uri().dimmed());
    }

    let fixture = match AgentFixture::start(&config).await {
        Ok(fixture) => fixture,
        Err(e) => {
            println!("  {} {}", "✗".red(), e);
            return Ok(TestResult {
                name: scenario.name,
                passed: false,
                steps_run: 0,
                steps_total,
                error: Some(e.to_string()),
                agent_exit_code: None,
            });
        }
    };

    let ready_line = fixture
        .supervisor()
        .ready_signal()
        .map(|signal| format!("{} ({})", signal.line, signal.stream));
    match ready_line {
        Some(line) if verbose => println!("  {} Agent ready: {}", "✓".green(), line.dimmed()),
        _ => println!("  {} Agent ready", "✓".green()),
    }

    println!("\n{}", "Steps:".cyan());

    let mut failure = None;
    let mut steps_run = 0;
    for (i, step) in scenario.steps.iter().enumerate() {
        let step_num = i + 1;
        steps_run = step_num;

        if let Err(e) = execute_step(fixture.client(), step, step_num, verbose).await {
            println!("  {} Step {}: {}", "✗".red(), step_num, e);
            failure = Some(e.to_string());
            break;
        }
    }

    // Cleanup runs regardless of the step outcome
    let agent_exit_code = match fixture.teardown().await {
        Ok(code) => {
            if verbose {
                println!("\n  Agent exited with code {}", code.to_string().dimmed());
            }
            Some(code)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Agent teardown failed");
            None
        }
    };

    let passed = failure.is_none();
    if passed {
        println!(
            "\n{} {}\n",
            "✓".green().bold(),
            "Test Passed".green().bold()
        );
    }

    Ok(TestResult {
        name: scenario.name,
        passed,
        steps_run,
        steps_total,
        error: failure,
        agent_exit_code,
    })
}

/// Execute a single test step
async fn execute_step(client: &UbtClient, step: &TestStep, step_num: usize, verbose: bool) -> Result<()> {
    let expected_error = step.expected_error();

    let summary = match step {
        TestStep::ListChains { chain_type, expect } => {
            execute_list_chains_step(client, chain_type.as_deref(), expect.as_ref(), expected_error).await?
        }
        TestStep::GetChain {
            chain_type,
            network,
            expect,
        } => {
            let id = ChainId::new(chain_type.as_str(), network.as_str());
            execute_get_chain_step(client, id, expect.as_ref(), expected_error).await?
        }
        TestStep::ListBlocks {
            chain,
            start,
            count,
            expect,
        } => {
            let request = ListBlocksRequest::range(parse_chain(chain)?, *start, *count);
            execute_list_blocks_step(client, request, expect.as_ref(), expected_error).await?
        }
        TestStep::GetCurrency { chain, id, expect } => {
            let request = GetCurrencyRequest {
                chain_id: Some(parse_chain(chain)?),
                id: id.clone(),
            };
            execute_get_currency_step(client, request, expect.as_ref(), expected_error).await?
        }
        TestStep::CreateTransfer {
            chain,
            from,
            to,
            currency,
            amount,
            expect: _,
        } => {
            let request = CreateTransferRequest {
                chain_id: Some(parse_chain(chain)?),
                from: from.clone(),
                to: to.clone(),
                amount: Some(CurrencyAmount {
                    currency_id: currency.clone(),
                    value: Some(Uint256::from_u128(u128::from(*amount))),
                }),
            };
            let result = client.construct_service().create_transfer(request).await;
            match check_outcome(result, expected_error)? {
                Some(intent) => format!(
                    "create_transfer ({} bytes to sign)",
                    intent.payload_to_sign.len()
                ),
                None => "create_transfer (expected failure)".to_string(),
            }
        }
    };

    println!("  {} Step {}: {}", "✓".green(), step_num, summary.dimmed());
    if verbose {
        tracing::debug!(step = step_num, "Step passed");
    }
    Ok(())
}

async fn execute_list_chains_step(
    client: &UbtClient,
    chain_type: Option<&str>,
    expect: Option<&ListChainsExpectation>,
    expected_error: Option<&str>,
) -> Result<String> {
    let chains = client.chain_service();
    let request = ListChainsRequest {
        r#type: chain_type.map(str::to_string),
    };
    let result = collect_call(chains.list_chains(request)).await;

    let Some(chains) = check_outcome(result, expected_error)? else {
        return Ok("list_chains (expected failure)".to_string());
    };

    if let Some(expected) = expect.and_then(|e| e.count) {
        if chains.len() != expected {
            return Err(Error::TestAssertion(format!(
                "Expected {} chains, got {}",
                expected,
                chains.len()
            )));
        }
    }

    Ok(format!("list_chains ({} chains)", chains.len()))
}

async fn execute_get_chain_step(
    client: &UbtClient,
    id: ChainId,
    expect: Option<&GetChainExpectation>,
    expected_error: Option<&str>,
) -> Result<String> {
    let label = id.to_string();
    let result = client.chain_service().get_chain(id).await;

    let Some(chain) = check_outcome(result, expected_error)? else {
        return Ok(format!("get_chain {} (expected failure)", label));
    };

    if let Some(expected) = expect.and_then(|e| e.network.as_ref()) {
        let actual = chain.id.as_ref().map(|id| id.network.as_str()).unwrap_or("");
        if actual != expected {
            return Err(Error::TestAssertion(format!(
                "Expected network '{}', got '{}'",
                expected, actual
            )));
        }
    }

    Ok(format!("get_chain {}", label))
}

async fn execute_list_blocks_step(
    client: &UbtClient,
    request: ListBlocksRequest,
    expect: Option<&ListBlocksExpectation>,
    expected_error: Option<&str>,
) -> Result<String> {
    let label = format!(
        "list_blocks from {} count {}",
        request.start_number,
        request.count.unwrap_or_default()
    );
    let blocks = client.block_service();
    let result = collect_call(blocks.list_blocks(request)).await;

    let Some(blocks) = check_outcome(result, expected_error)? else {
        return Ok(format!("{} (expected failure)", label));
    };

    if let Some(exp) = expect {
        if let Some(expected) = exp.count {
            if blocks.len() != expected {
                return Err(Error::TestAssertion(format!(
                    "Expected {} blocks, got {}",
                    expected,
                    blocks.len()
                )));
            }
        }

        if let Some(expected) = &exp.numbers {
            let actual: Vec<u64> = blocks.iter().filter_map(|b| b.number()).collect();
            if &actual != expected {
                return Err(Error::TestAssertion(format!(
                    "Expected block numbers {:?}, got {:?}",
                    expected, actual
                )));
            }
        }
    }

    Ok(format!("{} ({} blocks)", label, blocks.len()))
}

async fn execute_get_currency_step(
    client: &UbtClient,
    request: GetCurrencyRequest,
    expect: Option<&GetCurrencyExpectation>,
    expected_error: Option<&str>,
) -> Result<String> {
    let label = format!("get_currency {}", request.id);
    let result = client.currency_service().get_currency(request).await;

    let Some(currency) = check_outcome(result, expected_error)? else {
        return Ok(format!("{} (expected failure)", label));
    };

    if let Some(exp) = expect {
        if let Some(expected) = &exp.symbol {
            if &currency.symbol != expected {
                return Err(Error::TestAssertion(format!(
                    "Expected symbol '{}', got '{}'",
                    expected, currency.symbol
                )));
            }
        }
        if let Some(expected) = exp.decimals {
            if currency.decimals != expected {
                return Err(Error::TestAssertion(format!(
                    "Expected {} decimals, got {}",
                    expected, currency.decimals
                )));
            }
        }
    }

    Ok(format!("{} ({})", label, currency.symbol))
}

/// Reconcile a call result with the step's error expectation
///
/// Returns the value when success was expected, None when an expected
/// failure occurred, and an error otherwise.
fn check_outcome<T>(result: std::result::Result<T, Status>, expected_error: Option<&str>) -> Result<Option<T>> {
    match (result, expected_error) {
        (Ok(value), None) => Ok(Some(value)),
        (Err(status), None) => Err(Error::Rpc(status)),
        (Ok(_), Some(expected)) => Err(Error::TestAssertion(format!(
            "Expected failure containing '{}', but the call succeeded",
            expected
        ))),
        (Err(status), Some(expected)) => {
            if status.message().contains(expected) {
                Ok(None)
            } else {
                Err(Error::TestAssertion(format!(
                    "Expected error containing '{}', got '{}'",
                    expected,
                    status.message()
                )))
            }
        }
    }
}

fn parse_chain(s: &str) -> Result<ChainId> {
    ChainId::parse(s).ok_or_else(|| {
        Error::ConfigParse(format!("Invalid chain '{}', expected TYPE:NETWORK", s))
    })
}
