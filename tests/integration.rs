//! End-to-end integration tests for the harness
//!
//! These tests drive the real supervisor against the `mock_agent` binary,
//! which prints a readiness line after a configurable delay and exits on
//! SIGTERM, and run the CLI binary for the commands that need no agent.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use ubt_harness::common::config::{Config, EndpointConfig};
use ubt_harness::supervisor::{
    BuildStep, SpawnSpec, StreamName, Supervisor, SupervisorOptions, SupervisorState,
    EXIT_CODE_UNKNOWN,
};
use ubt_harness::testing::{run_scenario, AgentFixture};
use ubt_harness::Error;

const MARKER: &str = "API listening at";

fn mock_agent() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_mock_agent"))
}

fn harness_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ubt-harness"))
}

/// Spawn spec for the mock agent waiting on the default marker
fn mock(args: &[&str]) -> SpawnSpec {
    SpawnSpec::new(mock_agent())
        .args(args.iter().copied())
        .readiness_marker(MARKER)
}

fn options(readiness: Duration, grace: Duration) -> SupervisorOptions {
    SupervisorOptions {
        readiness_timeout: Some(readiness),
        stop_grace: grace,
        ..Default::default()
    }
}

fn default_options() -> SupervisorOptions {
    options(Duration::from_secs(10), Duration::from_secs(5))
}

/// Config that launches the mock agent and points the client at a port
/// nothing listens on
fn mock_config(args: &[&str]) -> Config {
    let mut config = Config::default();
    config.agent.program = mock_agent();
    config.agent.args = args.iter().map(|s| s.to_string()).collect();
    config.agent.readiness_marker = Some(MARKER.to_string());
    config.timeouts.readiness_secs = 10;
    config.timeouts.stop_grace_secs = 5;
    config.endpoint = EndpointConfig::insecure("127.0.0.1:9");
    config.endpoint.connect_timeout_secs = 1;
    config
}

fn write_scenario(dir: &Path, yaml: &str) -> PathBuf {
    let path = dir.join("scenario.yaml");
    fs::write(&path, yaml).expect("Failed to write scenario");
    path
}

// === Supervisor ===

#[tokio::test]
async fn test_delayed_marker_becomes_ready() {
    let mut supervisor = Supervisor::new(mock(&["--delay-ms", "200"]), default_options());

    let started = Instant::now();
    supervisor.start().await.expect("agent should become ready");

    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(supervisor.state(), SupervisorState::Ready);
    assert!(supervisor.pid().is_some());

    let signal = supervisor.ready_signal().expect("ready signal recorded");
    assert_eq!(signal.stream, StreamName::Stdout);
    assert_eq!(supervisor.advertised_address().as_deref(), Some("127.0.0.1:50051"));

    let code = supervisor.stop().await.unwrap();
    assert_eq!(code, 0);
    assert_eq!(supervisor.state(), SupervisorState::Terminated);
    assert_eq!(supervisor.exit_code(), Some(0));
}

#[tokio::test]
async fn test_marker_on_stderr() {
    let mut supervisor = Supervisor::new(mock(&["--stderr", "--delay-ms", "50"]), default_options());

    supervisor.start().await.unwrap();
    assert_eq!(
        supervisor.ready_signal().map(|s| s.stream),
        Some(StreamName::Stderr)
    );

    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn test_output_is_captured_from_both_streams() {
    let mut supervisor = Supervisor::new(mock(&["--noise", "2"]), default_options());
    supervisor.start().await.unwrap();
    supervisor.stop().await.unwrap();

    let output = supervisor.output();
    assert!(output
        .iter()
        .any(|l| l.stream == StreamName::Stdout && l.line.contains("booting")));
    assert!(output
        .iter()
        .any(|l| l.stream == StreamName::Stderr && l.line.contains("loading config")));
    assert!(output.iter().any(|l| l.line.contains("shutting down")));
}

#[tokio::test]
async fn test_exit_before_ready() {
    let mut supervisor = Supervisor::new(mock(&["--fail-with", "3"]), default_options());

    let err = supervisor.start().await.unwrap_err();
    match err {
        Error::ProcessExitedBeforeReady { code } => assert_eq!(code, 3),
        other => panic!("expected ProcessExitedBeforeReady, got {other}"),
    }
    assert_eq!(supervisor.state(), SupervisorState::Terminated);
    assert_eq!(supervisor.exit_code(), Some(3));

    // Nothing left to stop
    assert!(matches!(
        supervisor.stop().await.unwrap_err(),
        Error::IllegalState { .. }
    ));
}

#[tokio::test]
async fn test_readiness_timeout_terminates_agent() {
    let mut supervisor = Supervisor::new(
        mock(&["--silent"]),
        options(Duration::from_millis(300), Duration::from_secs(5)),
    );

    let started = Instant::now();
    let err = supervisor.start().await.unwrap_err();
    assert!(matches!(err, Error::ReadinessTimeout { .. }), "{err}");
    assert!(started.elapsed() >= Duration::from_millis(300));

    assert_eq!(supervisor.state(), SupervisorState::Terminated);
    assert!(supervisor.pid().is_some());
    // The agent honoured SIGTERM, so its own exit code was recorded
    assert_eq!(supervisor.exit_code(), Some(0));
}

#[tokio::test]
async fn test_stop_reports_agent_exit_code() {
    let mut supervisor = Supervisor::new(mock(&["--exit-code", "7"]), default_options());
    supervisor.start().await.unwrap();

    assert_eq!(supervisor.stop().await.unwrap(), 7);
    assert_eq!(supervisor.exit_code(), Some(7));
}

#[cfg(unix)]
#[tokio::test]
async fn test_forced_kill_after_grace_period() {
    let grace = Duration::from_millis(300);
    let mut supervisor = Supervisor::new(
        mock(&["--ignore-sigterm"]),
        options(Duration::from_secs(10), grace),
    );
    supervisor.start().await.unwrap();

    let started = Instant::now();
    let code = supervisor.stop().await.unwrap();

    assert!(started.elapsed() >= grace);
    assert_eq!(code, EXIT_CODE_UNKNOWN);
    assert_eq!(supervisor.state(), SupervisorState::Terminated);
    assert!(supervisor.output().iter().any(|l| l.line.contains("ignoring termination request")));
}

#[tokio::test]
async fn test_double_start_and_double_stop_are_illegal() {
    let mut supervisor = Supervisor::new(mock(&[]), default_options());
    supervisor.start().await.unwrap();

    let err = supervisor.start().await.unwrap_err();
    assert!(matches!(err, Error::IllegalState { .. }), "{err}");
    assert_eq!(supervisor.state(), SupervisorState::Ready);

    supervisor.stop().await.unwrap();
    let err = supervisor.stop().await.unwrap_err();
    assert!(matches!(err, Error::IllegalState { .. }), "{err}");

    // A terminated supervisor cannot be restarted either
    assert!(supervisor.start().await.is_err());
}

#[tokio::test]
async fn test_unexpected_exit_is_observed() {
    let mut supervisor = Supervisor::new(
        mock(&["--exit-after-ms", "100", "--exit-code", "5"]),
        default_options(),
    );
    supervisor.start().await.unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let code = loop {
        if let Some(code) = supervisor.poll_exit().await.unwrap() {
            break code;
        }
        assert!(Instant::now() < deadline, "agent did not exit");
        tokio::time::sleep(Duration::from_millis(50)).await;
    };

    assert_eq!(code, 5);
    assert_eq!(supervisor.state(), SupervisorState::Terminated);
    assert!(!supervisor.is_running());
}

#[cfg(unix)]
#[tokio::test]
async fn test_build_step_runs_before_spawn() {
    let dir = tempfile::tempdir().unwrap();
    let built = dir.path().join("built");

    let spec = mock(&[]).build(BuildStep::new(format!("touch '{}'", built.display())));
    let mut supervisor = Supervisor::new(spec, default_options());

    supervisor.start().await.unwrap();
    assert!(built.exists());
    supervisor.stop().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_failed_build_never_spawns() {
    let dir = tempfile::tempdir().unwrap();
    let spawned = dir.path().join("spawned");

    // The agent would create the file if it were ever spawned
    let spec = SpawnSpec::new("sh")
        .args(["-c".to_string(), format!("touch '{}'", spawned.display())])
        .build(BuildStep::new("echo compiling; exit 2"));
    let mut supervisor = Supervisor::new(spec, default_options());

    let err = supervisor.start().await.unwrap_err();
    assert!(matches!(err, Error::BuildFailed { code: 2, .. }), "{err}");
    assert!(!spawned.exists());
    assert_eq!(supervisor.state(), SupervisorState::Terminated);
}

// === Fixture and scenario runner ===

#[tokio::test]
async fn test_fixture_start_and_teardown() {
    let config = mock_config(&["--exit-code", "4"]);
    let fixture = AgentFixture::start(&config).await.unwrap();

    assert_eq!(fixture.supervisor().state(), SupervisorState::Ready);
    assert_eq!(fixture.client().uri(), "http://127.0.0.1:9");

    assert_eq!(fixture.teardown().await.unwrap(), 4);
}

#[tokio::test]
async fn test_fixture_uses_advertised_address() {
    let mut config = mock_config(&["--marker", "API listening at [::]:50777"]);
    config.endpoint.address = String::new();

    let fixture = AgentFixture::start(&config).await.unwrap();
    assert_eq!(fixture.client().uri(), "http://127.0.0.1:50777");
    fixture.teardown().await.unwrap();
}

#[tokio::test]
async fn test_fixture_reports_startup_failure() {
    let config = mock_config(&["--fail-with", "9"]);
    let err = AgentFixture::start(&config).await.err().expect("start should fail");
    assert!(matches!(err, Error::ProcessExitedBeforeReady { code: 9 }), "{err}");
}

#[tokio::test]
async fn test_scenario_without_steps_passes() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_scenario(
        dir.path(),
        "name: Agent lifecycle\ndescription: start and stop only\nsteps: []\n",
    );

    let result = run_scenario(&path, &mock_config(&["--delay-ms", "50"]), false)
        .await
        .unwrap();

    assert!(result.passed, "{:?}", result.error);
    assert_eq!(result.steps_total, 0);
    assert_eq!(result.agent_exit_code, Some(0));
}

#[tokio::test]
async fn test_failing_step_still_tears_down_agent() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_scenario(
        dir.path(),
        r#"
name: Chain service
steps:
  - action: list_chains
    expect:
      count: 1
  - action: get_chain
    type: ETH
    network: SEPOLIA
"#,
    );

    let result = run_scenario(&path, &mock_config(&[]), false).await.unwrap();

    assert!(!result.passed);
    assert_eq!(result.steps_run, 1);
    assert_eq!(result.steps_total, 2);
    assert!(result.error.is_some());
    assert_eq!(result.agent_exit_code, Some(0));
}

#[tokio::test]
async fn test_scenario_passes_against_serving_agent() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_scenario(
        dir.path(),
        r#"
name: Served chain
steps:
  - action: list_chains
    type: ETH
    expect:
      count: 2
  - action: get_chain
    type: ETH
    network: SEPOLIA
    expect:
      network: SEPOLIA
  - action: get_chain
    type: BTC
    network: MAINNET
    expect:
      error_contains: "not supported"
  - action: list_blocks
    chain: ETH:SEPOLIA
    start: 0
    count: 2
    expect:
      count: 2
      numbers: [0, 1]
  - action: list_blocks
    chain: ETH:SEPOLIA
    start: 3
    count: 2
    expect:
      error_contains: "beyond chain head"
  - action: get_currency
    chain: ETH:SEPOLIA
    id: ETH
    expect:
      symbol: ETH
      decimals: 18
  - action: create_transfer
    chain: ETH:SEPOLIA
    from: "0x1111111111111111111111111111111111111111"
    to: "0x2222222222222222222222222222222222222222"
    currency: ETH
    amount: 10000
"#,
    );

    // Connect to whatever port the agent advertises
    let mut config = mock_config(&["--serve"]);
    config.endpoint.address = String::new();

    let result = run_scenario(&path, &config, true).await.unwrap();

    assert!(result.passed, "{:?}", result.error);
    assert_eq!(result.steps_run, 7);
    assert_eq!(result.steps_total, 7);
    assert_eq!(result.agent_exit_code, Some(0));
}

#[tokio::test]
async fn test_scenario_expectation_mismatch_against_serving_agent() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_scenario(
        dir.path(),
        r#"
name: Wrong block numbers
steps:
  - action: list_blocks
    chain: ETH:SEPOLIA
    start: 1
    count: 2
    expect:
      numbers: [0, 1]
"#,
    );

    let mut config = mock_config(&["--serve"]);
    config.endpoint.address = String::new();

    let result = run_scenario(&path, &config, false).await.unwrap();

    assert!(!result.passed);
    assert!(result.error.unwrap().contains("[1, 2]"));
    assert_eq!(result.agent_exit_code, Some(0));
}

#[tokio::test]
async fn test_scenario_overrides_agent() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        "name: Override\nagent:\n  program: '{}'\n  args: ['--fail-with', '6']\nsteps: []\n",
        mock_agent().display()
    );
    let path = write_scenario(dir.path(), &yaml);

    // The configured program does not exist; the scenario's must win
    let mut config = mock_config(&[]);
    config.agent.program = PathBuf::from("/nonexistent/agent-eth");

    let result = run_scenario(&path, &config, false).await.unwrap();
    assert!(!result.passed);
    assert!(result.error.unwrap().contains("code 6"));
}

#[tokio::test]
async fn test_missing_scenario_is_an_error() {
    let result = run_scenario(Path::new("/nonexistent/scenario.yaml"), &Config::default(), false).await;
    assert!(matches!(result, Err(Error::FileRead { .. })));
}

// === CLI ===

#[test]
fn test_config_command_prints_effective_config() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(
        &config_path,
        "[endpoint]\naddress = \"10.0.0.5:50051\"\nsecurity = \"insecure\"\n",
    )
    .unwrap();

    let output = Command::new(harness_binary())
        .arg("--config")
        .arg(&config_path)
        .arg("config")
        .output()
        .expect("Failed to run harness");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("10.0.0.5:50051"), "{stdout}");
    assert!(stdout.contains("insecure"), "{stdout}");
    assert!(stdout.contains("readiness_secs = 60"), "{stdout}");
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(&config_path, "[endpoint]\nsecurity = \"maybe\"\n").unwrap();

    let output = Command::new(harness_binary())
        .arg("--config")
        .arg(&config_path)
        .arg("config")
        .output()
        .expect("Failed to run harness");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error:"));
}

#[test]
fn test_run_command_exits_non_zero_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = write_scenario(
        dir.path(),
        &format!(
            "name: Early exit\nagent:\n  program: '{}'\n  args: ['--fail-with', '2']\nsteps: []\n",
            mock_agent().display()
        ),
    );

    let output = Command::new(harness_binary())
        .args(["run", "--json"])
        .arg(&scenario)
        .output()
        .expect("Failed to run harness");

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json_start = stdout.find('{').expect("JSON result in output");
    let result: serde_json::Value = serde_json::from_str(&stdout[json_start..]).unwrap();
    assert_eq!(result["passed"], false);
    assert_eq!(result["name"], "Early exit");
}

#[test]
#[ignore = "requires agent-eth and a synced node"]
fn test_block_service_scenario() {
    let scenario = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("block_service.yaml");

    let status = Command::new(harness_binary())
        .args(["run", "--verbose"])
        .arg(&scenario)
        .status()
        .expect("Failed to run harness");

    assert!(status.success());
}
