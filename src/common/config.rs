//! Configuration file handling

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// How to build and launch the agent under test
    #[serde(default)]
    pub agent: AgentConfig,

    /// gRPC endpoint the agent serves
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Output buffer settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Agent process configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    /// Path to the agent executable
    #[serde(default = "default_program")]
    pub program: PathBuf,

    /// Arguments passed to the agent
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Working directory for the build step and the agent
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Substring that marks the agent as ready; empty disables the wait
    #[serde(default = "default_marker")]
    pub readiness_marker: Option<String>,

    /// Shell command run to completion before spawning
    #[serde(default)]
    pub build: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            working_dir: None,
            readiness_marker: default_marker(),
            build: None,
        }
    }
}

fn default_program() -> PathBuf {
    PathBuf::from("agent-eth")
}

fn default_args() -> Vec<String> {
    ["-c", "./ubt-config.yaml", "--log", "DEBUG"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_marker() -> Option<String> {
    Some("API listening at".to_string())
}

/// Channel security for the endpoint
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportSecurity {
    /// TLS with the platform's root certificates
    #[default]
    Tls,
    /// Plaintext HTTP/2, only for local test endpoints
    Insecure,
}

/// Endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// host:port of the agent's gRPC listener; empty uses the address the
    /// agent prints on its readiness line
    #[serde(default = "default_address")]
    pub address: String,

    /// Channel security mode
    #[serde(default)]
    pub security: TransportSecurity,

    /// Timeout for establishing the connection
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            security: TransportSecurity::default(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl EndpointConfig {
    /// Plaintext endpoint for a local agent
    pub fn insecure(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            security: TransportSecurity::Insecure,
            ..Default::default()
        }
    }

    /// Full URI including the scheme implied by the security mode
    pub fn uri(&self) -> String {
        if self.address.contains("://") {
            return self.address.clone();
        }
        match self.security {
            TransportSecurity::Tls => format!("https://{}", self.address),
            TransportSecurity::Insecure => format!("http://{}", self.address),
        }
    }
}

fn default_address() -> String {
    "localhost:50051".to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

/// Timeout settings in seconds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Timeouts {
    /// Upper bound on waiting for the readiness marker
    #[serde(default = "default_readiness")]
    pub readiness_secs: u64,

    /// Grace period between the termination request and a forced kill
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            readiness_secs: default_readiness(),
            stop_grace_secs: default_stop_grace(),
        }
    }
}

impl Timeouts {
    pub fn readiness(&self) -> Duration {
        Duration::from_secs(self.readiness_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

fn default_readiness() -> u64 {
    60
}
fn default_stop_grace() -> u64 {
    10
}

/// Output buffer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Maximum number of agent output lines kept in memory
    #[serde(default = "default_max_lines")]
    pub max_buffered_lines: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_buffered_lines: default_max_lines(),
        }
    }
}

fn default_max_lines() -> usize {
    10_000
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit path
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    /// Readiness marker with the empty string normalised to "no marker"
    pub fn readiness_marker(&self) -> Option<&str> {
        self.agent
            .readiness_marker
            .as_deref()
            .filter(|marker| !marker.is_empty())
    }
}
