//! Error types for the harness
//!
//! Messages keep the underlying cause intact (exit codes, the remote
//! server's rejection reason) so a failed test case is diagnosable from
//! its output alone.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Supervisor Errors ===
    #[error("Build step '{command}' failed with exit code {code}")]
    BuildFailed { command: String, code: i32 },

    #[error("Failed to spawn agent process: {0}")]
    SpawnFailed(String),

    #[error("Agent process exited with code {code} before it became ready")]
    ProcessExitedBeforeReady { code: i32 },

    #[error("Agent process did not report readiness within {timeout:?} (process was terminated)")]
    ReadinessTimeout { timeout: Duration },

    #[error("Cannot {action} while supervisor is {state}")]
    IllegalState { action: String, state: String },

    // === RPC Errors ===
    #[error("RPC failed ({}): {}", .0.code(), .0.message())]
    Rpc(#[from] tonic::Status),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("Invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Test Errors ===
    #[error("Test assertion failed: {0}")]
    TestAssertion(String),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an illegal state error
    pub fn illegal_state(action: &str, state: impl std::fmt::Display) -> Self {
        Self::IllegalState {
            action: action.to_string(),
            state: state.to_string(),
        }
    }

    /// Create a build failed error
    pub fn build_failed(command: &str, code: i32) -> Self {
        Self::BuildFailed {
            command: command.to_string(),
            code,
        }
    }

    /// The remote status, if this error came from an RPC call
    pub fn as_status(&self) -> Option<&tonic::Status> {
        match self {
            Self::Rpc(status) => Some(status),
            _ => None,
        }
    }
}
