//! UBT agent test harness
//!
//! Supervises an agent process through its lifecycle, talks to it over a
//! shared gRPC channel and collects streaming responses all-or-nothing.

pub mod cli;
pub mod commands;
pub mod common;
pub mod rpc;
pub mod supervisor;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use rpc::{collect, collect_call, UbtClient};
pub use supervisor::{Supervisor, SupervisorState, EXIT_CODE_UNKNOWN};
