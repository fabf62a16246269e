//! gRPC client for the agent under test
//!
//! [`UbtClient`] owns the channel and hands out one handle per service.
//! Streaming calls return a [`tonic::Streaming`]; use [`collect`] or
//! [`collect_call`] to turn one into a vector.

pub mod account;
pub mod block;
pub mod chain;
pub mod collect;
pub mod construct;
pub mod currency;
pub mod proto;
pub mod transport;

pub use account::AccountManager;
pub use block::BlockService;
pub use chain::ChainService;
pub use collect::{collect, collect_call};
pub use construct::ConstructService;
pub use currency::CurrencyService;
pub use transport::UbtClient;
pub use crate::common::config::TransportSecurity;
