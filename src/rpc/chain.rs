//! Chain discovery

use tonic::codec::Streaming;
use tonic::Status;

use super::proto::{Chain, ChainId, ListChainsRequest};
use super::transport::TransportRef;

const LIST_CHAINS: &str = "/ubt.services.UbtChainService/ListChains";
const GET_CHAIN: &str = "/ubt.services.UbtChainService/GetChain";

/// Handle for the agent's chain service
#[derive(Debug, Clone)]
pub struct ChainService {
    transport: TransportRef,
}

impl ChainService {
    pub(crate) fn new(transport: TransportRef) -> Self {
        Self { transport }
    }

    /// Stream every chain the agent serves, optionally filtered by type
    pub async fn list_chains(&self, request: ListChainsRequest) -> Result<Streaming<Chain>, Status> {
        self.transport
            .get()?
            .server_streaming(LIST_CHAINS, request)
            .await
    }

    /// Look up one chain; unknown ids are rejected by the agent
    pub async fn get_chain(&self, id: ChainId) -> Result<Chain, Status> {
        self.transport.get()?.unary(GET_CHAIN, id).await
    }
}
