//! Block retrieval

use tonic::codec::Streaming;
use tonic::Status;

use super::proto::{Block, BlockRequest, ListBlocksRequest};
use super::transport::TransportRef;

const GET_BLOCK: &str = "/ubt.services.UbtBlockService/GetBlock";
const LIST_BLOCKS: &str = "/ubt.services.UbtBlockService/ListBlocks";

/// Handle for the agent's block service
#[derive(Debug, Clone)]
pub struct BlockService {
    transport: TransportRef,
}

impl BlockService {
    pub(crate) fn new(transport: TransportRef) -> Self {
        Self { transport }
    }

    pub async fn get_block(&self, request: BlockRequest) -> Result<Block, Status> {
        self.transport.get()?.unary(GET_BLOCK, request).await
    }

    /// Stream blocks in ascending order starting at `start_number`
    ///
    /// A range reaching past the chain head fails mid-stream; pair with
    /// [`collect_call`](crate::rpc::collect_call) to get all-or-nothing results.
    pub async fn list_blocks(&self, request: ListBlocksRequest) -> Result<Streaming<Block>, Status> {
        self.transport
            .get()?
            .server_streaming(LIST_BLOCKS, request)
            .await
    }
}
