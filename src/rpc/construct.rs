//! Transaction construction
//!
//! The usual flow is create, sign (or sign externally), combine, send.

use tonic::Status;

use super::proto::{
    CreateTransferRequest, SignedTransaction, TransactionCombineRequest, TransactionIntent,
    TransactionSendRequest, TransactionSendResponse, TransactionSignRequest,
};
use super::transport::TransportRef;

const CREATE_TRANSFER: &str = "/ubt.services.UbtConstructService/CreateTransfer";
const COMBINE_TRANSACTION: &str = "/ubt.services.UbtConstructService/CombineTransaction";
const SIGN_TRANSACTION: &str = "/ubt.services.UbtConstructService/SignTransaction";
const SEND: &str = "/ubt.services.UbtConstructService/Send";

/// Handle for the agent's construct service
#[derive(Debug, Clone)]
pub struct ConstructService {
    transport: TransportRef,
}

impl ConstructService {
    pub(crate) fn new(transport: TransportRef) -> Self {
        Self { transport }
    }

    /// Build an unsigned transfer
    pub async fn create_transfer(&self, request: CreateTransferRequest) -> Result<TransactionIntent, Status> {
        self.transport.get()?.unary(CREATE_TRANSFER, request).await
    }

    /// Attach externally produced signatures to an intent
    pub async fn combine_transaction(
        &self,
        request: TransactionCombineRequest,
    ) -> Result<SignedTransaction, Status> {
        self.transport.get()?.unary(COMBINE_TRANSACTION, request).await
    }

    /// Sign an intent with a raw private key held by the caller
    pub async fn sign_transaction(&self, request: TransactionSignRequest) -> Result<SignedTransaction, Status> {
        self.transport.get()?.unary(SIGN_TRANSACTION, request).await
    }

    pub async fn send(&self, request: TransactionSendRequest) -> Result<TransactionSendResponse, Status> {
        self.transport.get()?.unary(SEND, request).await
    }
}
