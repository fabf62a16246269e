//! Account manager
//!
//! Served by a separate account-manager process in production; the
//! harness reaches it over the same channel when both share a listener.

use tonic::Status;

use super::proto::{
    CreateAccountRequest, CreateAccountResponse, GetStoredAccountRequest, GetStoredAccountResponse,
    ListAccountsRequest, ListAccountsResponse, SignPayloadRequest, SignPayloadResponse,
};
use super::transport::TransportRef;

const CREATE_ACCOUNT: &str = "/ubt.am.UbtAccountManager/CreateAccount";
const GET_ACCOUNT: &str = "/ubt.am.UbtAccountManager/GetAccount";
const LIST_ACCOUNTS: &str = "/ubt.am.UbtAccountManager/ListAccounts";
const SIGN_PAYLOAD: &str = "/ubt.am.UbtAccountManager/SignPayload";

/// Handle for the account manager service
#[derive(Debug, Clone)]
pub struct AccountManager {
    transport: TransportRef,
}

impl AccountManager {
    pub(crate) fn new(transport: TransportRef) -> Self {
        Self { transport }
    }

    pub async fn create_account(&self, request: CreateAccountRequest) -> Result<CreateAccountResponse, Status> {
        self.transport.get()?.unary(CREATE_ACCOUNT, request).await
    }

    pub async fn get_account(&self, request: GetStoredAccountRequest) -> Result<GetStoredAccountResponse, Status> {
        self.transport.get()?.unary(GET_ACCOUNT, request).await
    }

    pub async fn list_accounts(&self, request: ListAccountsRequest) -> Result<ListAccountsResponse, Status> {
        self.transport.get()?.unary(LIST_ACCOUNTS, request).await
    }

    /// Sign arbitrary bytes with a stored key
    pub async fn sign_payload(&self, request: SignPayloadRequest) -> Result<SignPayloadResponse, Status> {
        self.transport.get()?.unary(SIGN_PAYLOAD, request).await
    }
}
