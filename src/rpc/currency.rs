use tonic::Status;

use super::proto::{Currency, GetCurrencyRequest};
use super::transport::TransportRef;

const GET_CURRENCY: &str = "/ubt.services.UbtCurrencyService/GetCurrency";

/// Handle for the agent's currency service
#[derive(Debug, Clone)]
pub struct CurrencyService {
    transport: TransportRef,
}

impl CurrencyService {
    pub(crate) fn new(transport: TransportRef) -> Self {
        Self { transport }
    }

    pub async fn get_currency(&self, request: GetCurrencyRequest) -> Result<Currency, Status> {
        self.transport.get()?.unary(GET_CURRENCY, request).await
    }
}
