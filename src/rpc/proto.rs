//! Messages of the UBT agent RPC surface
//!
//! Declared by hand with `prost` derives so the crate builds without
//! `protoc`. Field names and numbering follow the agent's schema; only the
//! fields the harness reads or writes are declared; unknown fields are
//! skipped on decode.

use std::fmt;

/// Chain identity, e.g. `ETH` / `SEPOLIA`
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct ChainId {
    #[prost(string, tag = "1")]
    pub r#type: String,
    #[prost(string, tag = "2")]
    pub network: String,
}

impl ChainId {
    pub fn new(chain_type: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            r#type: chain_type.into(),
            network: network.into(),
        }
    }

    /// Parse the `TYPE:NETWORK` form used in configs and scenarios
    pub fn parse(s: &str) -> Option<Self> {
        let (chain_type, network) = s.split_once(':')?;
        if chain_type.is_empty() || network.is_empty() {
            return None;
        }
        Some(Self::new(chain_type, network))
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.r#type, self.network)
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Chain {
    #[prost(message, optional, tag = "1")]
    pub id: Option<ChainId>,
    #[prost(uint32, optional, tag = "2")]
    pub bip44_id: Option<u32>,
    #[prost(bool, tag = "3")]
    pub testnet: bool,
    #[prost(uint64, tag = "4")]
    pub finalized_height: u64,
    #[prost(uint64, tag = "5")]
    pub ms_per_block: u64,
    #[prost(enumeration = "chain::SupportedService", repeated, tag = "6")]
    pub supported_services: Vec<i32>,
}

pub mod chain {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum SupportedService {
        Unspecified = 0,
        Block = 1,
        Construct = 2,
        Currencies = 3,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListChainsRequest {
    /// Restrict to one chain type; unset lists every chain
    #[prost(string, optional, tag = "1")]
    pub r#type: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum FinalityStatus {
    Unspecified = 0,
    Unsafe = 1,
    Safe = 2,
    Finalized = 3,
}

/// Wire-compatible with `google.protobuf.Timestamp`
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct Timestamp {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

/// Unsigned 256-bit integer as minimal big-endian bytes
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct Uint256 {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
}

impl Uint256 {
    pub fn from_u128(value: u128) -> Self {
        let bytes = value.to_be_bytes();
        let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        Self {
            data: bytes[first..].to_vec(),
        }
    }

    /// None when the value does not fit in 128 bits
    pub fn to_u128(&self) -> Option<u128> {
        let significant: &[u8] = match self.data.iter().position(|b| *b != 0) {
            Some(first) => &self.data[first..],
            None => &[],
        };
        if significant.len() > 16 {
            return None;
        }
        Some(significant.iter().fold(0u128, |acc, b| (acc << 8) | u128::from(*b)))
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CurrencyAmount {
    #[prost(string, tag = "1")]
    pub currency_id: String,
    #[prost(message, optional, tag = "2")]
    pub value: Option<Uint256>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Transfer {
    #[prost(bytes = "vec", tag = "1")]
    pub tx_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub op_id: Vec<u8>,
    #[prost(string, tag = "3")]
    pub from: String,
    #[prost(string, tag = "4")]
    pub to: String,
    #[prost(message, optional, tag = "5")]
    pub amount: Option<CurrencyAmount>,
    #[prost(uint32, tag = "6")]
    pub status: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Transaction {
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub block_id: Vec<u8>,
    #[prost(uint32, tag = "3")]
    pub r#type: u32,
    #[prost(string, tag = "4")]
    pub from: String,
    #[prost(string, tag = "5")]
    pub to: String,
    #[prost(message, optional, tag = "6")]
    pub fee: Option<Uint256>,
    #[prost(message, optional, tag = "7")]
    pub amount: Option<Uint256>,
    #[prost(uint32, tag = "8")]
    pub idx: u32,
    #[prost(message, repeated, tag = "9")]
    pub transfers: Vec<Transfer>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlockHeader {
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub number: u64,
    #[prost(bytes = "vec", tag = "3")]
    pub parent_id: Vec<u8>,
    #[prost(message, optional, tag = "4")]
    pub timestamp: Option<Timestamp>,
    #[prost(enumeration = "FinalityStatus", tag = "5")]
    pub finality_status: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Block {
    #[prost(message, optional, tag = "1")]
    pub header: Option<BlockHeader>,
    #[prost(message, repeated, tag = "2")]
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Block number, or None for a header-less block
    pub fn number(&self) -> Option<u64> {
        self.header.as_ref().map(|h| h.number)
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlockRequest {
    #[prost(message, optional, tag = "1")]
    pub chain_id: Option<ChainId>,
    #[prost(bytes = "vec", tag = "2")]
    pub id: Vec<u8>,
    #[prost(uint64, optional, tag = "3")]
    pub number: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum IncludeFlags {
    Unspecified = 0,
    Header = 1,
    Transactions = 2,
    Transfers = 4,
    Full = 7,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListBlocksRequest {
    #[prost(message, optional, tag = "1")]
    pub chain_id: Option<ChainId>,
    #[prost(uint64, tag = "2")]
    pub start_number: u64,
    /// Number of blocks to stream; unset or zero lets the agent pick
    #[prost(uint64, optional, tag = "3")]
    pub count: Option<u64>,
    #[prost(enumeration = "FinalityStatus", tag = "4")]
    pub finality_status: i32,
    /// Bitwise OR of [`IncludeFlags`]
    #[prost(uint32, tag = "5")]
    pub includes: u32,
}

impl ListBlocksRequest {
    /// Full blocks `start .. start + count` of one chain
    pub fn range(chain_id: ChainId, start: u64, count: u64) -> Self {
        Self {
            chain_id: Some(chain_id),
            start_number: start,
            count: Some(count),
            finality_status: FinalityStatus::Unspecified as i32,
            includes: IncludeFlags::Full as u32,
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetCurrencyRequest {
    #[prost(message, optional, tag = "1")]
    pub chain_id: Option<ChainId>,
    #[prost(string, tag = "2")]
    pub id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Currency {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub symbol: String,
    #[prost(uint32, tag = "3")]
    pub decimals: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateTransferRequest {
    #[prost(message, optional, tag = "1")]
    pub chain_id: Option<ChainId>,
    #[prost(string, tag = "2")]
    pub from: String,
    #[prost(string, tag = "3")]
    pub to: String,
    #[prost(message, optional, tag = "4")]
    pub amount: Option<CurrencyAmount>,
}

/// Unsigned transaction ready for signing
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionIntent {
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub payload_to_sign: Vec<u8>,
    #[prost(string, tag = "3")]
    pub signature_type: String,
    #[prost(bytes = "vec", tag = "4")]
    pub raw_data: Vec<u8>,
    #[prost(message, optional, tag = "5")]
    pub estimated_fee: Option<Uint256>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionCombineRequest {
    #[prost(message, optional, tag = "1")]
    pub chain_id: Option<ChainId>,
    #[prost(message, optional, tag = "2")]
    pub intent: Option<TransactionIntent>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub signatures: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionSignRequest {
    #[prost(message, optional, tag = "1")]
    pub chain_id: Option<ChainId>,
    #[prost(message, optional, tag = "2")]
    pub intent: Option<TransactionIntent>,
    #[prost(bytes = "vec", tag = "3")]
    pub private_key: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedTransaction {
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub signed_tx: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionSendRequest {
    #[prost(message, optional, tag = "1")]
    pub chain_id: Option<ChainId>,
    #[prost(message, optional, tag = "2")]
    pub signed_transaction: Option<SignedTransaction>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionSendResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
}

// === Account manager ===

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateAccountRequest {
    #[prost(string, tag = "1")]
    pub chain_type: String,
    #[prost(string, tag = "2")]
    pub name: String,
    /// Import this key instead of generating one
    #[prost(bytes = "vec", optional, tag = "3")]
    pub private_key: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateAccountResponse {
    #[prost(string, tag = "1")]
    pub address: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(bytes = "vec", tag = "3")]
    pub public_key: Vec<u8>,
}

/// Lookup by name, or by address when the name is empty
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetStoredAccountRequest {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub address: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetStoredAccountResponse {
    #[prost(string, tag = "1")]
    pub address: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(bytes = "vec", tag = "3")]
    pub public_key: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListAccountsRequest {
    /// Name prefix
    #[prost(string, tag = "1")]
    pub name_filter: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListAccountsResponse {
    #[prost(message, repeated, tag = "1")]
    pub accounts: Vec<list_accounts_response::Account>,
}

pub mod list_accounts_response {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Account {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(string, tag = "2")]
        pub address: String,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignPayloadRequest {
    #[prost(string, tag = "1")]
    pub chain_type: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub address: String,
    #[prost(bytes = "vec", tag = "4")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignPayloadResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub signature: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_uint256_minimal_big_endian() {
        assert_eq!(Uint256::from_u128(0).data, Vec::<u8>::new());
        assert_eq!(Uint256::from_u128(10_000).data, vec![0x27, 0x10]);
        assert_eq!(Uint256::from_u128(10_000).to_u128(), Some(10_000));
        assert_eq!(Uint256 { data: vec![0, 0, 1] }.to_u128(), Some(1));
        assert_eq!(Uint256 { data: vec![1; 17] }.to_u128(), None);
    }

    #[test]
    fn test_chain_id_parse_and_display() {
        let id = ChainId::parse("ETH:SEPOLIA").unwrap();
        assert_eq!(id.r#type, "ETH");
        assert_eq!(id.to_string(), "ETH:SEPOLIA");
        assert!(ChainId::parse("ETH").is_none());
        assert!(ChainId::parse(":SEPOLIA").is_none());
    }

    #[test]
    fn test_list_blocks_range_requests_full_blocks() {
        let req = ListBlocksRequest::range(ChainId::new("ETH", "SEPOLIA"), 0, 2);
        assert_eq!(req.count, Some(2));
        assert_eq!(req.includes, IncludeFlags::Full as u32);
        assert_eq!(req.finality_status(), FinalityStatus::Unspecified);
    }

    #[test]
    fn test_block_decodes_header_number() {
        let block = Block {
            header: Some(BlockHeader {
                number: 1,
                finality_status: FinalityStatus::Safe as i32,
                ..Default::default()
            }),
            transactions: vec![Transaction {
                transfers: vec![Transfer {
                    from: "0x0000000000000000000000000000000000000000".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
        };
        let decoded = Block::decode(block.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.number(), Some(1));
        assert_eq!(decoded.transactions[0].transfers.len(), 1);
    }
}
