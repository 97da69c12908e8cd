//! Chain Access
//!
//! The engine reads the chain through the `ChainSource` trait so discovery
//! and the pipeline can run against a node or an in-memory fixture. Node
//! responses are normalized into the small `Raw*` types below at the
//! boundary; nothing past this module touches alloy RPC types.
//!
//! Author: AI-Generated
//! Created: 2026-10-19

pub mod rpc;

#[cfg(test)]
pub mod mock;

use crate::error::Result;
use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;

pub use rpc::RpcChainSource;

#[derive(Debug, Clone, PartialEq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub tx_hash: Option<B256>,
    pub log_index: u64,
}

impl RawLog {
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawTransaction {
    pub hash: B256,
    pub from: Address,
    /// None for contract creation
    pub to: Option<Address>,
    pub input: Bytes,
    pub value: U256,
    pub tx_index: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawReceipt {
    pub tx_hash: B256,
    pub success: bool,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    pub logs: Vec<RawLog>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawBlock {
    pub number: u64,
    pub timestamp: u64,
    pub transactions: Vec<RawTransaction>,
}

/// eth_getLogs filter over an inclusive block range
#[derive(Debug, Clone, PartialEq)]
pub struct LogQuery {
    pub from_block: u64,
    pub to_block: u64,
    pub addresses: Vec<Address>,
    /// Accepted topic0 values (OR)
    pub topic0: Vec<B256>,
}

/// Read-only access to chain data.
///
/// Implementations report transport failures as `EngineError::Network` so
/// callers can retry them; a missing block or receipt is `Ok(None)`.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn block_number(&self) -> Result<u64>;

    async fn logs(&self, query: &LogQuery) -> Result<Vec<RawLog>>;

    async fn block_with_transactions(&self, number: u64) -> Result<Option<RawBlock>>;

    async fn receipt(&self, tx_hash: B256) -> Result<Option<RawReceipt>>;

    /// eth_call against the latest block; returns the raw return data
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;
}
