//! JSON-RPC Chain Source
//!
//! `ChainSource` over an alloy HTTP provider. Each call runs under the
//! configured request timeout; timeouts and transport errors both surface
//! as `EngineError::Network`.
//!
//! Author: AI-Generated
//! Created: 2026-10-19

use super::{ChainSource, LogQuery, RawBlock, RawLog, RawReceipt, RawTransaction};
use crate::error::{EngineError, Result};
use alloy::consensus::Transaction as ConsensusTx;
use alloy::network::{ReceiptResponse, TransactionResponse};
use alloy::primitives::{Address, Bytes, TxKind, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log, Transaction, TransactionReceipt, TransactionRequest};
use alloy::transports::TransportResult;
use async_trait::async_trait;
use std::future::IntoFuture;
use tokio::time::{timeout, Duration};

pub struct RpcChainSource {
    provider: DynProvider,
    request_timeout: Duration,
}

impl RpcChainSource {
    /// Build an HTTP provider for `rpc_url`. No request is made here.
    pub fn connect_http(rpc_url: &str, request_timeout: Duration) -> Result<Self> {
        let url = rpc_url
            .parse()
            .map_err(|e| EngineError::config(format!("invalid RPC URL '{}': {}", rpc_url, e)))?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        Ok(Self {
            provider,
            request_timeout,
        })
    }

    async fn timed<F, T>(&self, what: &str, call: F) -> Result<T>
    where
        F: IntoFuture<Output = TransportResult<T>>,
    {
        match timeout(self.request_timeout, call.into_future()).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(EngineError::Network(format!("{}: {}", what, e))),
            Err(_) => Err(EngineError::Network(format!(
                "{}: timed out after {}s",
                what,
                self.request_timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl ChainSource for RpcChainSource {
    async fn block_number(&self) -> Result<u64> {
        self.timed("eth_blockNumber", self.provider.get_block_number()).await
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<RawLog>> {
        let filter = Filter::new()
            .from_block(query.from_block)
            .to_block(query.to_block)
            .address(query.addresses.clone())
            .event_signature(query.topic0.clone());

        let what = format!("eth_getLogs {}-{}", query.from_block, query.to_block);
        let logs = self.timed(&what, self.provider.get_logs(&filter)).await?;
        // Pending logs carry no block number and are dropped
        Ok(logs.iter().filter_map(convert_log).collect())
    }

    async fn block_with_transactions(&self, number: u64) -> Result<Option<RawBlock>> {
        let what = format!("eth_getBlockByNumber {}", number);
        let block = self
            .timed(&what, self.provider.get_block_by_number(number.into()).full())
            .await?;
        let Some(block) = block else {
            return Ok(None);
        };

        let txs = block.transactions.as_transactions().ok_or_else(|| {
            EngineError::Decode(format!("block {} returned without full transactions", number))
        })?;

        Ok(Some(RawBlock {
            number: block.header.number,
            timestamp: block.header.timestamp,
            transactions: txs.iter().map(convert_transaction).collect(),
        }))
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<RawReceipt>> {
        let what = format!("eth_getTransactionReceipt {}", tx_hash);
        let receipt = self
            .timed(&what, self.provider.get_transaction_receipt(tx_hash))
            .await?;
        Ok(receipt.as_ref().map(convert_receipt))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let what = format!("eth_call {}", to);
        let request = TransactionRequest::default().to(to).input(data.into());
        self.timed(&what, self.provider.call(request)).await
    }
}

// ── Conversions ──────────────────────────────────────────────────────

fn convert_log(log: &Log) -> Option<RawLog> {
    Some(RawLog {
        address: log.address(),
        topics: log.topics().to_vec(),
        data: log.inner.data.data.clone(),
        block_number: log.block_number?,
        tx_hash: log.transaction_hash,
        log_index: log.log_index.unwrap_or(0),
    })
}

fn convert_transaction(tx: &Transaction) -> RawTransaction {
    let to = match tx.kind() {
        TxKind::Call(addr) => Some(addr),
        TxKind::Create => None,
    };
    RawTransaction {
        hash: tx.tx_hash(),
        from: TransactionResponse::from(tx),
        to,
        input: tx.input().clone(),
        value: tx.value(),
        tx_index: tx.transaction_index.unwrap_or(0),
    }
}

fn convert_receipt(receipt: &TransactionReceipt) -> RawReceipt {
    RawReceipt {
        tx_hash: receipt.transaction_hash,
        success: ReceiptResponse::status(receipt),
        gas_used: receipt.gas_used,
        effective_gas_price: receipt.effective_gas_price,
        logs: receipt.inner.logs().iter().filter_map(convert_log).collect(),
    }
}
