//! In-memory `ChainSource` for tests.

use super::{ChainSource, LogQuery, RawBlock, RawLog, RawReceipt, RawTransaction};
use crate::error::{EngineError, Result};
use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[derive(Default)]
pub struct MockChain {
    pub head: AtomicU64,
    pub logs: Vec<RawLog>,
    pub blocks: HashMap<u64, RawBlock>,
    pub receipts: HashMap<B256, RawReceipt>,
    /// Any log query touching one of these blocks fails
    pub failing_log_blocks: HashSet<u64>,
    pub failing_blocks: HashSet<u64>,
    pub failing_receipts: HashSet<B256>,
    /// The next N log queries fail with a transient error
    pub transient_log_failures: AtomicU32,
    pub log_calls: AtomicU32,
    /// (to, calldata) → return data; anything else reverts
    pub call_results: HashMap<(Address, Bytes), Bytes>,
}

impl MockChain {
    pub fn new(head: u64) -> Self {
        Self {
            head: AtomicU64::new(head),
            ..Default::default()
        }
    }

    pub fn add_block(&mut self, block: RawBlock) {
        self.blocks.insert(block.number, block);
    }

    pub fn add_receipt(&mut self, receipt: RawReceipt) {
        self.receipts.insert(receipt.tx_hash, receipt);
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn block_number(&self) -> Result<u64> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<RawLog>> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.transient_log_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_log_failures.store(pending - 1, Ordering::SeqCst);
            return Err(EngineError::Network("mock: transient failure".into()));
        }
        if (query.from_block..=query.to_block).any(|b| self.failing_log_blocks.contains(&b)) {
            return Err(EngineError::Network(format!(
                "mock: range {}-{} unavailable",
                query.from_block, query.to_block
            )));
        }
        Ok(self
            .logs
            .iter()
            .filter(|l| l.block_number >= query.from_block && l.block_number <= query.to_block)
            .filter(|l| query.addresses.is_empty() || query.addresses.contains(&l.address))
            .filter(|l| {
                query.topic0.is_empty() || l.topic0().map_or(false, |t| query.topic0.contains(t))
            })
            .cloned()
            .collect())
    }

    async fn block_with_transactions(&self, number: u64) -> Result<Option<RawBlock>> {
        if self.failing_blocks.contains(&number) {
            return Err(EngineError::Network(format!("mock: block {} unavailable", number)));
        }
        Ok(self.blocks.get(&number).cloned().or_else(|| {
            // Blocks inside the head with no fixture are empty
            (number <= self.head.load(Ordering::SeqCst)).then(|| RawBlock {
                number,
                timestamp: 1_700_000_000 + number * 12,
                transactions: Vec::new(),
            })
        }))
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<RawReceipt>> {
        if self.failing_receipts.contains(&tx_hash) {
            return Err(EngineError::Network(format!("mock: receipt {} unavailable", tx_hash)));
        }
        Ok(self.receipts.get(&tx_hash).cloned())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        self.call_results
            .get(&(to, data))
            .cloned()
            .ok_or_else(|| EngineError::Network(format!("mock: call to {} reverted", to)))
    }
}

// ── Fixture builders ──────────────────────────────────────────────────

pub fn tx(hash_byte: u8, from: Address, to: Address, input: Vec<u8>, tx_index: u64) -> RawTransaction {
    RawTransaction {
        hash: B256::repeat_byte(hash_byte),
        from,
        to: Some(to),
        input: Bytes::from(input),
        value: U256::ZERO,
        tx_index,
    }
}

pub fn receipt(tx: &RawTransaction, success: bool, logs: Vec<RawLog>) -> RawReceipt {
    RawReceipt {
        tx_hash: tx.hash,
        success,
        gas_used: 120_000,
        effective_gas_price: 20_000_000_000,
        logs,
    }
}

pub fn log(address: Address, topics: Vec<B256>, data: Vec<u8>, block_number: u64, log_index: u64) -> RawLog {
    RawLog {
        address,
        topics,
        data: Bytes::from(data),
        block_number,
        tx_hash: None,
        log_index,
    }
}
