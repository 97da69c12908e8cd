//! Factory Pair Enumeration
//!
//! Purpose:
//!     Read a Uniswap V2-style factory's pair list through `allPairsLength()`
//!     and `allPairs(i)`. Discovery falls back to this when the creation-log
//!     scan of such a factory comes back partial.
//!
//! Author: AI-Generated
//! Created: 2026-10-19
//!
//! Notes:
//!     - Reads are capped at `limit` pairs (lowest indices first)
//!     - A failed `allPairs(i)` is counted and skipped; a failed
//!       `allPairsLength()` fails the enumeration
//!     - Calls run with bounded concurrency, each with bounded retry

use crate::chain::ChainSource;
use crate::contracts::IUniswapV2Factory;
use crate::error::{EngineError, Result};
use crate::registry::FactoryConfig;
use crate::retry::{retry_with_backoff, RetryPolicy};
use alloy::primitives::{Address, U256};
use alloy::sol_types::{SolCall, SolEvent};
use futures::stream::{self, StreamExt};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnumerationReport {
    /// allPairsLength() as reported by the factory
    pub total_pairs: u64,
    pub requested: u64,
    pub found: usize,
    pub failed: usize,
}

/// Factories that emit `PairCreated` expose the V2 pair list.
pub fn supports_enumeration(factory: &FactoryConfig) -> bool {
    factory.event_topic == IUniswapV2Factory::PairCreated::SIGNATURE_HASH
}

pub async fn enumerate_pairs(
    chain: &dyn ChainSource,
    factory: &FactoryConfig,
    limit: u64,
    concurrency: usize,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<(Vec<Address>, EnumerationReport)> {
    let start_time = Instant::now();
    let label = format!("{} allPairsLength", factory.protocol);
    let raw = retry_with_backoff(retry, cancel, &label, |_| {
        chain.call(factory.address, IUniswapV2Factory::allPairsLengthCall {}.abi_encode().into())
    })
    .await?;
    let total = IUniswapV2Factory::allPairsLengthCall::abi_decode_returns(&raw)
        .map_err(|e| EngineError::Decode(format!("allPairsLength: {}", e)))?;
    let total_pairs = u64::try_from(total).unwrap_or(u64::MAX);

    let mut report = EnumerationReport {
        total_pairs,
        requested: total_pairs.min(limit),
        ..Default::default()
    };
    info!(
        "{}: enumerating {} of {} pairs via allPairs",
        factory.protocol, report.requested, total_pairs
    );

    let results: Vec<Result<Address>> = stream::iter(0..report.requested)
        .map(|i| async move {
            let data = IUniswapV2Factory::allPairsCall { index: U256::from(i) }.abi_encode();
            let label = format!("{} allPairs({})", factory.protocol, i);
            let raw = retry_with_backoff(retry, cancel, &label, |_| chain.call(factory.address, data.clone().into()))
                .await?;
            IUniswapV2Factory::allPairsCall::abi_decode_returns(&raw)
                .map_err(|e| EngineError::Decode(format!("allPairs({}): {}", i, e)))
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut pairs = Vec::with_capacity(results.len());
    for (i, res) in results.into_iter().enumerate() {
        match res {
            Ok(addr) if addr != Address::ZERO => pairs.push(addr),
            Ok(_) => {
                debug!("{}: allPairs({}) returned the zero address", factory.protocol, i);
                report.failed += 1;
            }
            Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
            Err(e) => {
                debug!("{}: {}", factory.protocol, e);
                report.failed += 1;
            }
        }
    }
    report.found = pairs.len();

    if report.failed > 0 {
        warn!("{}: {} allPairs reads failed", factory.protocol, report.failed);
    }
    info!(
        "{}: enumerated {} pairs ({:.1}s)",
        factory.protocol,
        report.found,
        start_time.elapsed().as_secs_f64()
    );
    Ok((pairs, report))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::chain::mock::MockChain;
    use alloy::primitives::Bytes;

    /// Answer allPairsLength() and allPairs(i) for `pairs` on `factory`.
    pub fn serve_pairs(chain: &mut MockChain, factory: Address, pairs: &[Address]) {
        chain.call_results.insert(
            (factory, Bytes::from(IUniswapV2Factory::allPairsLengthCall {}.abi_encode())),
            Bytes::from(U256::from(pairs.len()).to_be_bytes::<32>().to_vec()),
        );
        for (i, pair) in pairs.iter().enumerate() {
            let call = IUniswapV2Factory::allPairsCall { index: U256::from(i) }.abi_encode();
            let mut word = [0u8; 32];
            word[12..].copy_from_slice(pair.as_slice());
            chain.call_results.insert((factory, Bytes::from(call)), Bytes::from(word.to_vec()));
        }
    }
}
