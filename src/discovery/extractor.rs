//! Venue Extractor
//!
//! Turns factory creation logs into `DiscoveredContract`s by reading the
//! child address from the slot declared in the factory config. A
//! malformed log is counted and skipped; it never aborts discovery.
//!
//! Author: AI-Generated
//! Created: 2026-10-19

use crate::chain::RawLog;
use crate::error::{EngineError, Result};
use crate::registry::{ChildSlot, FactoryConfig};
use crate::types::DiscoveredContract;
use alloy::primitives::Address;
use std::collections::HashMap;
use tracing::{debug, info, trace};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractReport {
    pub logs_seen: usize,
    pub extracted: usize,
    /// Child already seen (same pool announced twice, or by two factories)
    pub duplicates: usize,
    pub decode_errors: usize,
    /// Logs from a different emitter or event than the factory declares
    pub skipped: usize,
    /// New venues read from a factory's pair list rather than its logs
    pub enumerated: usize,
}

/// Read an address out of a 32-byte ABI word. The upper 12 bytes of a
/// left-padded address must be zero.
fn word_to_address(word: &[u8]) -> Option<Address> {
    if word.len() != 32 || word[..12].iter().any(|&b| b != 0) {
        return None;
    }
    Some(Address::from_slice(&word[12..]))
}

/// Extract the child contract address from one creation log.
pub fn extract_child(log: &RawLog, factory: &FactoryConfig) -> Result<Address> {
    let address = match factory.child_slot {
        ChildSlot::Topic(i) => {
            let topic = log.topics.get(i).ok_or_else(|| {
                EngineError::Decode(format!(
                    "log has {} topics, child slot is topic {}",
                    log.topics.len(),
                    i
                ))
            })?;
            word_to_address(topic.as_slice())
        }
        ChildSlot::Data(w) => {
            let start = w * 32;
            let word = log.data.get(start..start + 32).ok_or_else(|| {
                EngineError::Decode(format!(
                    "log data is {} bytes, child slot is data word {}",
                    log.data.len(),
                    w
                ))
            })?;
            word_to_address(word)
        }
    }
    .ok_or_else(|| EngineError::Decode("child slot is not a left-padded address".into()))?;

    if address == Address::ZERO {
        return Err(EngineError::Decode("child address is zero".into()));
    }
    Ok(address)
}

/// Accumulates venues across factories, keeping the earliest creation of
/// each child address.
#[derive(Debug, Default)]
pub struct VenueExtractor {
    venues: HashMap<Address, (DiscoveredContract, u64)>,
    report: ExtractReport,
}

impl VenueExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&mut self, factory: &FactoryConfig, logs: &[RawLog]) {
        let before = self.report.extracted;
        for log in logs {
            self.report.logs_seen += 1;
            if log.address != factory.address || log.topic0() != Some(&factory.event_topic) {
                self.report.skipped += 1;
                continue;
            }

            let child = match extract_child(log, factory) {
                Ok(addr) => addr,
                Err(e) => {
                    debug!(
                        "Malformed {} creation log at block {} (index {}): {}",
                        factory.protocol, log.block_number, log.log_index, e
                    );
                    self.report.decode_errors += 1;
                    continue;
                }
            };

            let candidate = DiscoveredContract {
                address: child,
                protocol: factory.protocol.clone(),
                category: factory.category.clone(),
                source_factory: Some(factory.address),
                creation_block: log.block_number,
                creation_tx: log.tx_hash,
                metrics: None,
            };

            match self.venues.get_mut(&child) {
                Some((existing, existing_index)) => {
                    self.report.duplicates += 1;
                    let earlier = (log.block_number, log.log_index)
                        < (existing.creation_block, *existing_index);
                    if earlier {
                        trace!("Replacing {} with earlier creation at block {}", child, log.block_number);
                        *existing = candidate;
                        *existing_index = log.log_index;
                    }
                }
                None => {
                    self.venues.insert(child, (candidate, log.log_index));
                    self.report.extracted += 1;
                }
            }
        }
        info!(
            "{}: {} new venues from {} logs",
            factory.protocol,
            self.report.extracted - before,
            logs.len()
        );
    }

    /// Add children read from the factory's pair list. The creation block is
    /// unknown, so the factory's deployment block stands in; a venue already
    /// found in the logs keeps its exact creation.
    pub fn ingest_enumerated(&mut self, factory: &FactoryConfig, children: &[Address]) {
        let mut added = 0;
        for &child in children {
            if child == Address::ZERO || self.venues.contains_key(&child) {
                continue;
            }
            let venue = DiscoveredContract {
                address: child,
                protocol: factory.protocol.clone(),
                category: factory.category.clone(),
                source_factory: Some(factory.address),
                creation_block: factory.deployment_block,
                creation_tx: None,
                metrics: None,
            };
            self.venues.insert(child, (venue, u64::MAX));
            added += 1;
        }
        self.report.extracted += added;
        self.report.enumerated += added;
        info!("{}: {} venues added by enumeration", factory.protocol, added);
    }

    /// Venues ordered by (creation_block, address)
    pub fn finish(self) -> (Vec<DiscoveredContract>, ExtractReport) {
        let mut venues: Vec<DiscoveredContract> = self.venues.into_values().map(|(v, _)| v).collect();
        venues.sort_by(|a, b| {
            a.creation_block
                .cmp(&b.creation_block)
                .then_with(|| a.address.cmp(&b.address))
        });
        (venues, self.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::log;
    use crate::contracts::{IBalancerVault, IUniswapV2Factory, IUniswapV3Factory};
    use crate::registry::default_factories;
    use alloy::primitives::aliases::{I24, U24};
    use alloy::primitives::{Bytes, B256, U256};
    use alloy::sol_types::SolEvent;

    fn factory(protocol: &str) -> FactoryConfig {
        default_factories()
            .into_iter()
            .find(|f| f.protocol == protocol)
            .unwrap()
    }

    fn pair_created_log(factory: &FactoryConfig, pair: Address, block: u64, index: u64) -> RawLog {
        let event = IUniswapV2Factory::PairCreated {
            token0: Address::repeat_byte(0xa0),
            token1: Address::repeat_byte(0xa1),
            pair,
            allPairsLength: U256::from(1),
        };
        let data = event.encode_log_data();
        log(factory.address, data.topics().to_vec(), data.data.to_vec(), block, index)
    }

    #[test]
    fn test_v2_pair_from_data_word() {
        let f = factory("Uniswap V2");
        let pair = Address::repeat_byte(0x42);
        let l = pair_created_log(&f, pair, 100, 0);
        assert_eq!(extract_child(&l, &f).unwrap(), pair);
    }

    #[test]
    fn test_v3_pool_from_second_data_word() {
        let f = factory("Uniswap V3");
        let pool = Address::repeat_byte(0x33);
        let event = IUniswapV3Factory::PoolCreated {
            token0: Address::repeat_byte(0xa0),
            token1: Address::repeat_byte(0xa1),
            fee: U24::from(3000u32),
            tickSpacing: "60".parse::<I24>().unwrap(),
            pool,
        };
        let data = event.encode_log_data();
        let l = log(f.address, data.topics().to_vec(), data.data.to_vec(), 1, 0);
        assert_eq!(extract_child(&l, &f).unwrap(), pool);
    }

    #[test]
    fn test_balancer_pool_from_topic() {
        let f = factory("Balancer V2");
        let pool = Address::repeat_byte(0x77);
        let event = IBalancerVault::PoolRegistered {
            poolId: B256::repeat_byte(0x01),
            poolAddress: pool,
            specialization: 2,
        };
        let data = event.encode_log_data();
        let l = log(f.address, data.topics().to_vec(), data.data.to_vec(), 1, 0);
        assert_eq!(extract_child(&l, &f).unwrap(), pool);
    }

    #[test]
    fn test_malformed_logs_counted_not_fatal() {
        let f = factory("Uniswap V2");
        let good = pair_created_log(&f, Address::repeat_byte(0x42), 10, 0);

        let mut short = good.clone();
        short.data = Bytes::from(short.data[..16].to_vec());
        let mut dirty = good.clone();
        let mut bytes = dirty.data.to_vec();
        bytes[0] = 0xff; // non-zero padding
        dirty.data = bytes.into();
        let mut foreign = good.clone();
        foreign.address = Address::repeat_byte(0x99);

        let mut extractor = VenueExtractor::new();
        extractor.ingest(&f, &[short, dirty, foreign, good]);
        let (venues, report) = extractor.finish();

        assert_eq!(venues.len(), 1);
        assert_eq!(report.decode_errors, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.logs_seen, 4);
    }

    #[test]
    fn test_duplicate_child_keeps_earliest() {
        let v2 = factory("Uniswap V2");
        let sushi = factory("SushiSwap");
        let pair = Address::repeat_byte(0x42);

        let mut extractor = VenueExtractor::new();
        extractor.ingest(&v2, &[pair_created_log(&v2, pair, 500, 3)]);
        extractor.ingest(&sushi, &[pair_created_log(&sushi, pair, 200, 1)]);
        let (venues, report) = extractor.finish();

        assert_eq!(venues.len(), 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(venues[0].creation_block, 200);
        assert_eq!(venues[0].protocol, "SushiSwap");
        assert_eq!(venues[0].source_factory, Some(sushi.address));
    }

    #[test]
    fn test_enumerated_children_fill_gaps_only() {
        let f = factory("Uniswap V2");
        let logged = Address::repeat_byte(0x42);
        let missed = Address::repeat_byte(0x43);

        let mut extractor = VenueExtractor::new();
        extractor.ingest(&f, &[pair_created_log(&f, logged, f.deployment_block + 900, 0)]);
        extractor.ingest_enumerated(&f, &[logged, missed, Address::ZERO]);
        let (venues, report) = extractor.finish();

        assert_eq!(venues.len(), 2);
        assert_eq!(report.enumerated, 1);
        assert_eq!(report.extracted, 2);
        let by_addr: HashMap<_, _> = venues.iter().map(|v| (v.address, v)).collect();
        assert_eq!(by_addr[&logged].creation_block, f.deployment_block + 900);
        assert_eq!(by_addr[&missed].creation_block, f.deployment_block);
        assert_eq!(by_addr[&missed].creation_tx, None);
    }

    #[test]
    fn test_zero_child_rejected() {
        let f = factory("Uniswap V2");
        let l = pair_created_log(&f, Address::ZERO, 1, 0);
        assert!(matches!(extract_child(&l, &f), Err(EngineError::Decode(_))));
    }
}
