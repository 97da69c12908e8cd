//! Discovery Runner
//!
//! Purpose:
//!     One full discovery pass: scan every factory for creation events,
//!     extract child venues, enrich them with trailing volume, keep the
//!     coverage prefix and add the pinned core contracts.
//!
//! Author: AI-Generated
//! Created: 2026-10-19
//!
//! Notes:
//!     - A partial scan (failed chunks) still produces a universe; the gaps
//!       are carried in the report
//!     - When a V2-style factory's scan is partial, its pair list is read
//!       through allPairs(i) to fill the gaps; a failed read keeps the
//!       log-derived venues
//!     - The refresh task re-runs the pass on an interval and publishes the
//!       result through the shared handle; a failed pass keeps the old one

use super::coverage::{select_coverage, CoverageReport};
use super::enrichment::{enrich_venues, EnrichmentReport, FallbackChain};
use super::enumeration::{enumerate_pairs, supports_enumeration, EnumerationReport};
use super::extractor::{ExtractReport, VenueExtractor};
use super::providers::VolumeProvider;
use super::scanner::{LogScanner, ScanReport};
use super::universe::{UniverseHandle, UniverseMetadata, VenueUniverse};
use crate::chain::ChainSource;
use crate::config::{CoverageConfig, EngineConfig};
use crate::error::{EngineError, Result};
use crate::registry::FactoryRegistry;
use crate::retry::{retry_with_backoff, RetryPolicy};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryReport {
    pub scan: ScanReport,
    pub extract: ExtractReport,
    pub enrichment: EnrichmentReport,
    pub coverage: CoverageReport,
    pub pinned: usize,
    /// Protocol → pair-list read made after a partial scan
    pub enumerations: BTreeMap<String, EnumerationReport>,
    pub elapsed: Duration,
}

pub struct DiscoveryRunner {
    chain: Arc<dyn ChainSource>,
    registry: Arc<FactoryRegistry>,
    scanner: LogScanner,
    fallback: FallbackChain,
    retry: RetryPolicy,
    to_block: Option<u64>,
    enumerate_max_pairs: u64,
    call_concurrency: usize,
    enrich_concurrency: usize,
    coverage: CoverageConfig,
}

impl DiscoveryRunner {
    pub fn new(
        chain: Arc<dyn ChainSource>,
        registry: Arc<FactoryRegistry>,
        providers: Vec<Arc<dyn VolumeProvider>>,
        config: &EngineConfig,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.node);
        Self {
            scanner: LogScanner::new(chain.clone(), config.scanner.clone(), retry),
            fallback: FallbackChain::from_config(providers, &config.enrichment),
            chain,
            registry,
            retry,
            to_block: config.scanner.to_block,
            enumerate_max_pairs: config.scanner.enumerate_max_pairs,
            call_concurrency: config.scanner.concurrency,
            enrich_concurrency: config.enrichment.concurrency,
            coverage: config.coverage.clone(),
        }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<(VenueUniverse, DiscoveryReport)> {
        let start_time = Instant::now();
        let to_block = match self.to_block {
            Some(b) => b,
            None => {
                retry_with_backoff(&self.retry, cancel, "eth_blockNumber", |_| self.chain.block_number())
                    .await?
            }
        };
        info!(
            "Discovery: {} factories up to block {}",
            self.registry.factories().len(),
            to_block
        );

        let mut scan = ScanReport {
            to_block,
            from_block: u64::MAX,
            ..Default::default()
        };
        let mut extractor = VenueExtractor::new();
        let mut enumerations = BTreeMap::new();
        for factory in self.registry.factories() {
            if factory.deployment_block > to_block {
                warn!(
                    "{} factory {} deploys after block {}; skipping",
                    factory.protocol, factory.address, to_block
                );
                continue;
            }
            let (logs, report) = self
                .scanner
                .scan(
                    &[factory.address],
                    &[factory.event_topic],
                    factory.deployment_block,
                    to_block,
                    cancel,
                )
                .await?;
            scan.from_block = scan.from_block.min(factory.deployment_block);
            scan.merge(&report);
            extractor.ingest(factory, &logs);

            if report.is_partial() && self.enumerate_max_pairs > 0 && supports_enumeration(factory) {
                let enumerated = enumerate_pairs(
                    self.chain.as_ref(),
                    factory,
                    self.enumerate_max_pairs,
                    self.call_concurrency,
                    &self.retry,
                    cancel,
                )
                .await;
                match enumerated {
                    Ok((pairs, enum_report)) => {
                        extractor.ingest_enumerated(factory, &pairs);
                        enumerations.insert(factory.protocol.clone(), enum_report);
                    }
                    Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                    Err(e) => warn!(
                        "{}: pair enumeration failed, keeping log-derived venues: {}",
                        factory.protocol, e
                    ),
                }
            }
        }
        if scan.from_block == u64::MAX {
            scan.from_block = to_block;
        }
        let (discovered, extract) = extractor.finish();

        let (enriched, enrichment) =
            enrich_venues(&self.fallback, discovered, self.enrich_concurrency, cancel).await?;
        let (mut selected, coverage) = select_coverage(enriched, &self.coverage)?;

        let selected_addrs: HashSet<_> = selected.iter().map(|v| v.address).collect();
        let pinned: Vec<_> = self
            .registry
            .core_venues()
            .into_iter()
            .filter(|v| !selected_addrs.contains(&v.address))
            .collect();
        let pinned_count = pinned.len();
        selected.extend(pinned);

        let metadata = UniverseMetadata::from_coverage(&coverage, &selected);
        let universe = VenueUniverse::new(selected, metadata);

        if scan.is_partial() {
            warn!(
                "Discovery used a partial scan: {} chunk(s) missing",
                scan.failed_chunks.len()
            );
        }
        info!(
            "Discovery complete: {} venues ({} by coverage, {} pinned), {:.2}% coverage ({:.1}s)",
            universe.len(),
            coverage.pools_needed,
            pinned_count,
            coverage.actual_coverage * 100.0,
            start_time.elapsed().as_secs_f64()
        );

        let report = DiscoveryReport {
            scan,
            extract,
            enrichment,
            coverage,
            pinned: pinned_count,
            enumerations,
            elapsed: start_time.elapsed(),
        };
        Ok((universe, report))
    }
}

/// Re-run discovery every `every` and publish each successful result.
pub fn spawn_universe_refresh(
    runner: Arc<DiscoveryRunner>,
    handle: UniverseHandle,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = IntervalStream::new(ticker);
        // First tick fires immediately; the current universe is fresh
        ticks.next().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                tick = ticks.next() => {
                    if tick.is_none() {
                        break;
                    }
                }
            }
            match runner.run(&cancel).await {
                Ok((universe, report)) => {
                    info!(
                        "Universe refreshed: {} venues (was {})",
                        universe.len(),
                        handle.current().len()
                    );
                    if report.scan.is_partial() {
                        warn!("Refreshed universe is based on a partial scan");
                    }
                    handle.publish(universe);
                }
                Err(EngineError::Cancelled) => break,
                Err(e) => error!("Universe refresh failed, keeping current universe: {}", e),
            }
        }
        info!("Universe refresh stopped");
    })
}
