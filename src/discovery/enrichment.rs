//! Volume Enrichment
//!
//! Purpose:
//!     Attach trailing-window volume and liquidity to every discovered venue
//!     by asking the configured providers in order. Venues are enriched in
//!     parallel, bounded by a semaphore.
//!
//! Author: AI-Generated
//! Created: 2026-10-19
//!
//! Notes:
//!     - Each provider call runs under its own timeout; a timeout counts as a
//!       failure and the chain moves on to the next provider
//!     - A venue for which every provider fails or has no data is dropped and
//!       counted as unavailable, never fatal
//!     - Negative and non-finite numbers from providers are clamped to 0

use super::providers::{ProviderOutcome, VolumeProvider, VolumeQuote};
use crate::config::EnrichmentConfig;
use crate::error::{EngineError, Result};
use crate::types::{DiscoveredContract, VenueMetrics};
use alloy::primitives::Address;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentReport {
    pub requested: usize,
    pub enriched: usize,
    pub unavailable: usize,
    /// Provider name → venues it answered for
    pub by_provider: BTreeMap<String, usize>,
    pub unavailable_venues: Vec<Address>,
}

fn clamp(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

fn sanitize(quote: VolumeQuote, provider: &str) -> VenueMetrics {
    let provider = quote.source.as_deref().unwrap_or(provider).to_string();
    VenueMetrics {
        volume_window: clamp(quote.volume_window),
        tvl: clamp(quote.tvl),
        token0: quote.token0,
        token1: quote.token1,
        volume_24h: quote.volume_24h.map(clamp),
        volume_7d: quote.volume_7d.map(clamp),
        provider,
    }
}

// ── Fallback chain ──────────────────────────────────────────────────────

pub struct FallbackChain {
    providers: Vec<Arc<dyn VolumeProvider>>,
    provider_timeout: Duration,
    window_days: u32,
}

impl FallbackChain {
    pub fn new(providers: Vec<Arc<dyn VolumeProvider>>, provider_timeout: Duration, window_days: u32) -> Self {
        Self {
            providers,
            provider_timeout,
            window_days,
        }
    }

    pub fn from_config(providers: Vec<Arc<dyn VolumeProvider>>, config: &EnrichmentConfig) -> Self {
        Self::new(
            providers,
            Duration::from_secs(config.provider_timeout_secs),
            config.window_days,
        )
    }

    /// First `Found` wins. `DataUnavailable` when no provider has data.
    pub async fn fetch(&self, venue: &DiscoveredContract) -> Result<VenueMetrics> {
        for provider in &self.providers {
            let outcome = match timeout(self.provider_timeout, provider.fetch(venue, self.window_days)).await {
                Ok(outcome) => outcome,
                Err(_) => ProviderOutcome::Failed(format!(
                    "timed out after {}ms",
                    self.provider_timeout.as_millis()
                )),
            };
            match outcome {
                ProviderOutcome::Found(quote) => return Ok(sanitize(quote, provider.name())),
                ProviderOutcome::Empty => {
                    debug!("{}: no data for {}", provider.name(), venue.address);
                }
                ProviderOutcome::Failed(reason) => {
                    debug!("{}: failed for {}: {}", provider.name(), venue.address, reason);
                }
            }
        }
        Err(EngineError::DataUnavailable {
            venue: format!("{:#x}", venue.address),
        })
    }
}

// ── Parallel enrichment ─────────────────────────────────────────────────

/// Enrich `venues`, returning only those some provider answered for, in
/// their input order.
pub async fn enrich_venues(
    chain: &FallbackChain,
    venues: Vec<DiscoveredContract>,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Result<(Vec<DiscoveredContract>, EnrichmentReport)> {
    let mut report = EnrichmentReport {
        requested: venues.len(),
        ..Default::default()
    };
    let start_time = Instant::now();
    info!(
        "Enriching {} venues ({} concurrent, window {} days)",
        venues.len(),
        concurrency,
        chain.window_days
    );

    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut pending: FuturesUnordered<_> = venues
        .into_iter()
        .enumerate()
        .map(|(i, venue)| {
            let permits = permits.clone();
            async move {
                let _permit = permits.acquire().await;
                let metrics = chain.fetch(&venue).await;
                (i, venue, metrics)
            }
        })
        .collect();

    let mut enriched = Vec::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            next = pending.next() => next,
        };
        let Some((i, mut venue, metrics)) = next else {
            break;
        };
        match metrics {
            Ok(m) => {
                *report.by_provider.entry(m.provider.clone()).or_default() += 1;
                venue.metrics = Some(m);
                enriched.push((i, venue));
            }
            Err(e) => {
                debug!("Excluding venue: {}", e);
                report.unavailable_venues.push(venue.address);
            }
        }
    }

    enriched.sort_by_key(|(i, _)| *i);
    report.unavailable_venues.sort_unstable();
    report.enriched = enriched.len();
    report.unavailable = report.unavailable_venues.len();

    if report.unavailable > 0 {
        warn!(
            "{} of {} venues had no volume data from any provider",
            report.unavailable, report.requested
        );
    }
    info!(
        "Enrichment complete: {} enriched, {} unavailable, by provider {:?} ({:.1}s)",
        report.enriched,
        report.unavailable,
        report.by_provider,
        start_time.elapsed().as_secs_f64()
    );
    Ok((enriched.into_iter().map(|(_, v)| v).collect(), report))
}
