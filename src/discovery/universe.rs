//! Venue Universe
//!
//! The filtered set of venues the decoder tracks, with the metadata of the
//! discovery run that produced it. Published to readers through
//! `UniverseHandle`: a refresh swaps in a new `Arc` atomically, and a reader
//! holding the old snapshot keeps a consistent view until it drops it.
//!
//! Author: AI-Generated
//! Created: 2026-10-19

use super::coverage::CoverageReport;
use crate::error::{EngineError, Result};
use crate::snapshot::{read_json, write_json_atomic};
use crate::types::{DiscoveredContract, TokenInfo, VenueMetrics};
use alloy::primitives::Address;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UniverseMetadata {
    pub discovery_timestamp: String,
    pub target_coverage: f64,
    pub actual_coverage: f64,
    pub protocols_included: Vec<String>,
    pub pools_needed: usize,
    pub volume_threshold: f64,
    pub total_volume: f64,
    /// Core contracts added outside the coverage prefix
    #[serde(default)]
    pub pinned_contracts: usize,
}

impl UniverseMetadata {
    pub fn from_coverage(report: &CoverageReport, venues: &[DiscoveredContract]) -> Self {
        let protocols: BTreeSet<String> = venues.iter().map(|v| v.protocol.clone()).collect();
        Self {
            discovery_timestamp: Utc::now().to_rfc3339(),
            target_coverage: report.target_coverage,
            actual_coverage: report.actual_coverage,
            protocols_included: protocols.into_iter().collect(),
            pools_needed: report.pools_needed,
            volume_threshold: report.volume_threshold,
            total_volume: report.total_volume,
            pinned_contracts: venues.iter().filter(|v| v.is_pinned()).count(),
        }
    }
}

/// Serializable venue for the universe export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueRecord {
    pub address: String,
    pub protocol: String,
    pub category: String,
    pub volume_window: f64,
    pub tvl: f64,
    pub token_pair: Option<String>,
    pub source_factory: Option<String>,
    pub creation_block: u64,
}

impl From<&DiscoveredContract> for VenueRecord {
    fn from(v: &DiscoveredContract) -> Self {
        Self {
            address: v.address.to_string(),
            protocol: v.protocol.clone(),
            category: v.category.clone(),
            volume_window: v.volume(),
            tvl: v.metrics.as_ref().map(|m| m.tvl).unwrap_or(0.0),
            token_pair: v.token_pair(),
            source_factory: v.source_factory.map(|a| a.to_string()),
            creation_block: v.creation_block,
        }
    }
}

fn parse_address(s: &str, field: &str) -> Result<Address> {
    s.parse()
        .map_err(|e| EngineError::Decode(format!("invalid {} '{}': {}", field, s, e)))
}

impl VenueRecord {
    pub fn to_venue(&self) -> Result<DiscoveredContract> {
        let (token0, token1) = match self.token_pair.as_deref().and_then(|p| p.split_once('/')) {
            Some((a, b)) => (
                Some(TokenInfo { symbol: a.to_string(), ..Default::default() }),
                Some(TokenInfo { symbol: b.to_string(), ..Default::default() }),
            ),
            None => (None, None),
        };
        let metrics = (self.source_factory.is_some() || self.volume_window > 0.0).then(|| VenueMetrics {
            volume_window: self.volume_window,
            tvl: self.tvl,
            token0,
            token1,
            provider: "snapshot".to_string(),
            ..Default::default()
        });
        Ok(DiscoveredContract {
            address: parse_address(&self.address, "venue address")?,
            protocol: self.protocol.clone(),
            category: self.category.clone(),
            source_factory: self
                .source_factory
                .as_deref()
                .map(|s| parse_address(s, "source factory"))
                .transpose()?,
            creation_block: self.creation_block,
            creation_tx: None,
            metrics,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseExport {
    pub metadata: UniverseMetadata,
    pub venues: Vec<VenueRecord>,
}

// ── Universe ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct VenueUniverse {
    venues: HashMap<Address, DiscoveredContract>,
    metadata: UniverseMetadata,
}

impl VenueUniverse {
    /// Later duplicates of an address are ignored.
    pub fn new(venues: Vec<DiscoveredContract>, metadata: UniverseMetadata) -> Self {
        let mut map = HashMap::with_capacity(venues.len());
        for v in venues {
            map.entry(v.address).or_insert(v);
        }
        Self { venues: map, metadata }
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.venues.contains_key(address)
    }

    pub fn get(&self, address: &Address) -> Option<&DiscoveredContract> {
        self.venues.get(address)
    }

    pub fn len(&self) -> usize {
        self.venues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.venues.is_empty()
    }

    pub fn metadata(&self) -> &UniverseMetadata {
        &self.metadata
    }

    /// Venues by descending volume, then address
    pub fn sorted_venues(&self) -> Vec<&DiscoveredContract> {
        let mut venues: Vec<&DiscoveredContract> = self.venues.values().collect();
        venues.sort_by(|a, b| {
            b.volume()
                .total_cmp(&a.volume())
                .then_with(|| a.address.cmp(&b.address))
        });
        venues
    }

    pub fn to_export(&self) -> UniverseExport {
        UniverseExport {
            metadata: self.metadata.clone(),
            venues: self.sorted_venues().into_iter().map(VenueRecord::from).collect(),
        }
    }

    pub fn from_export(export: UniverseExport) -> Result<Self> {
        let venues = export
            .venues
            .iter()
            .map(VenueRecord::to_venue)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(venues, export.metadata))
    }

    pub fn export_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json_atomic(path.as_ref(), &self.to_export())?;
        info!("Saved {} venues to {}", self.len(), path.as_ref().display());
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let export: UniverseExport = read_json(path.as_ref())?;
        let universe = Self::from_export(export)?;
        info!("Loaded {} venues from {}", universe.len(), path.as_ref().display());
        Ok(universe)
    }
}

// ── Shared handle ───────────────────────────────────────────────────────

/// Shared, atomically replaceable pointer to the active universe.
#[derive(Debug, Clone)]
pub struct UniverseHandle {
    inner: Arc<RwLock<Arc<VenueUniverse>>>,
}

impl UniverseHandle {
    pub fn new(universe: VenueUniverse) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(universe))),
        }
    }

    /// Snapshot of the active universe
    pub fn current(&self) -> Arc<VenueUniverse> {
        // A poisoned lock still holds a complete Arc
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn publish(&self, universe: VenueUniverse) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(universe);
    }
}
