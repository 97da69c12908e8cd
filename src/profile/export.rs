//! Profile Snapshot
//!
//! Serializable form of the profile store. Addresses and wei totals are
//! strings so the file stays readable by tools without 256-bit integers.
//! Loading a snapshot back into an engine resumes profiling where it
//! stopped, dedupe window included.
//!
//! Author: AI-Generated
//! Created: 2026-10-19

use super::engine::{ActionKey, ProfileEngine};
use super::model::{CategoryTag, UserProfile};
use super::store::ProfileStore;
use crate::error::{EngineError, Result};
use crate::snapshot::{read_json, write_json_atomic};
use crate::types::ActionType;
use alloy::primitives::{Address, U256};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub address: String,
    pub tags: Vec<CategoryTag>,
    pub action_counts: BTreeMap<ActionType, u64>,
    pub protocol_counts: BTreeMap<String, u64>,
    #[serde(default)]
    pub first_seen: Option<u64>,
    pub last_seen: u64,
    pub last_block: u64,
    pub total_transactions: u64,
    pub total_gas_used: u64,
    pub total_gas_cost_wei: String,
    pub total_value_wei: String,
    pub distinct_venue_count: usize,
    pub unique_contracts: Vec<String>,
    pub risk_score: f64,
    pub sophistication_score: f64,
}

impl From<&UserProfile> for ProfileRecord {
    fn from(p: &UserProfile) -> Self {
        Self {
            address: p.address.to_string(),
            tags: p.tags.iter().copied().collect(),
            action_counts: p.action_counts.clone(),
            protocol_counts: p.protocol_counts.clone(),
            first_seen: p.first_seen,
            last_seen: p.last_seen,
            last_block: p.last_block,
            total_transactions: p.total_transactions,
            total_gas_used: p.total_gas_used,
            total_gas_cost_wei: p.total_gas_cost_wei.to_string(),
            total_value_wei: p.total_value_wei.to_string(),
            distinct_venue_count: p.unique_contracts.len(),
            unique_contracts: p.unique_contracts.iter().map(|a| a.to_string()).collect(),
            risk_score: p.risk_score,
            sophistication_score: p.sophistication_score,
        }
    }
}

fn parse_address(s: &str) -> Result<Address> {
    s.parse()
        .map_err(|e| EngineError::Decode(format!("invalid address '{}': {}", s, e)))
}

fn parse_wei(s: &str, field: &str) -> Result<U256> {
    U256::from_str_radix(s, 10).map_err(|e| EngineError::Decode(format!("invalid {} '{}': {}", field, s, e)))
}

impl ProfileRecord {
    pub fn to_profile(&self) -> Result<UserProfile> {
        let unique_contracts = self
            .unique_contracts
            .iter()
            .map(|s| parse_address(s))
            .collect::<Result<BTreeSet<_>>>()?;
        Ok(UserProfile {
            address: parse_address(&self.address)?,
            tags: self.tags.iter().copied().collect(),
            action_counts: self.action_counts.clone(),
            protocol_counts: self.protocol_counts.clone(),
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            last_block: self.last_block,
            total_transactions: self.total_transactions,
            total_gas_used: self.total_gas_used,
            total_gas_cost_wei: parse_wei(&self.total_gas_cost_wei, "total_gas_cost_wei")?,
            total_value_wei: parse_wei(&self.total_value_wei, "total_value_wei")?,
            unique_contracts,
            risk_score: self.risk_score,
            sophistication_score: self.sophistication_score,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub generated_at: String,
    pub profile_count: usize,
    /// Highest block folded into any profile
    pub last_block: u64,
    pub profiles: Vec<ProfileRecord>,
    /// Dedupe window at save time, oldest first
    #[serde(default)]
    pub recent_actions: Vec<ActionKey>,
}

impl ProfileSnapshot {
    pub fn from_store(store: &dyn ProfileStore) -> Self {
        let profiles: Vec<ProfileRecord> = store.snapshot().iter().map(ProfileRecord::from).collect();
        Self {
            generated_at: Utc::now().to_rfc3339(),
            profile_count: profiles.len(),
            last_block: profiles.iter().map(|p| p.last_block).max().unwrap_or(0),
            profiles,
            recent_actions: Vec::new(),
        }
    }

    pub fn from_engine(engine: &ProfileEngine) -> Self {
        Self {
            recent_actions: engine.recent_actions(),
            ..Self::from_store(engine.store().as_ref())
        }
    }

    /// Per-tag profile counts, for run summaries
    pub fn tag_histogram(&self) -> BTreeMap<CategoryTag, usize> {
        let mut hist = BTreeMap::new();
        for p in &self.profiles {
            for t in &p.tags {
                *hist.entry(*t).or_default() += 1;
            }
        }
        hist
    }
}

/// Write every profile of `engine` and its dedupe window to `path`.
/// Returns the profile count.
pub fn save_profiles<P: AsRef<Path>>(engine: &ProfileEngine, path: P) -> Result<usize> {
    let snapshot = ProfileSnapshot::from_engine(engine);
    write_json_atomic(path.as_ref(), &snapshot)?;
    info!(
        "Saved {} profiles (through block {}, {} recent actions) to {}",
        snapshot.profile_count,
        snapshot.last_block,
        snapshot.recent_actions.len(),
        path.as_ref().display()
    );
    Ok(snapshot.profile_count)
}

/// Insert every profile from the snapshot at `path` into the engine's
/// store, replacing profiles with the same address, and seed its dedupe
/// window. Nothing is inserted when any record is invalid.
pub fn load_profiles<P: AsRef<Path>>(engine: &ProfileEngine, path: P) -> Result<usize> {
    let snapshot: ProfileSnapshot = read_json(path.as_ref())?;
    let profiles = snapshot
        .profiles
        .iter()
        .map(ProfileRecord::to_profile)
        .collect::<Result<Vec<_>>>()?;
    let count = profiles.len();
    for p in profiles {
        engine.store().insert(p);
    }
    let restored = engine.restore_recent(&snapshot.recent_actions);
    info!(
        "Loaded {} profiles and {} recent actions from {}",
        count,
        restored,
        path.as_ref().display()
    );
    Ok(count)
}
