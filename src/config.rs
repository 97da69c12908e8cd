//! Engine Configuration
//!
//! Reads the engine configuration from a TOML file, applies `.env`
//! overrides (RPC_URL), and validates every section before anything runs.
//! Missing sections and fields fall back to the defaults below; empty
//! factory / core-contract tables fall back to the built-in mainnet set.
//!
//! Author: AI-Generated
//! Created: 2026-10-19

use crate::error::{EngineError, Result};
use crate::profile::{ReplayPolicy, TagRule};
use crate::registry::{CoreContractConfig, FactoryConfig, SelectorRegistry, SignatureConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Volume providers the enrichment stage knows how to build
pub const KNOWN_PROVIDERS: [&str; 3] = ["subgraph", "defillama", "dexscreener"];

/// Top-level TOML configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub coverage: CoverageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default, rename = "factory")]
    pub factories: Vec<FactoryConfig>,
    #[serde(default, rename = "core_contract")]
    pub core_contracts: Vec<CoreContractConfig>,
    /// Extra selector signatures on top of the built-in table
    #[serde(default, rename = "signature")]
    pub signatures: Vec<SignatureConfig>,
    /// Extra tag rules on top of the default rule table
    #[serde(default, rename = "rule")]
    pub rules: Vec<TagRule>,
}

// ── Sections ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
}

fn default_rpc_url() -> String { "http://127.0.0.1:8545".to_string() }
fn default_request_timeout() -> u64 { 30 }
fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// Blocks per eth_getLogs call
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Provider response cap; a chunk at or above it is split and re-queried
    #[serde(default = "default_max_logs")]
    pub max_logs_per_query: usize,
    #[serde(default = "default_scan_concurrency")]
    pub concurrency: usize,
    /// Last block to scan (default: chain head)
    #[serde(default)]
    pub to_block: Option<u64>,
    /// Cap on pairs read through allPairs(i) when a V2-style factory's log
    /// scan is partial; 0 disables the fallback
    #[serde(default = "default_enumerate_max_pairs")]
    pub enumerate_max_pairs: u64,
}

fn default_chunk_size() -> u64 { 2000 }
fn default_enumerate_max_pairs() -> u64 { 5_000 }
fn default_max_logs() -> usize { 10_000 }
fn default_scan_concurrency() -> usize { 4 }

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_logs_per_query: default_max_logs(),
            concurrency: default_scan_concurrency(),
            to_block: None,
            enumerate_max_pairs: default_enumerate_max_pairs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    #[serde(default = "default_enrich_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,
    /// Fallback order
    #[serde(default = "default_providers")]
    pub providers: Vec<String>,
    /// Protocol name → GraphQL endpoint
    #[serde(default = "default_subgraph_endpoints")]
    pub subgraph_endpoints: BTreeMap<String, String>,
    #[serde(default = "default_defillama_url")]
    pub defillama_url: String,
    #[serde(default = "default_dexscreener_url")]
    pub dexscreener_url: String,
    #[serde(default = "default_chain_slug")]
    pub chain: String,
}

fn default_window_days() -> u32 { 180 }
fn default_enrich_concurrency() -> usize { 8 }
fn default_provider_timeout() -> u64 { 10 }
fn default_providers() -> Vec<String> {
    KNOWN_PROVIDERS.iter().map(|s| s.to_string()).collect()
}
fn default_subgraph_endpoints() -> BTreeMap<String, String> {
    let mut endpoints = BTreeMap::new();
    endpoints.insert(
        "Uniswap V2".to_string(),
        "https://api.thegraph.com/subgraphs/name/uniswap/uniswap-v2".to_string(),
    );
    endpoints.insert(
        "Uniswap V3".to_string(),
        "https://api.thegraph.com/subgraphs/name/uniswap/uniswap-v3".to_string(),
    );
    endpoints.insert(
        "SushiSwap".to_string(),
        "https://api.thegraph.com/subgraphs/name/sushiswap/exchange".to_string(),
    );
    endpoints
}
fn default_defillama_url() -> String { "https://api.llama.fi".to_string() }
fn default_dexscreener_url() -> String { "https://api.dexscreener.com/latest/dex".to_string() }
fn default_chain_slug() -> String { "ethereum".to_string() }

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            concurrency: default_enrich_concurrency(),
            provider_timeout_secs: default_provider_timeout(),
            providers: default_providers(),
            subgraph_endpoints: default_subgraph_endpoints(),
            defillama_url: default_defillama_url(),
            dexscreener_url: default_dexscreener_url(),
            chain: default_chain_slug(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoverageConfig {
    /// Fraction of total volume the selected venues must reach, in (0, 1]
    #[serde(default = "default_target")]
    pub target: f64,
    /// External market total used as the denominator instead of the sum
    /// over enriched venues
    #[serde(default)]
    pub total_volume_override: Option<f64>,
}

fn default_target() -> f64 { 0.90 }

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            total_volume_override: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Blocks behind head before a block counts as final in live mode
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Concurrent receipt fetch + decode tasks within one block
    #[serde(default = "default_decode_concurrency")]
    pub decode_concurrency: usize,
    #[serde(default)]
    pub replay_policy: ReplayPolicy,
    #[serde(default = "default_dedupe_capacity")]
    pub dedupe_capacity: usize,
    /// Decoded blocks buffered ahead of the profile writer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Re-run discovery on this interval while tailing (off when unset)
    #[serde(default)]
    pub universe_refresh_secs: Option<u64>,
}

fn default_confirmations() -> u64 { 12 }
fn default_poll_interval() -> u64 { 3000 }
fn default_decode_concurrency() -> usize { 16 }
fn default_dedupe_capacity() -> usize { 100_000 }
fn default_channel_capacity() -> usize { 64 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confirmations: default_confirmations(),
            poll_interval_ms: default_poll_interval(),
            decode_concurrency: default_decode_concurrency(),
            replay_policy: ReplayPolicy::default(),
            dedupe_capacity: default_dedupe_capacity(),
            channel_capacity: default_channel_capacity(),
            universe_refresh_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_trader_threshold")]
    pub trader_swap_threshold: u64,
    #[serde(default = "default_arb_transactions")]
    pub arbitrage_min_transactions: u64,
    #[serde(default = "default_arb_venues")]
    pub arbitrage_min_venues: usize,
    #[serde(default = "default_arb_swaps")]
    pub arbitrage_min_swaps: u64,
    #[serde(default = "default_explorer_protocols")]
    pub explorer_min_protocols: usize,
}

fn default_trader_threshold() -> u64 { 5 }
fn default_arb_transactions() -> u64 { 50 }
fn default_arb_venues() -> usize { 10 }
fn default_arb_swaps() -> u64 { 40 }
fn default_explorer_protocols() -> usize { 5 }

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            trader_swap_threshold: default_trader_threshold(),
            arbitrage_min_transactions: default_arb_transactions(),
            arbitrage_min_venues: default_arb_venues(),
            arbitrage_min_swaps: default_arb_swaps(),
            explorer_min_protocols: default_explorer_protocols(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_universe_path")]
    pub universe_path: String,
    #[serde(default = "default_profiles_path")]
    pub profiles_path: String,
    #[serde(default = "default_contract_list_path")]
    pub contract_list_path: String,
    #[serde(default = "default_summary_path")]
    pub summary_path: String,
    #[serde(default = "default_venues_csv_path")]
    pub venues_csv_path: String,
    /// Also keep a `<name>_<YYYYmmdd_HHMMSS>` copy of each discovery output
    #[serde(default = "default_archive")]
    pub archive_timestamped: bool,
}

fn default_universe_path() -> String { "data/venue_universe.json".to_string() }
fn default_summary_path() -> String { "data/discovery_summary.json".to_string() }
fn default_venues_csv_path() -> String { "data/venue_universe.csv".to_string() }
fn default_archive() -> bool { true }
fn default_profiles_path() -> String { "data/user_profiles.json".to_string() }
fn default_contract_list_path() -> String { "data/tracked_contracts.json".to_string() }

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            universe_path: default_universe_path(),
            profiles_path: default_profiles_path(),
            contract_list_path: default_contract_list_path(),
            summary_path: default_summary_path(),
            venues_csv_path: default_venues_csv_path(),
            archive_timestamped: default_archive(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────

impl EngineConfig {
    /// Load from a TOML file, apply `.env` overrides and validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        dotenv::dotenv().ok();

        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            EngineError::config(format!(
                "failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| EngineError::config(format!("failed to parse TOML configuration: {}", e)))?;

        config.apply_env_overrides();
        config.validate()?;

        info!(
            "Configuration loaded from {} ({} factories, {} core contracts, {} extra signatures)",
            path.as_ref().display(),
            config.factories.len(),
            config.core_contracts.len(),
            config.signatures.len()
        );
        Ok(config)
    }

    /// Parse and validate without touching the environment.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| EngineError::config(format!("failed to parse TOML configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("RPC_URL") {
            if !url.trim().is_empty() {
                self.node.rpc_url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.node.rpc_url.trim().is_empty() {
            return Err(EngineError::config("node.rpc_url is empty"));
        }
        if self.node.request_timeout_secs == 0 {
            return Err(EngineError::config("node.request_timeout_secs must be > 0"));
        }
        if self.scanner.chunk_size == 0 {
            return Err(EngineError::config("scanner.chunk_size must be > 0"));
        }
        if self.scanner.max_logs_per_query == 0 {
            return Err(EngineError::config("scanner.max_logs_per_query must be > 0"));
        }
        if self.scanner.concurrency == 0 || self.enrichment.concurrency == 0 {
            return Err(EngineError::config("concurrency limits must be > 0"));
        }
        if self.enrichment.window_days == 0 {
            return Err(EngineError::config("enrichment.window_days must be > 0"));
        }
        if self.enrichment.provider_timeout_secs == 0 {
            return Err(EngineError::config("enrichment.provider_timeout_secs must be > 0"));
        }
        if self.enrichment.providers.is_empty() {
            return Err(EngineError::config("enrichment.providers is empty"));
        }
        for name in &self.enrichment.providers {
            if !KNOWN_PROVIDERS.contains(&name.as_str()) {
                return Err(EngineError::config(format!(
                    "unknown volume provider '{}' (known: {})",
                    name,
                    KNOWN_PROVIDERS.join(", ")
                )));
            }
        }
        validate_coverage_target(self.coverage.target)?;
        if let Some(total) = self.coverage.total_volume_override {
            if !total.is_finite() || total <= 0.0 {
                return Err(EngineError::config(
                    "coverage.total_volume_override must be a positive number",
                ));
            }
        }
        if self.pipeline.decode_concurrency == 0 || self.pipeline.channel_capacity == 0 {
            return Err(EngineError::config(
                "pipeline.decode_concurrency and pipeline.channel_capacity must be > 0",
            ));
        }
        if self.pipeline.replay_policy == ReplayPolicy::Dedupe && self.pipeline.dedupe_capacity == 0 {
            return Err(EngineError::config("pipeline.dedupe_capacity must be > 0 when deduplicating"));
        }
        if self.pipeline.universe_refresh_secs == Some(0) {
            return Err(EngineError::config("pipeline.universe_refresh_secs must be > 0"));
        }
        for f in &self.factories {
            f.validate()?;
        }
        for c in &self.core_contracts {
            c.validate()?;
        }
        for r in &self.rules {
            r.validate()?;
        }
        // Catches malformed signatures and selector conflicts with the built-ins
        SelectorRegistry::with_extra(&self.signatures)?;
        Ok(())
    }
}

pub fn validate_coverage_target(target: f64) -> Result<()> {
    if !(target > 0.0 && target <= 1.0) {
        return Err(EngineError::config(format!(
            "coverage target must be in (0, 1], got {}",
            target
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionType;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.scanner.chunk_size, 2000);
        assert_eq!(config.enrichment.window_days, 180);
        assert_eq!(config.coverage.target, 0.90);
        assert_eq!(config.profile.trader_swap_threshold, 5);
        assert_eq!(config.pipeline.replay_policy, ReplayPolicy::Dedupe);
        assert!(config.factories.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[node]
rpc_url = "https://eth.example.org"
max_retries = 5

[scanner]
chunk_size = 500

[enrichment]
providers = ["dexscreener", "defillama"]

[coverage]
target = 0.8

[pipeline]
confirmations = 6
replay_policy = "accept_duplicates"

[[signature]]
kind = "function"
signature = "stake(uint256)"
action = "stake"
protocol = "Custom Staking"

[[rule]]
tag = "Staker"
condition = { action_count_at_least = { action = "unstake", count = 1 } }
"#;
        let config = EngineConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.node.rpc_url, "https://eth.example.org");
        assert_eq!(config.node.max_retries, 5);
        assert_eq!(config.node.request_timeout_secs, 30);
        assert_eq!(config.scanner.chunk_size, 500);
        assert_eq!(config.enrichment.providers, vec!["dexscreener", "defillama"]);
        assert_eq!(config.coverage.target, 0.8);
        assert_eq!(config.pipeline.confirmations, 6);
        assert_eq!(config.pipeline.replay_policy, ReplayPolicy::AcceptDuplicates);
        assert_eq!(config.signatures[0].action, ActionType::Stake);
        assert_eq!(config.rules.len(), 1);
    }

    #[test]
    fn test_example_config_parses() {
        let config = EngineConfig::from_toml_str(include_str!("../config/venue_profiler.example.toml")).unwrap();
        assert_eq!(config.enrichment.subgraph_endpoints.len(), 3);
        assert_eq!(config.signatures.len(), 2);
        assert_eq!(config.rules.len(), 1);
        assert!(config.factories.is_empty());
        assert_eq!(config.pipeline.universe_refresh_secs, None);
    }

    #[test]
    fn test_coverage_target_bounds() {
        assert!(validate_coverage_target(1.0).is_ok());
        assert!(validate_coverage_target(0.01).is_ok());
        assert!(validate_coverage_target(0.0).is_err());
        assert!(validate_coverage_target(1.5).is_err());
        assert!(validate_coverage_target(f64::NAN).is_err());

        let res = EngineConfig::from_toml_str("[coverage]\ntarget = 0.0\n");
        assert!(matches!(res, Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let res = EngineConfig::from_toml_str("[enrichment]\nproviders = [\"coingecko\"]\n");
        assert!(matches!(res, Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let res = EngineConfig::from_toml_str("[scanner]\nchunk_size = 0\n");
        assert!(res.is_err());
    }

    #[test]
    fn test_malformed_toml_is_invalid_config() {
        let res = EngineConfig::from_toml_str("[scanner\nchunk_size = 1");
        assert!(matches!(res, Err(EngineError::InvalidConfig(_))));
    }
}
