//! Volume Providers
//!
//! Purpose:
//!     HTTP clients for the external sources of trailing venue volume. Each
//!     provider answers with a typed outcome instead of an error so the
//!     enrichment stage can fall through to the next one.
//!
//! Author: AI-Generated
//! Created: 2026-10-19
//!
//! Providers:
//!     subgraph     GraphQL (Uniswap V2 / SushiSwap pair day data, Uniswap V3
//!                  pool day data, Messari schema for Curve)
//!     defillama    GET {base}/pool/{address}
//!     dexscreener  GET {base}/pairs/{chain}/{address}
//!
//! Notes:
//!     - Response parsing is split from transport so it can be unit tested
//!     - DexScreener only reports short windows; without a long-window field
//!       its 24h volume is scaled to the window and the quote is labelled
//!       "dexscreener-extrapolated"

use crate::config::EnrichmentConfig;
use crate::error::{EngineError, Result};
use crate::types::{DiscoveredContract, TokenInfo};
use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VolumeQuote {
    pub volume_window: f64,
    pub tvl: f64,
    pub token0: Option<TokenInfo>,
    pub token1: Option<TokenInfo>,
    pub volume_24h: Option<f64>,
    pub volume_7d: Option<f64>,
    /// Overrides the provider name recorded on the venue metrics
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome {
    Found(VolumeQuote),
    /// Provider answered but has no data for this venue
    Empty,
    Failed(String),
}

#[async_trait]
pub trait VolumeProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, venue: &DiscoveredContract, window_days: u32) -> ProviderOutcome;
}

/// Build the configured providers in fallback order.
pub fn build_providers(config: &EnrichmentConfig) -> Result<Vec<Arc<dyn VolumeProvider>>> {
    let client = Client::builder()
        .timeout(Duration::from_secs(config.provider_timeout_secs))
        .user_agent(concat!("venue-profiler/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| EngineError::config(format!("failed to build HTTP client: {}", e)))?;

    config
        .providers
        .iter()
        .map(|name| -> Result<Arc<dyn VolumeProvider>> {
            match name.as_str() {
                "subgraph" => Ok(Arc::new(SubgraphProvider::new(
                    client.clone(),
                    config.subgraph_endpoints.clone(),
                ))),
                "defillama" => Ok(Arc::new(DefiLlamaProvider::new(
                    client.clone(),
                    config.defillama_url.clone(),
                ))),
                "dexscreener" => Ok(Arc::new(DexScreenerProvider::new(
                    client.clone(),
                    config.dexscreener_url.clone(),
                    config.chain.clone(),
                ))),
                other => Err(EngineError::config(format!("unknown volume provider '{}'", other))),
            }
        })
        .collect()
}

// ── Value helpers ───────────────────────────────────────────────────────

/// Subgraphs encode BigDecimal as strings; REST APIs use numbers.
fn num(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn token(v: &Value, address_key: &str) -> Option<TokenInfo> {
    if !v.is_object() {
        return None;
    }
    Some(TokenInfo {
        address: v.get(address_key).and_then(Value::as_str).and_then(|s| s.parse::<Address>().ok()),
        symbol: v.get("symbol").and_then(Value::as_str).unwrap_or_default().to_string(),
        decimals: v.get("decimals").and_then(num).map(|d| d as u8),
    })
}

/// Sum the volume field of daily rows (newest first).
fn sum_days(days: &[Value], field: &str, take: usize) -> f64 {
    days.iter().take(take).filter_map(|d| d.get(field).and_then(num)).sum()
}

// ── Subgraph ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubgraphSchema {
    /// Uniswap V2 and forks: pair { dayData }
    V2Pair,
    /// Uniswap V3: pool { poolDayData }
    V3Pool,
    /// Messari standard: liquidityPool { dailySnapshots }
    Messari,
}

impl SubgraphSchema {
    pub fn for_protocol(protocol: &str) -> Option<Self> {
        match protocol {
            "Uniswap V2" | "SushiSwap" => Some(SubgraphSchema::V2Pair),
            "Uniswap V3" => Some(SubgraphSchema::V3Pool),
            p if p.starts_with("Curve") => Some(SubgraphSchema::Messari),
            _ => None,
        }
    }

    pub fn query(&self, address: &Address, days: u32) -> String {
        let id = format!("{:#x}", address);
        match self {
            SubgraphSchema::V2Pair => format!(
                r#"{{ pair(id: "{id}") {{ reserveUSD token0 {{ id symbol decimals }} token1 {{ id symbol decimals }} dayData(first: {days}, orderBy: date, orderDirection: desc) {{ date dailyVolumeUSD }} }} }}"#
            ),
            SubgraphSchema::V3Pool => format!(
                r#"{{ pool(id: "{id}") {{ totalValueLockedUSD token0 {{ id symbol decimals }} token1 {{ id symbol decimals }} poolDayData(first: {days}, orderBy: date, orderDirection: desc) {{ date volumeUSD }} }} }}"#
            ),
            SubgraphSchema::Messari => format!(
                r#"{{ liquidityPool(id: "{id}") {{ totalValueLockedUSD inputTokens {{ id symbol decimals }} dailySnapshots(first: {days}, orderBy: timestamp, orderDirection: desc) {{ timestamp dailyVolumeUSD }} }} }}"#
            ),
        }
    }

    /// Parse a GraphQL response body. `Empty` when the entity is absent or
    /// has no daily rows, so the next provider gets asked.
    pub fn parse(&self, body: &Value) -> ProviderOutcome {
        if let Some(errors) = body.get("errors") {
            return ProviderOutcome::Failed(format!("graphql errors: {}", errors));
        }
        let data = match body.get("data") {
            Some(d) => d,
            None => return ProviderOutcome::Failed("response has no data field".into()),
        };
        let (entity_key, days_key, volume_key, tvl_key) = match self {
            SubgraphSchema::V2Pair => ("pair", "dayData", "dailyVolumeUSD", "reserveUSD"),
            SubgraphSchema::V3Pool => ("pool", "poolDayData", "volumeUSD", "totalValueLockedUSD"),
            SubgraphSchema::Messari => (
                "liquidityPool",
                "dailySnapshots",
                "dailyVolumeUSD",
                "totalValueLockedUSD",
            ),
        };
        let entity = match data.get(entity_key) {
            Some(e) if !e.is_null() => e,
            _ => return ProviderOutcome::Empty,
        };
        let days = entity
            .get(days_key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        if days.is_empty() {
            return ProviderOutcome::Empty;
        }

        let (token0, token1) = match self {
            SubgraphSchema::Messari => {
                let inputs = entity
                    .get("inputTokens")
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                (
                    inputs.first().and_then(|t| token(t, "id")),
                    inputs.get(1).and_then(|t| token(t, "id")),
                )
            }
            _ => (
                entity.get("token0").and_then(|t| token(t, "id")),
                entity.get("token1").and_then(|t| token(t, "id")),
            ),
        };

        ProviderOutcome::Found(VolumeQuote {
            volume_window: sum_days(days, volume_key, usize::MAX),
            tvl: entity.get(tvl_key).and_then(num).unwrap_or(0.0),
            token0,
            token1,
            volume_24h: days.first().and_then(|d| d.get(volume_key)).and_then(num),
            volume_7d: Some(sum_days(days, volume_key, 7)),
            source: None,
        })
    }
}

pub struct SubgraphProvider {
    client: Client,
    endpoints: BTreeMap<String, String>,
}

impl SubgraphProvider {
    pub fn new(client: Client, endpoints: BTreeMap<String, String>) -> Self {
        Self { client, endpoints }
    }
}

#[async_trait]
impl VolumeProvider for SubgraphProvider {
    fn name(&self) -> &str {
        "subgraph"
    }

    async fn fetch(&self, venue: &DiscoveredContract, window_days: u32) -> ProviderOutcome {
        let (Some(schema), Some(endpoint)) = (
            SubgraphSchema::for_protocol(&venue.protocol),
            self.endpoints.get(&venue.protocol),
        ) else {
            return ProviderOutcome::Empty;
        };

        let query = schema.query(&venue.address, window_days);
        trace!("Subgraph query for {}: {}", venue.address, query);
        let response = match self.client.post(endpoint).json(&json!({ "query": query })).send().await {
            Ok(r) => r,
            Err(e) => return ProviderOutcome::Failed(e.to_string()),
        };
        if !response.status().is_success() {
            return ProviderOutcome::Failed(format!("HTTP {}", response.status()));
        }
        match response.json::<Value>().await {
            Ok(body) => schema.parse(&body),
            Err(e) => ProviderOutcome::Failed(format!("invalid JSON: {}", e)),
        }
    }
}

// ── DefiLlama ───────────────────────────────────────────────────────────

pub fn parse_defillama(body: &Value) -> ProviderOutcome {
    if body.is_null() || body.get("error").is_some() {
        return ProviderOutcome::Empty;
    }
    let Some(pool) = body.get("data").filter(|d| d.is_object()) else {
        return ProviderOutcome::Empty;
    };
    let Some(volume) = pool.get("volume180d").and_then(num) else {
        return ProviderOutcome::Empty;
    };
    ProviderOutcome::Found(VolumeQuote {
        volume_window: volume,
        tvl: pool.get("tvl").and_then(num).unwrap_or(0.0),
        token0: pool.get("token0").and_then(|t| token(t, "address")),
        token1: pool.get("token1").and_then(|t| token(t, "address")),
        volume_24h: pool.get("volume24h").and_then(num),
        volume_7d: pool.get("volume7d").and_then(num),
        source: None,
    })
}

pub struct DefiLlamaProvider {
    client: Client,
    base_url: String,
}

impl DefiLlamaProvider {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl VolumeProvider for DefiLlamaProvider {
    fn name(&self) -> &str {
        "defillama"
    }

    async fn fetch(&self, venue: &DiscoveredContract, _window_days: u32) -> ProviderOutcome {
        let url = format!("{}/pool/{:#x}", self.base_url.trim_end_matches('/'), venue.address);
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => return ProviderOutcome::Failed(e.to_string()),
        };
        if response.status() == StatusCode::NOT_FOUND {
            return ProviderOutcome::Empty;
        }
        if !response.status().is_success() {
            return ProviderOutcome::Failed(format!("HTTP {}", response.status()));
        }
        match response.json::<Value>().await {
            Ok(body) => parse_defillama(&body),
            Err(e) => ProviderOutcome::Failed(format!("invalid JSON: {}", e)),
        }
    }
}

// ── DexScreener ─────────────────────────────────────────────────────────

pub const DEXSCREENER_EXTRAPOLATED: &str = "dexscreener-extrapolated";

/// Parse a pair response. A quote scaled up from 24h volume carries the
/// `DEXSCREENER_EXTRAPOLATED` source label.
pub fn parse_dexscreener(body: &Value, window_days: u32) -> ProviderOutcome {
    let Some(pair) = body
        .get("pairs")
        .and_then(Value::as_array)
        .and_then(|pairs| pairs.first())
    else {
        return ProviderOutcome::Empty;
    };
    let volume = pair.get("volume");
    let h24 = volume.and_then(|v| v.get("h24")).and_then(num);
    let long_window = volume.and_then(|v| v.get("m180")).and_then(num);

    let (volume_window, extrapolated) = match (long_window, h24) {
        (Some(v), _) => (v, false),
        (None, Some(day)) => (day * window_days as f64, true),
        (None, None) => return ProviderOutcome::Empty,
    };

    let quote = VolumeQuote {
        volume_window,
        tvl: pair
            .get("liquidity")
            .and_then(|l| l.get("usd"))
            .and_then(num)
            .unwrap_or(0.0),
        token0: pair.get("baseToken").and_then(|t| token(t, "address")),
        token1: pair.get("quoteToken").and_then(|t| token(t, "address")),
        volume_24h: h24,
        volume_7d: volume.and_then(|v| v.get("h168")).and_then(num),
        source: extrapolated.then(|| DEXSCREENER_EXTRAPOLATED.to_string()),
    };
    ProviderOutcome::Found(quote)
}

pub struct DexScreenerProvider {
    client: Client,
    base_url: String,
    chain: String,
}

impl DexScreenerProvider {
    pub fn new(client: Client, base_url: String, chain: String) -> Self {
        Self { client, base_url, chain }
    }
}

#[async_trait]
impl VolumeProvider for DexScreenerProvider {
    fn name(&self) -> &str {
        "dexscreener"
    }

    async fn fetch(&self, venue: &DiscoveredContract, window_days: u32) -> ProviderOutcome {
        let url = format!(
            "{}/pairs/{}/{:#x}",
            self.base_url.trim_end_matches('/'),
            self.chain,
            venue.address
        );
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => return ProviderOutcome::Failed(e.to_string()),
        };
        if !response.status().is_success() {
            return ProviderOutcome::Failed(format!("HTTP {}", response.status()));
        }
        match response.json::<Value>().await {
            Ok(body) => {
                let outcome = parse_dexscreener(&body, window_days);
                if matches!(&outcome, ProviderOutcome::Found(q) if q.source.is_some()) {
                    trace!("dexscreener: {} volume extrapolated from 24h", venue.address);
                }
                outcome
            }
            Err(e) => ProviderOutcome::Failed(format!("invalid JSON: {}", e)),
        }
    }
}
