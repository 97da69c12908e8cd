//! Core Types
//!
//! Shared data structures: discovered venues with their volume metrics, the
//! closed action taxonomy, and the normalized decoded action that flows from
//! the decoder into the profile engine.
//!
//! Author: AI-Generated
//! Created: 2026-10-19

use alloy::primitives::{Address, FixedBytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// 4-byte function selector
pub type FunctionSelector = FixedBytes<4>;

// ── Venues ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Option<Address>,
    pub symbol: String,
    pub decimals: Option<u8>,
}

/// Trailing-window economic metrics for one venue, as reported by a volume provider.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VenueMetrics {
    /// USD volume over the configured window (180 days by default)
    pub volume_window: f64,
    /// Current USD liquidity
    pub tvl: f64,
    pub token0: Option<TokenInfo>,
    pub token1: Option<TokenInfo>,
    pub volume_24h: Option<f64>,
    pub volume_7d: Option<f64>,
    /// Name of the provider that answered
    pub provider: String,
}

/// A venue: a contract address users transact against.
///
/// Factory children carry `source_factory`; manually registered core
/// contracts (routers, lending pools) have `source_factory = None` and are
/// pinned into every universe regardless of coverage.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredContract {
    pub address: Address,
    pub protocol: String,
    pub category: String,
    pub source_factory: Option<Address>,
    pub creation_block: u64,
    pub creation_tx: Option<B256>,
    pub metrics: Option<VenueMetrics>,
}

impl DiscoveredContract {
    pub fn volume(&self) -> f64 {
        self.metrics.as_ref().map(|m| m.volume_window).unwrap_or(0.0)
    }

    pub fn is_pinned(&self) -> bool {
        self.source_factory.is_none()
    }

    /// "SYM0/SYM1" when both token symbols are known
    pub fn token_pair(&self) -> Option<String> {
        let m = self.metrics.as_ref()?;
        match (&m.token0, &m.token1) {
            (Some(t0), Some(t1)) if !t0.symbol.is_empty() && !t1.symbol.is_empty() => {
                Some(format!("{}/{}", t0.symbol, t1.symbol))
            }
            _ => None,
        }
    }
}

// ── Actions ───────────────────────────────────────────────────────────

/// Closed taxonomy of user actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Swap,
    AddLiquidity,
    RemoveLiquidity,
    Supply,
    Withdraw,
    Borrow,
    Repay,
    FlashLoan,
    Liquidation,
    Stake,
    Unstake,
    ClaimRewards,
    NftBuy,
    Multicall,
    Transfer,
    Approve,
}

impl ActionType {
    pub const ALL: [ActionType; 16] = [
        ActionType::Swap,
        ActionType::AddLiquidity,
        ActionType::RemoveLiquidity,
        ActionType::Supply,
        ActionType::Withdraw,
        ActionType::Borrow,
        ActionType::Repay,
        ActionType::FlashLoan,
        ActionType::Liquidation,
        ActionType::Stake,
        ActionType::Unstake,
        ActionType::ClaimRewards,
        ActionType::NftBuy,
        ActionType::Multicall,
        ActionType::Transfer,
        ActionType::Approve,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Swap => "swap",
            ActionType::AddLiquidity => "add_liquidity",
            ActionType::RemoveLiquidity => "remove_liquidity",
            ActionType::Supply => "supply",
            ActionType::Withdraw => "withdraw",
            ActionType::Borrow => "borrow",
            ActionType::Repay => "repay",
            ActionType::FlashLoan => "flash_loan",
            ActionType::Liquidation => "liquidation",
            ActionType::Stake => "stake",
            ActionType::Unstake => "unstake",
            ActionType::ClaimRewards => "claim_rewards",
            ActionType::NftBuy => "nft_buy",
            ActionType::Multicall => "multicall",
            ActionType::Transfer => "transfer",
            ActionType::Approve => "approve",
        }
    }

    /// Generic actions (token plumbing) lose to protocol-specific ones when
    /// picking a transaction's primary action.
    pub fn is_generic(&self) -> bool {
        matches!(self, ActionType::Transfer | ActionType::Approve)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .iter()
            .find(|a| a.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown action type '{}'", s))
    }
}

/// One normalized user action, produced by the decoder.
///
/// A transaction yields one action, or several for batch entrypoints;
/// `action_index` is the action's position within its transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedAction {
    pub tx_hash: B256,
    pub block_number: u64,
    pub tx_index: u64,
    /// Block timestamp (unix seconds)
    pub timestamp: u64,
    pub user: Address,
    pub venue: Address,
    pub protocol: String,
    pub action_type: ActionType,
    pub function_selector: Option<FunctionSelector>,
    pub event_selector: Option<B256>,
    pub log_index: Option<u64>,
    pub action_index: u32,
    pub gas_used: u64,
    pub gas_price: u128,
    pub value: U256,
    pub success: bool,
    pub metadata: BTreeMap<String, String>,
}

impl DecodedAction {
    /// Gas cost in wei (gas_used * effective gas price)
    pub fn gas_cost_wei(&self) -> U256 {
        U256::from(self.gas_used) * U256::from(self.gas_price)
    }
}
