//! Selector Registry
//!
//! Maps 4-byte function selectors and 32-byte event topics to semantic
//! action types. Selectors are derived from canonical signatures with
//! keccak256, so the built-in table below is just signatures and labels.
//!
//! Author: AI-Generated
//! Created: 2026-10-19
//!
//! Built-in coverage:
//!     Uniswap V2 / SushiSwap router: swaps, add/remove liquidity
//!     Uniswap V3 SwapRouter: exactInput*, exactOutput*, multicall
//!     Universal Router: execute (batch)
//!     Aave V2/V3 pool: supply, withdraw, borrow, repay, flash loans, liquidations
//!     Compound V3 Comet: supply, withdraw
//!     Lido / Rocket Pool: stake, unstake
//!     Seaport: basic order fulfillment
//!     ERC20: transfer, approve (generic)

use crate::error::{EngineError, Result};
use crate::types::{ActionType, FunctionSelector};
use alloy::primitives::{keccak256, B256};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    Function,
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selector {
    Function(FunctionSelector),
    Event(B256),
}

impl Selector {
    /// Derive the selector of a canonical signature such as
    /// `transfer(address,uint256)`.
    pub fn from_signature(kind: SelectorKind, signature: &str) -> Self {
        let hash = keccak256(signature.as_bytes());
        match kind {
            SelectorKind::Function => Selector::Function(FunctionSelector::from_slice(&hash[..4])),
            SelectorKind::Event => Selector::Event(hash),
        }
    }

    pub fn to_hex(&self) -> String {
        match self {
            Selector::Function(s) => format!("{}", s),
            Selector::Event(t) => format!("{}", t),
        }
    }
}

/// A signature entry as written in config (`[[signature]]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureConfig {
    pub kind: SelectorKind,
    /// Canonical signature, e.g. `supply(address,uint256,address,uint16)`
    pub signature: String,
    pub action: ActionType,
    pub protocol: String,
    #[serde(default)]
    pub description: String,
    /// Optional hex selector; verified against the signature hash
    #[serde(default)]
    pub selector: Option<String>,
    /// Batch entrypoint: one action per recognized event log
    #[serde(default)]
    pub batch: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionSignature {
    pub name: String,
    pub signature: String,
    pub selector: Selector,
    pub action: ActionType,
    pub protocol: String,
    pub description: String,
    pub batch: bool,
}

impl ActionSignature {
    pub fn from_config(cfg: &SignatureConfig) -> Result<Self> {
        let signature = cfg.signature.trim();
        let open = signature.find('(');
        if open.map_or(true, |i| i == 0) || !signature.ends_with(')') || signature.contains(' ') {
            return Err(EngineError::config(format!(
                "signature '{}' is not canonical (name(type,...) without spaces)",
                cfg.signature
            )));
        }
        if cfg.batch && cfg.kind == SelectorKind::Event {
            return Err(EngineError::config(format!(
                "event signature '{}' cannot be a batch entrypoint",
                signature
            )));
        }
        let selector = Selector::from_signature(cfg.kind, signature);
        if let Some(explicit) = &cfg.selector {
            if !explicit.eq_ignore_ascii_case(&selector.to_hex()) {
                return Err(EngineError::config(format!(
                    "selector {} does not match signature '{}' ({})",
                    explicit,
                    signature,
                    selector.to_hex()
                )));
            }
        }
        let name = signature[..open.unwrap_or(0)].to_string();
        Ok(Self {
            name,
            signature: signature.to_string(),
            selector,
            action: cfg.action,
            protocol: cfg.protocol.clone(),
            description: cfg.description.clone(),
            batch: cfg.batch,
        })
    }
}

// ── Built-in table ────────────────────────────────────────────────────

use ActionType::*;
use SelectorKind::{Event as Evt, Function as Func};

struct Builtin {
    kind: SelectorKind,
    signature: &'static str,
    action: ActionType,
    protocol: &'static str,
    description: &'static str,
    batch: bool,
}

const fn sig(
    kind: SelectorKind,
    signature: &'static str,
    action: ActionType,
    protocol: &'static str,
    description: &'static str,
) -> Builtin {
    Builtin {
        kind,
        signature,
        action,
        protocol,
        description,
        batch: false,
    }
}

impl Builtin {
    const fn batch(self) -> Self {
        Builtin { batch: true, ..self }
    }
}

const BUILTIN_SIGNATURES: &[Builtin] = &[
    // Uniswap V2 / SushiSwap router
    sig(Func, "swapExactTokensForTokens(uint256,uint256,address[],address,uint256)", Swap, "Uniswap V2", "Swap an exact token input along a V2 path"),
    sig(Func, "swapTokensForExactTokens(uint256,uint256,address[],address,uint256)", Swap, "Uniswap V2", "Swap tokens for an exact token output along a V2 path"),
    sig(Func, "swapExactETHForTokens(uint256,address[],address,uint256)", Swap, "Uniswap V2", "Swap exact ETH for tokens along a V2 path"),
    sig(Func, "swapTokensForExactETH(uint256,uint256,address[],address,uint256)", Swap, "Uniswap V2", "Swap tokens for an exact ETH output"),
    sig(Func, "swapExactTokensForETH(uint256,uint256,address[],address,uint256)", Swap, "Uniswap V2", "Swap exact tokens for ETH"),
    sig(Func, "swapETHForExactTokens(uint256,address[],address,uint256)", Swap, "Uniswap V2", "Swap ETH for an exact token output"),
    sig(Func, "swapExactTokensForTokensSupportingFeeOnTransferTokens(uint256,uint256,address[],address,uint256)", Swap, "Uniswap V2", "Exact-input V2 swap tolerating fee-on-transfer tokens"),
    sig(Func, "addLiquidity(address,address,uint256,uint256,uint256,uint256,address,uint256)", AddLiquidity, "Uniswap V2", "Deposit a token pair into a V2 pool"),
    sig(Func, "addLiquidityETH(address,uint256,uint256,uint256,address,uint256)", AddLiquidity, "Uniswap V2", "Deposit a token and ETH into a V2 pool"),
    sig(Func, "removeLiquidity(address,address,uint256,uint256,uint256,address,uint256)", RemoveLiquidity, "Uniswap V2", "Burn V2 LP tokens for the underlying pair"),
    sig(Func, "removeLiquidityETH(address,uint256,uint256,uint256,address,uint256)", RemoveLiquidity, "Uniswap V2", "Burn V2 LP tokens for a token and ETH"),
    // Uniswap V3 SwapRouter
    sig(Func, "exactInputSingle((address,address,uint24,address,uint256,uint256,uint256,uint160))", Swap, "Uniswap V3", "Exact-input swap through one V3 pool"),
    sig(Func, "exactInput((bytes,address,uint256,uint256,uint256))", Swap, "Uniswap V3", "Exact-input swap along a multi-hop V3 path"),
    sig(Func, "exactOutputSingle((address,address,uint24,address,uint256,uint256,uint256,uint160))", Swap, "Uniswap V3", "Exact-output swap through one V3 pool"),
    sig(Func, "exactOutput((bytes,address,uint256,uint256,uint256))", Swap, "Uniswap V3", "Exact-output swap along a multi-hop V3 path"),
    sig(Func, "multicall(uint256,bytes[])", Multicall, "Uniswap V3", "Batched router calls with a deadline").batch(),
    sig(Func, "multicall(bytes[])", Multicall, "Uniswap V3", "Batched router calls").batch(),
    // Universal Router
    sig(Func, "execute(bytes,bytes[],uint256)", Multicall, "Uniswap", "Universal Router command batch with a deadline").batch(),
    sig(Func, "execute(bytes,bytes[])", Multicall, "Uniswap", "Universal Router command batch").batch(),
    // Aave V3 pool
    sig(Func, "supply(address,uint256,address,uint16)", Supply, "Aave V3", "Supply an asset as collateral to the Aave pool"),
    sig(Func, "withdraw(address,uint256,address)", Withdraw, "Aave V3", "Withdraw a supplied asset from the Aave pool"),
    sig(Func, "borrow(address,uint256,uint256,uint16,address)", Borrow, "Aave V3", "Borrow an asset against collateral"),
    sig(Func, "repay(address,uint256,uint256,address)", Repay, "Aave V3", "Repay borrowed debt"),
    sig(Func, "flashLoan(address,address[],uint256[],uint256[],address,bytes,uint16)", FlashLoan, "Aave V3", "Multi-asset flash loan"),
    sig(Func, "flashLoanSimple(address,address,uint256,bytes,uint16)", FlashLoan, "Aave V3", "Single-asset flash loan"),
    sig(Func, "liquidationCall(address,address,address,uint256,bool)", Liquidation, "Aave V3", "Liquidate an undercollateralized position"),
    // Aave V2 pool
    sig(Func, "deposit(address,uint256,address,uint16)", Supply, "Aave V2", "Deposit an asset into the Aave V2 pool"),
    // Compound V3 Comet
    sig(Func, "supply(address,uint256)", Supply, "Compound V3", "Supply base or collateral to a Comet market"),
    sig(Func, "withdraw(address,uint256)", Withdraw, "Compound V3", "Withdraw base or collateral from a Comet market"),
    // Liquid staking
    sig(Func, "submit(address)", Stake, "Lido", "Stake ETH for stETH"),
    sig(Func, "requestWithdrawals(uint256[],address)", Unstake, "Lido", "Queue stETH withdrawal requests"),
    sig(Func, "deposit()", Stake, "Rocket Pool", "Stake ETH for rETH"),
    // Staking rewards (Synthetix-style)
    sig(Func, "getReward()", ClaimRewards, "Staking Rewards", "Claim accrued staking rewards"),
    // Seaport
    sig(Func, "fulfillBasicOrder((address,uint256,uint256,address,address,address,uint256,uint256,uint8,uint256,uint256,bytes32,uint256,bytes32,bytes32,uint256,(uint256,address)[],bytes))", NftBuy, "OpenSea", "Fill a basic Seaport listing"),
    sig(Func, "fulfillBasicOrder_efficient_6GL6yc((address,uint256,uint256,address,address,address,uint256,uint256,uint8,uint256,uint256,bytes32,uint256,bytes32,bytes32,uint256,(uint256,address)[],bytes))", NftBuy, "OpenSea", "Fill a basic Seaport listing (gas-optimised entrypoint)"),
    // ERC20
    sig(Func, "transfer(address,uint256)", Transfer, "ERC20", "ERC20 token transfer"),
    sig(Func, "approve(address,uint256)", Approve, "ERC20", "ERC20 spending approval"),
    // ── Events ──
    sig(Evt, "Swap(address,uint256,uint256,uint256,uint256,address)", Swap, "Uniswap V2", "V2 pair swap"),
    sig(Evt, "Mint(address,uint256,uint256)", AddLiquidity, "Uniswap V2", "V2 pair liquidity added"),
    sig(Evt, "Burn(address,uint256,uint256,address)", RemoveLiquidity, "Uniswap V2", "V2 pair liquidity removed"),
    sig(Evt, "Swap(address,address,int256,int256,uint160,uint128,int24)", Swap, "Uniswap V3", "V3 pool swap"),
    sig(Evt, "Mint(address,address,int24,int24,uint128,uint256,uint256)", AddLiquidity, "Uniswap V3", "V3 position liquidity added"),
    sig(Evt, "Burn(address,int24,int24,uint128,uint256,uint256)", RemoveLiquidity, "Uniswap V3", "V3 position liquidity removed"),
    sig(Evt, "Swap(bytes32,address,address,uint256,uint256)", Swap, "Balancer V2", "Balancer vault swap"),
    sig(Evt, "Supply(address,address,address,uint256,uint16)", Supply, "Aave V3", "Aave reserve supplied"),
    sig(Evt, "Withdraw(address,address,address,uint256)", Withdraw, "Aave V3", "Aave reserve withdrawn"),
    sig(Evt, "Borrow(address,address,address,uint256,uint8,uint256,uint16)", Borrow, "Aave V3", "Aave reserve borrowed"),
    sig(Evt, "Repay(address,address,address,uint256,bool)", Repay, "Aave V3", "Aave debt repaid"),
    sig(Evt, "FlashLoan(address,address,address,uint256,uint8,uint256,uint16)", FlashLoan, "Aave V3", "Aave flash loan executed"),
    sig(Evt, "LiquidationCall(address,address,address,uint256,uint256,address,bool)", Liquidation, "Aave V3", "Aave position liquidated"),
    sig(Evt, "Supply(address,address,uint256)", Supply, "Compound V3", "Comet base supplied"),
    sig(Evt, "Withdraw(address,address,uint256)", Withdraw, "Compound V3", "Comet base withdrawn"),
    sig(Evt, "Submitted(address,uint256,address)", Stake, "Lido", "ETH staked with Lido"),
    sig(Evt, "OrderFulfilled(bytes32,address,address,address,(uint8,address,uint256,uint256)[],(uint8,address,uint256,uint256,address)[])", NftBuy, "OpenSea", "Seaport order filled"),
    sig(Evt, "Transfer(address,address,uint256)", Transfer, "ERC20", "ERC20 transfer"),
    sig(Evt, "Approval(address,address,uint256)", Approve, "ERC20", "ERC20 approval"),
];

fn builtin_configs() -> impl Iterator<Item = SignatureConfig> {
    BUILTIN_SIGNATURES
        .iter()
        .map(|b| SignatureConfig {
            kind: b.kind,
            signature: b.signature.to_string(),
            action: b.action,
            protocol: b.protocol.to_string(),
            description: b.description.to_string(),
            selector: None,
            batch: b.batch,
        })
}

static BUILTIN: Lazy<SelectorRegistry> = Lazy::new(|| {
    let mut registry = SelectorRegistry::empty();
    for cfg in builtin_configs() {
        if let Err(e) = ActionSignature::from_config(&cfg).and_then(|sig| registry.insert(sig)) {
            warn!("Skipping built-in signature {}: {}", cfg.signature, e);
        }
    }
    registry
});

// ── Registry ──────────────────────────────────────────────────────────

/// Selector → action lookup tables. Immutable once built and shared
/// read-only by decoder workers.
#[derive(Debug, Clone, Default)]
pub struct SelectorRegistry {
    functions: HashMap<FunctionSelector, ActionSignature>,
    events: HashMap<B256, ActionSignature>,
}

impl SelectorRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    /// Built-in table extended with config-supplied signatures.
    pub fn with_extra(extra: &[SignatureConfig]) -> Result<Self> {
        let mut registry = Self::builtin();
        for cfg in extra {
            registry.insert(ActionSignature::from_config(cfg)?)?;
        }
        Ok(registry)
    }

    /// Register a signature. Re-registering the same selector with the same
    /// action is a no-op; a different action is a conflict.
    pub fn insert(&mut self, sig: ActionSignature) -> Result<()> {
        let existing = match sig.selector {
            Selector::Function(s) => self.functions.get(&s),
            Selector::Event(t) => self.events.get(&t),
        };
        if let Some(prev) = existing {
            if prev.action == sig.action && prev.batch == sig.batch {
                return Ok(());
            }
            return Err(EngineError::config(format!(
                "selector {} already maps '{}' to {}; refusing '{}' as {}",
                sig.selector.to_hex(),
                prev.signature,
                prev.action,
                sig.signature,
                sig.action
            )));
        }
        match sig.selector {
            Selector::Function(s) => self.functions.insert(s, sig),
            Selector::Event(t) => self.events.insert(t, sig),
        };
        Ok(())
    }

    /// Look up calldata by its first four bytes.
    pub fn lookup_function(&self, input: &[u8]) -> Option<&ActionSignature> {
        if input.len() < 4 {
            return None;
        }
        self.functions.get(&FunctionSelector::from_slice(&input[..4]))
    }

    pub fn lookup_event(&self, topic0: &B256) -> Option<&ActionSignature> {
        self.events.get(topic0)
    }

    /// Every registered signature, functions first
    pub fn signatures(&self) -> impl Iterator<Item = &ActionSignature> {
        self.functions.values().chain(self.events.values())
    }

    pub fn len(&self) -> usize {
        self.functions.len() + self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Return the 4-byte selector as a hex string for logging
pub fn selector_hex(input: &[u8]) -> String {
    if input.len() < 4 {
        return "0x????".to_string();
    }
    format!("0x{:02x}{:02x}{:02x}{:02x}", input[0], input[1], input[2], input[3])
}
