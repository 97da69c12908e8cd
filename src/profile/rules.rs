//! Tag Rules and Scores
//!
//! Category tags come from a declarative table of `(condition → tag)`
//! rules evaluated against a profile's counters. The default table is built
//! from `[profile]` thresholds; `[[rule]]` entries in config are appended.
//! Risk and sophistication scores are pure functions of the counters and
//! tag set, recomputed on every update.
//!
//! Author: AI-Generated
//! Created: 2026-10-19

use super::model::{CategoryTag, UserProfile};
use crate::config::ProfileConfig;
use crate::error::{EngineError, Result};
use crate::types::ActionType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    ActionCountAtLeast { action: ActionType, count: u64 },
    ActionCountExceeds { action: ActionType, count: u64 },
    /// Sum of the listed action counts reaches `count`
    AnyActionAtLeast { actions: Vec<ActionType>, count: u64 },
    TotalTransactionsExceeds { count: u64 },
    DistinctVenuesExceeds { count: usize },
    DistinctProtocolsAtLeast { count: usize },
    All(Vec<Condition>),
}

impl Condition {
    pub fn holds(&self, p: &UserProfile) -> bool {
        match self {
            Condition::ActionCountAtLeast { action, count } => p.action_count(*action) >= *count,
            Condition::ActionCountExceeds { action, count } => p.action_count(*action) > *count,
            Condition::AnyActionAtLeast { actions, count } => {
                actions.iter().map(|a| p.action_count(*a)).sum::<u64>() >= *count
            }
            Condition::TotalTransactionsExceeds { count } => p.total_transactions > *count,
            Condition::DistinctVenuesExceeds { count } => p.distinct_venues() > *count,
            Condition::DistinctProtocolsAtLeast { count } => p.distinct_protocols() >= *count,
            Condition::All(all) => all.iter().all(|c| c.holds(p)),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Condition::AnyActionAtLeast { actions, .. } if actions.is_empty() => {
                Err(EngineError::config("any_action_at_least needs at least one action"))
            }
            Condition::All(all) if all.is_empty() => Err(EngineError::config("'all' needs at least one condition")),
            Condition::All(all) => all.iter().try_for_each(Condition::validate),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRule {
    pub tag: CategoryTag,
    pub condition: Condition,
}

impl TagRule {
    pub fn new(tag: CategoryTag, condition: Condition) -> Self {
        Self { tag, condition }
    }

    pub fn validate(&self) -> Result<()> {
        self.condition
            .validate()
            .map_err(|e| EngineError::config(format!("rule for {}: {}", self.tag, e)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    rules: Vec<TagRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<TagRule>) -> Result<Self> {
        for r in &rules {
            r.validate()?;
        }
        Ok(Self { rules })
    }

    pub fn default_rules(cfg: &ProfileConfig) -> Self {
        use ActionType::*;
        use CategoryTag::*;
        let at_least = |action: ActionType, count: u64| Condition::ActionCountAtLeast { action, count };
        Self {
            rules: vec![
                TagRule::new(
                    LiquidityProvider,
                    Condition::AnyActionAtLeast {
                        actions: vec![AddLiquidity, RemoveLiquidity],
                        count: 1,
                    },
                ),
                TagRule::new(Lender, at_least(Supply, 1)),
                TagRule::new(Borrower, at_least(Borrow, 1)),
                TagRule::new(
                    Trader,
                    Condition::ActionCountExceeds {
                        action: Swap,
                        count: cfg.trader_swap_threshold,
                    },
                ),
                TagRule::new(Staker, at_least(Stake, 1)),
                TagRule::new(
                    ArbitrageSuspect,
                    Condition::All(vec![
                        Condition::TotalTransactionsExceeds {
                            count: cfg.arbitrage_min_transactions,
                        },
                        Condition::DistinctVenuesExceeds {
                            count: cfg.arbitrage_min_venues,
                        },
                        Condition::ActionCountExceeds {
                            action: Swap,
                            count: cfg.arbitrage_min_swaps,
                        },
                    ]),
                ),
                TagRule::new(FlashLoanUser, at_least(FlashLoan, 1)),
                TagRule::new(NftTrader, at_least(NftBuy, 1)),
                TagRule::new(
                    DefiExplorer,
                    Condition::DistinctProtocolsAtLeast {
                        count: cfg.explorer_min_protocols,
                    },
                ),
            ],
        }
    }

    /// Default table followed by config-supplied rules.
    pub fn from_config(cfg: &ProfileConfig, extra: &[TagRule]) -> Result<Self> {
        let mut rules = Self::default_rules(cfg).rules;
        rules.extend_from_slice(extra);
        Self::new(rules)
    }

    pub fn rules(&self) -> &[TagRule] {
        &self.rules
    }

    /// Every tag whose condition currently holds.
    pub fn evaluate(&self, p: &UserProfile) -> BTreeSet<CategoryTag> {
        self.rules
            .iter()
            .filter(|r| r.condition.holds(p))
            .map(|r| r.tag)
            .collect()
    }
}

// ── Scores ──────────────────────────────────────────────────────────────

fn ratio(n: u64, cap: u64) -> f64 {
    (n as f64 / cap as f64).min(1.0)
}

/// Exposure to leverage and liquidation, in [0, 1].
pub fn risk_score(p: &UserProfile) -> f64 {
    let borrows = p.action_count(ActionType::Borrow);
    let supplies = p.action_count(ActionType::Supply);
    let leverage = if borrows == 0 {
        0.0
    } else {
        borrows as f64 / (borrows + supplies) as f64
    };
    let score = 0.4 * leverage
        + 0.3 * ratio(p.action_count(ActionType::FlashLoan), 5)
        + 0.2 * ratio(p.action_count(ActionType::Liquidation), 3)
        + if p.tags.contains(&CategoryTag::ArbitrageSuspect) { 0.1 } else { 0.0 };
    score.clamp(0.0, 1.0)
}

/// Breadth of protocol, action and venue usage, in [0, 1].
pub fn sophistication_score(p: &UserProfile) -> f64 {
    let action_kinds = p.action_counts.values().filter(|&&c| c > 0).count() as u64;
    let composes = p.action_count(ActionType::Multicall) > 0 || p.action_count(ActionType::FlashLoan) > 0;
    let score = 0.3 * ratio(p.distinct_protocols() as u64, 5)
        + 0.25 * ratio(action_kinds, 6)
        + 0.2 * ratio(p.distinct_venues() as u64, 10)
        + if composes { 0.15 } else { 0.0 }
        + 0.1 * ratio(p.tags.len() as u64, 3);
    score.clamp(0.0, 1.0)
}
