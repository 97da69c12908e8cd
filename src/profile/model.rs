//! Per-address behavioral profile and the category tags it can earn.

use crate::types::{ActionType, DecodedAction};
use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CategoryTag {
    Trader,
    LiquidityProvider,
    Lender,
    Borrower,
    Staker,
    ArbitrageSuspect,
    FlashLoanUser,
    NftTrader,
    DefiExplorer,
}

impl CategoryTag {
    pub const ALL: [CategoryTag; 9] = [
        CategoryTag::Trader,
        CategoryTag::LiquidityProvider,
        CategoryTag::Lender,
        CategoryTag::Borrower,
        CategoryTag::Staker,
        CategoryTag::ArbitrageSuspect,
        CategoryTag::FlashLoanUser,
        CategoryTag::NftTrader,
        CategoryTag::DefiExplorer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryTag::Trader => "Trader",
            CategoryTag::LiquidityProvider => "LiquidityProvider",
            CategoryTag::Lender => "Lender",
            CategoryTag::Borrower => "Borrower",
            CategoryTag::Staker => "Staker",
            CategoryTag::ArbitrageSuspect => "ArbitrageSuspect",
            CategoryTag::FlashLoanUser => "FlashLoanUser",
            CategoryTag::NftTrader => "NftTrader",
            CategoryTag::DefiExplorer => "DefiExplorer",
        }
    }
}

impl fmt::Display for CategoryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CategoryTag::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown category tag '{}'", s))
    }
}

/// Accumulated state for one address. Counters only grow and tags are
/// never removed.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub address: Address,
    pub tags: BTreeSet<CategoryTag>,
    pub action_counts: BTreeMap<ActionType, u64>,
    pub protocol_counts: BTreeMap<String, u64>,
    /// Unix seconds of the earliest / latest applied action; `None` until
    /// the first one
    pub first_seen: Option<u64>,
    pub last_seen: u64,
    pub last_block: u64,
    pub total_transactions: u64,
    pub total_gas_used: u64,
    pub total_gas_cost_wei: U256,
    pub total_value_wei: U256,
    pub unique_contracts: BTreeSet<Address>,
    pub risk_score: f64,
    pub sophistication_score: f64,
}

impl UserProfile {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            tags: BTreeSet::new(),
            action_counts: BTreeMap::new(),
            protocol_counts: BTreeMap::new(),
            first_seen: None,
            last_seen: 0,
            last_block: 0,
            total_transactions: 0,
            total_gas_used: 0,
            total_gas_cost_wei: U256::ZERO,
            total_value_wei: U256::ZERO,
            unique_contracts: BTreeSet::new(),
            risk_score: 0.0,
            sophistication_score: 0.0,
        }
    }

    pub fn action_count(&self, action: ActionType) -> u64 {
        self.action_counts.get(&action).copied().unwrap_or(0)
    }

    pub fn distinct_venues(&self) -> usize {
        self.unique_contracts.len()
    }

    pub fn distinct_protocols(&self) -> usize {
        self.protocol_counts.len()
    }

    pub fn total_actions(&self) -> u64 {
        self.action_counts.values().sum()
    }

    /// Fold one action into the counters. Gas, value and the transaction
    /// count are per transaction, so they are taken from the first action
    /// of each transaction only.
    pub fn record(&mut self, action: &DecodedAction) {
        *self.action_counts.entry(action.action_type).or_default() += 1;
        *self.protocol_counts.entry(action.protocol.clone()).or_default() += 1;
        self.unique_contracts.insert(action.venue);

        self.first_seen = Some(self.first_seen.map_or(action.timestamp, |t| t.min(action.timestamp)));
        self.last_seen = self.last_seen.max(action.timestamp);
        self.last_block = self.last_block.max(action.block_number);

        if action.action_index == 0 {
            self.total_transactions += 1;
            self.total_gas_used = self.total_gas_used.saturating_add(action.gas_used);
            self.total_gas_cost_wei = self.total_gas_cost_wei.saturating_add(action.gas_cost_wei());
            self.total_value_wei = self.total_value_wei.saturating_add(action.value);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::action;
    use super::*;

    #[test]
    fn test_record_accumulates() {
        let user = Address::repeat_byte(1);
        let mut p = UserProfile::new(user);
        p.record(&action(user, ActionType::Swap, Address::repeat_byte(0x10), 2));
        p.record(&action(user, ActionType::Swap, Address::repeat_byte(0x11), 1));

        assert_eq!(p.action_count(ActionType::Swap), 2);
        assert_eq!(p.action_count(ActionType::Borrow), 0);
        assert_eq!(p.total_transactions, 2);
        assert_eq!(p.total_gas_used, 200_000);
        assert_eq!(p.total_gas_cost_wei, U256::from(2_000_000u64));
        assert_eq!(p.distinct_venues(), 2);
        assert_eq!(p.first_seen, Some(1_700_000_012));
        assert_eq!(p.last_seen, 1_700_000_024);
        assert_eq!(p.last_block, 102);
    }

    #[test]
    fn test_second_action_of_a_tx_is_not_a_new_transaction() {
        let user = Address::repeat_byte(1);
        let mut p = UserProfile::new(user);
        let first = action(user, ActionType::Swap, Address::repeat_byte(0x10), 1);
        let mut second = first.clone();
        second.action_index = 1;
        second.venue = Address::repeat_byte(0x11);
        p.record(&first);
        p.record(&second);

        assert_eq!(p.action_count(ActionType::Swap), 2);
        assert_eq!(p.total_transactions, 1);
        assert_eq!(p.total_gas_used, 100_000);
        assert_eq!(p.total_value_wei, U256::from(1u64));
    }

    #[test]
    fn test_zero_timestamp_is_a_real_first_seen() {
        let user = Address::repeat_byte(1);
        let mut p = UserProfile::new(user);
        assert_eq!(p.first_seen, None);

        let mut genesis = action(user, ActionType::Transfer, Address::repeat_byte(0x10), 1);
        genesis.timestamp = 0;
        p.record(&genesis);
        p.record(&action(user, ActionType::Swap, Address::repeat_byte(0x10), 2));

        assert_eq!(p.first_seen, Some(0));
        assert_eq!(p.last_seen, 1_700_000_024);
    }

    #[test]
    fn test_tag_names_round_trip() {
        for tag in CategoryTag::ALL {
            assert_eq!(tag.as_str().parse::<CategoryTag>().unwrap(), tag);
            assert_eq!(serde_json::to_string(&tag).unwrap(), format!("\"{}\"", tag));
        }
    }
}
