//! Profile Engine
//!
//! Purpose:
//!     Apply decoded actions to user profiles: bump counters, run the tag
//!     rules, recompute scores. The caller hands actions over in chain order
//!     from a single writer.
//!
//! Author: AI-Generated
//! Created: 2026-10-19
//!
//! Replay policy:
//!     dedupe             (default) an action whose (tx_hash, action_index)
//!                        was applied recently is skipped; "recently" is a
//!                        FIFO window of `dedupe_capacity` keys
//!     accept_duplicates  every delivery is counted (at-least-once)
//!
//! The window is saved with the profile snapshot and restored on resume, so
//! a resumed run over an overlapping range does not count actions twice.

use super::model::{CategoryTag, UserProfile};
use super::rules::{risk_score, sophistication_score, RuleSet};
use super::store::ProfileStore;
use crate::types::DecodedAction;
use alloy::primitives::B256;
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPolicy {
    #[default]
    Dedupe,
    AcceptDuplicates,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Counters updated; `new_tags` were earned by this action
    Applied { new_tags: Vec<CategoryTag> },
    /// Same (tx_hash, action_index) already applied
    Duplicate,
}

/// Identity of one applied action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionKey {
    pub tx_hash: B256,
    pub action_index: u32,
}

impl ActionKey {
    pub fn of(action: &DecodedAction) -> Self {
        Self {
            tx_hash: action.tx_hash,
            action_index: action.action_index,
        }
    }
}

/// Bounded recently-seen set: insertion order in a deque, the oldest key is
/// forgotten once `max_len` is exceeded.
#[derive(Debug)]
struct SeenWindow {
    seen: DashSet<ActionKey>,
    order: Mutex<VecDeque<ActionKey>>,
    max_len: usize,
}

impl SeenWindow {
    fn new(max_len: usize) -> Self {
        Self {
            seen: DashSet::new(),
            order: Mutex::new(VecDeque::new()),
            max_len: max_len.max(1),
        }
    }

    /// False when `key` is already in the window
    fn remember(&self, key: ActionKey) -> bool {
        if !self.seen.insert(key) {
            return false;
        }
        let mut order = self.order.lock().unwrap_or_else(|e| e.into_inner());
        order.push_back(key);
        if order.len() > self.max_len {
            if let Some(oldest) = order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    fn keys(&self) -> Vec<ActionKey> {
        let order = self.order.lock().unwrap_or_else(|e| e.into_inner());
        order.iter().copied().collect()
    }
}

pub struct ProfileEngine {
    store: Arc<dyn ProfileStore>,
    rules: RuleSet,
    policy: ReplayPolicy,
    window: SeenWindow,
    applied: AtomicU64,
    duplicates: AtomicU64,
}

impl ProfileEngine {
    pub fn new(store: Arc<dyn ProfileStore>, rules: RuleSet, policy: ReplayPolicy, dedupe_capacity: usize) -> Self {
        Self {
            store,
            rules,
            policy,
            window: SeenWindow::new(dedupe_capacity),
            applied: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    pub fn policy(&self) -> ReplayPolicy {
        self.policy
    }

    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    /// Keys in the dedupe window, oldest first
    pub fn recent_actions(&self) -> Vec<ActionKey> {
        self.window.keys()
    }

    /// Seed the dedupe window, oldest first. Returns how many keys were new.
    pub fn restore_recent(&self, keys: &[ActionKey]) -> usize {
        keys.iter().filter(|k| self.window.remember(**k)).count()
    }

    pub fn apply(&self, action: &DecodedAction) -> ApplyOutcome {
        if self.policy == ReplayPolicy::Dedupe && !self.window.remember(ActionKey::of(action)) {
            debug!(
                "Skipping duplicate action {}#{} for {}",
                action.tx_hash, action.action_index, action.user
            );
            self.duplicates.fetch_add(1, Ordering::Relaxed);
            return ApplyOutcome::Duplicate;
        }

        let mut new_tags = Vec::new();
        self.store.update(action.user, &mut |profile: &mut UserProfile| {
            profile.record(action);
            for tag in self.rules.evaluate(profile) {
                if profile.tags.insert(tag) {
                    new_tags.push(tag);
                }
            }
            profile.risk_score = risk_score(profile);
            profile.sophistication_score = sophistication_score(profile);
        });
        self.applied.fetch_add(1, Ordering::Relaxed);

        if !new_tags.is_empty() {
            trace!("{} earned {:?} at block {}", action.user, new_tags, action.block_number);
        }
        ApplyOutcome::Applied { new_tags }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileConfig;
    use crate::profile::model::fixtures::action;
    use crate::profile::store::InMemoryProfileStore;
    use crate::types::ActionType;
    use alloy::primitives::Address;
    use std::collections::BTreeSet;

    fn engine(policy: ReplayPolicy, capacity: usize) -> ProfileEngine {
        ProfileEngine::new(
            Arc::new(InMemoryProfileStore::new()),
            RuleSet::default_rules(&ProfileConfig::default()),
            policy,
            capacity,
        )
    }

    fn user() -> Address {
        Address::repeat_byte(0xbb)
    }

    #[test]
    fn test_single_delivery_counts_once() {
        let e = engine(ReplayPolicy::Dedupe, 100);
        let a = action(user(), ActionType::Swap, Address::repeat_byte(0x42), 1);
        assert!(matches!(e.apply(&a), ApplyOutcome::Applied { .. }));

        let p = e.store().get(&user()).unwrap();
        assert_eq!(p.action_count(ActionType::Swap), 1);
        assert_eq!(p.total_transactions, 1);
    }

    #[test]
    fn test_duplicate_delivery_deduped() {
        let e = engine(ReplayPolicy::Dedupe, 100);
        let a = action(user(), ActionType::Swap, Address::repeat_byte(0x42), 1);
        e.apply(&a);
        assert_eq!(e.apply(&a), ApplyOutcome::Duplicate);

        let p = e.store().get(&user()).unwrap();
        assert_eq!(p.action_count(ActionType::Swap), 1);
        assert_eq!(p.total_transactions, 1);
        assert_eq!(e.applied(), 1);
        assert_eq!(e.duplicates(), 1);
    }

    #[test]
    fn test_duplicate_delivery_counted_when_accepted() {
        let e = engine(ReplayPolicy::AcceptDuplicates, 100);
        let a = action(user(), ActionType::Swap, Address::repeat_byte(0x42), 1);
        e.apply(&a);
        assert!(matches!(e.apply(&a), ApplyOutcome::Applied { .. }));

        let p = e.store().get(&user()).unwrap();
        assert_eq!(p.action_count(ActionType::Swap), 2);
        assert_eq!(p.total_transactions, 2);
    }

    #[test]
    fn test_second_action_of_same_tx_is_not_a_duplicate() {
        let e = engine(ReplayPolicy::Dedupe, 100);
        let first = action(user(), ActionType::Swap, Address::repeat_byte(0x42), 1);
        let mut second = first.clone();
        second.action_index = 1;
        e.apply(&first);
        assert!(matches!(e.apply(&second), ApplyOutcome::Applied { .. }));
        assert_eq!(e.store().get(&user()).unwrap().total_transactions, 1);
    }

    #[test]
    fn test_window_forgets_oldest() {
        let e = engine(ReplayPolicy::Dedupe, 2);
        let a1 = action(user(), ActionType::Swap, Address::repeat_byte(0x42), 1);
        let a2 = action(user(), ActionType::Swap, Address::repeat_byte(0x42), 2);
        let a3 = action(user(), ActionType::Swap, Address::repeat_byte(0x42), 3);
        e.apply(&a1);
        e.apply(&a2);
        e.apply(&a3);
        // a1 fell out of the window
        assert!(matches!(e.apply(&a1), ApplyOutcome::Applied { .. }));
        assert_eq!(e.apply(&a3), ApplyOutcome::Duplicate);
    }

    #[test]
    fn test_restored_window_dedupes_replay() {
        let first = engine(ReplayPolicy::Dedupe, 2);
        for tx in 1..=3 {
            first.apply(&action(user(), ActionType::Swap, Address::repeat_byte(0x42), tx));
        }
        let keys = first.recent_actions();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0], ActionKey::of(&action(user(), ActionType::Swap, Address::repeat_byte(0x42), 2)));

        let resumed = engine(ReplayPolicy::Dedupe, 2);
        assert_eq!(resumed.restore_recent(&keys), 2);
        let replay = action(user(), ActionType::Swap, Address::repeat_byte(0x42), 3);
        assert_eq!(resumed.apply(&replay), ApplyOutcome::Duplicate);
    }

    #[test]
    fn test_trader_tag_on_sixth_swap() {
        let e = engine(ReplayPolicy::Dedupe, 100);
        for tx in 1..=5 {
            e.apply(&action(user(), ActionType::Swap, Address::repeat_byte(0x42), tx));
        }
        assert!(!e.store().get(&user()).unwrap().tags.contains(&CategoryTag::Trader));

        let outcome = e.apply(&action(user(), ActionType::Swap, Address::repeat_byte(0x42), 6));
        assert_eq!(
            outcome,
            ApplyOutcome::Applied {
                new_tags: vec![CategoryTag::Trader]
            }
        );
    }

    #[test]
    fn test_tags_are_monotonic() {
        let e = engine(ReplayPolicy::Dedupe, 1_000);
        let sequence = [
            ActionType::Supply,
            ActionType::Swap,
            ActionType::Borrow,
            ActionType::Repay,
            ActionType::Withdraw,
            ActionType::AddLiquidity,
            ActionType::RemoveLiquidity,
            ActionType::Stake,
            ActionType::Transfer,
        ];
        let mut previous: BTreeSet<CategoryTag> = BTreeSet::new();
        for (i, kind) in sequence.iter().cycle().take(60).enumerate() {
            let venue = Address::repeat_byte((i % 13) as u8 + 1);
            e.apply(&action(user(), *kind, venue, i as u64 + 1));
            let tags = e.store().get(&user()).unwrap().tags;
            assert!(previous.is_subset(&tags), "tags shrank after action {}", i);
            previous = tags;
        }
        assert!(previous.contains(&CategoryTag::Lender));
        assert!(previous.contains(&CategoryTag::Borrower));
    }

    #[test]
    fn test_scores_recomputed_on_update() {
        let e = engine(ReplayPolicy::Dedupe, 100);
        e.apply(&action(user(), ActionType::Borrow, Address::repeat_byte(0x42), 1));
        let p = e.store().get(&user()).unwrap();
        assert_eq!(p.risk_score, risk_score(&p));
        assert!(p.risk_score > 0.0);
        assert_eq!(p.sophistication_score, sophistication_score(&p));
    }
}
