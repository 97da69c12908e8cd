//! Profile Store
//!
//! The only mutable shared state in the engine. Updates go through
//! `ProfileStore::update`, which applies a closure to one profile under that
//! address's entry lock, so a profile is never observed half-updated.
//!
//! Author: AI-Generated
//! Created: 2026-10-19

use super::model::UserProfile;
use alloy::primitives::Address;
use dashmap::DashMap;

pub trait ProfileStore: Send + Sync {
    /// Run `f` on the profile for `address`, creating it first if absent.
    fn update(&self, address: Address, f: &mut dyn FnMut(&mut UserProfile));

    fn get(&self, address: &Address) -> Option<UserProfile>;

    /// Replace (or add) a whole profile, e.g. when resuming from a snapshot.
    fn insert(&self, profile: UserProfile);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every profile, ordered by address
    fn snapshot(&self) -> Vec<UserProfile>;
}

/// DashMap-backed store; the map shard lock doubles as the per-address lock.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: DashMap<Address, UserProfile>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn update(&self, address: Address, f: &mut dyn FnMut(&mut UserProfile)) {
        let mut entry = self
            .profiles
            .entry(address)
            .or_insert_with(|| UserProfile::new(address));
        f(entry.value_mut());
    }

    fn get(&self, address: &Address) -> Option<UserProfile> {
        self.profiles.get(address).map(|p| p.value().clone())
    }

    fn insert(&self, profile: UserProfile) {
        self.profiles.insert(profile.address, profile);
    }

    fn len(&self) -> usize {
        self.profiles.len()
    }

    fn snapshot(&self) -> Vec<UserProfile> {
        let mut all: Vec<UserProfile> = self.profiles.iter().map(|p| p.value().clone()).collect();
        all.sort_by_key(|p| p.address);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_update_creates_lazily() {
        let store = InMemoryProfileStore::new();
        let addr = Address::repeat_byte(7);
        assert!(store.get(&addr).is_none());

        store.update(addr, &mut |p| p.total_transactions += 1);
        store.update(addr, &mut |p| p.total_transactions += 1);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&addr).unwrap().total_transactions, 2);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let store = Arc::new(InMemoryProfileStore::new());
        let addr = Address::repeat_byte(7);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        store.update(addr, &mut |p| p.total_gas_used += 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.get(&addr).unwrap().total_gas_used, 8_000);
    }

    #[test]
    fn test_snapshot_sorted() {
        let store = InMemoryProfileStore::new();
        for b in [9u8, 3, 5] {
            store.insert(UserProfile::new(Address::repeat_byte(b)));
        }
        let addrs: Vec<Address> = store.snapshot().iter().map(|p| p.address).collect();
        assert_eq!(
            addrs,
            vec![Address::repeat_byte(3), Address::repeat_byte(5), Address::repeat_byte(9)]
        );
    }
}
