//! Latest-wins bookkeeping for view state that is refreshed by overlapping
//! requests. Each refresh takes a [`Ticket`] before it queries; when it comes
//! back, its result is only kept if nothing newer has been committed for the
//! same key since.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Debug, PartialEq)]
pub enum Commit<T> {
    Accepted(T),
    /// A newer ticket already committed; carries the value currently shown.
    Stale(T),
}

impl<T> Commit<T> {
    pub fn into_inner(self) -> T {
        match self {
            Commit::Accepted(value) | Commit::Stale(value) => value,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Commit::Stale(_))
    }
}

/// Committed values per key. Tickets come from one counter shared by every
/// key, so dropping a key never lets an old ticket outrank a new one.
#[derive(Debug)]
pub struct GenerationMap<K, T> {
    issued: AtomicU64,
    slots: Mutex<HashMap<K, (Ticket, T)>>,
}

impl<K, T> Default for GenerationMap<K, T> {
    fn default() -> Self {
        Self {
            issued: AtomicU64::new(0),
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash, T: Clone> GenerationMap<K, T> {
    pub fn begin(&self) -> Ticket {
        Ticket(self.issued.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn commit(&self, key: K, ticket: Ticket, value: T) -> Commit<T> {
        let mut slots = self.lock();
        if let Some((current, shown)) = slots.get(&key) {
            if *current >= ticket {
                return Commit::Stale(shown.clone());
            }
        }
        slots.insert(key, (ticket, value.clone()));
        Commit::Accepted(value)
    }

    /// Drops every committed value whose key matches.
    pub fn forget_where(&self, matches: impl Fn(&K) -> bool) {
        self.lock().retain(|key, _| !matches(key));
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, (Ticket, T)>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_response_cannot_overwrite_newer_state() {
        let map = GenerationMap::default();
        let slow = map.begin();
        let fast = map.begin();
        assert!(fast > slow);

        assert_eq!(map.commit("u1", fast, "april 11"), Commit::Accepted("april 11"));
        assert_eq!(map.commit("u1", slow, "april 10"), Commit::Stale("april 11"));
    }

    #[test]
    fn older_result_is_shown_until_newer_one_lands() {
        let map = GenerationMap::default();
        let first = map.begin();
        let second = map.begin();
        assert!(!map.commit("u1", first, 1).is_stale());
        assert!(!map.commit("u1", second, 2).is_stale());
        assert_eq!(map.commit("u1", first, 3), Commit::Stale(2));
    }

    #[test]
    fn keys_are_independent() {
        let map = GenerationMap::default();
        let a = map.begin();
        let b = map.begin();
        assert_eq!(map.commit("u2", b, 20), Commit::Accepted(20));
        assert_eq!(map.commit("u1", a, 10), Commit::Accepted(10));
    }

    #[test]
    fn late_commit_after_forget_does_not_block_fresh_requests() {
        let map = GenerationMap::default();
        let mut last = map.begin();
        for _ in 0..4 {
            last = map.begin();
        }

        map.forget_where(|key: &&str| *key == "u1");
        assert_eq!(map.commit("u1", last, "old board"), Commit::Accepted("old board"));

        let fresh = map.begin();
        assert_eq!(
            map.commit("u1", fresh, "fresh board"),
            Commit::Accepted("fresh board")
        );
    }

    #[test]
    fn forget_only_drops_matching_keys() {
        let map = GenerationMap::default();
        let a = map.begin();
        let b = map.begin();
        map.commit(("u1", 10), a, "u1 day 10");
        map.commit(("u2", 10), b, "u2 day 10");

        map.forget_where(|(user, _)| *user == "u1");
        assert_eq!(map.commit(("u1", 10), a, "again"), Commit::Accepted("again"));
        assert_eq!(map.commit(("u2", 10), a, "late"), Commit::Stale("u2 day 10"));
    }
}
