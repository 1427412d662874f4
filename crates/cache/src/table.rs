//! Entry storage shared by the cache and the sweeper
//!
//! Keeps the key map, a recency index over persistent entries, and the
//! logical clock used for `last_access`.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use crate::entry::{AccessStamp, Entry, Tier};

pub(crate) struct EntryTable<K, V> {
    /// Map from key to its single live entry
    entries: HashMap<K, Entry<V>>,

    /// Persistent entries ordered least recently accessed first
    recency: BTreeMap<AccessStamp, K>,

    /// Logical clock, advanced on every read or write
    clock: u64,

    /// Insertion counter for tie-breaking equal access times
    next_seq: u64,

    eager_count: usize,
}

impl<K, V> EntryTable<K, V>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            clock: 0,
            next_seq: 0,
            eager_count: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn eager_count(&self) -> usize {
        self.eager_count
    }

    pub(crate) fn persistent_count(&self) -> usize {
        self.recency.len()
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn get(&self, key: &K) -> Option<&Entry<V>> {
        self.entries.get(key)
    }

    /// Look up an entry and refresh its access time
    pub(crate) fn touch(&mut self, key: &K) -> Option<&V> {
        let tick = self.tick();
        let entry = self.entries.get_mut(key)?;
        if entry.tier() == Tier::Persistent {
            let old = entry.stamp();
            entry.touch(tick);
            let indexed = self.recency.remove(&old);
            assert!(indexed.is_some(), "persistent entry missing from recency index");
            self.recency.insert(entry.stamp(), key.clone());
        } else {
            entry.touch(tick);
        }
        Some(entry.value())
    }

    /// Insert or overwrite, returning the previous value if any
    ///
    /// Overwriting with the same tier keeps the entry and its insertion order.
    /// A tier change replaces the entry with a fresh one.
    pub(crate) fn insert(&mut self, key: K, value: V, tier: Tier) -> Option<V> {
        let tick = self.tick();

        if let Some(entry) = self.entries.get_mut(&key) {
            if entry.tier() == tier {
                let old = entry.stamp();
                let previous = entry.replace(value, tick);
                if tier == Tier::Persistent {
                    self.recency.remove(&old);
                    self.recency.insert(entry.stamp(), key);
                }
                return Some(previous);
            }
        }

        let previous = self.remove(&key).map(Entry::into_value);

        let seq = self.next_seq;
        self.next_seq += 1;
        let entry = Entry::new(value, tier, tick, seq);
        match tier {
            Tier::Persistent => {
                self.recency.insert(entry.stamp(), key.clone());
            }
            Tier::Eager => self.eager_count += 1,
        }
        let displaced = self.entries.insert(key, entry);
        assert!(displaced.is_none(), "duplicate live entry for key");

        previous
    }

    pub(crate) fn remove(&mut self, key: &K) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        match entry.tier() {
            Tier::Persistent => {
                self.recency.remove(&entry.stamp());
            }
            Tier::Eager => self.eager_count -= 1,
        }
        Some(entry)
    }

    /// Drop every eager entry except `protected`, returning how many were dropped
    pub(crate) fn remove_eager(&mut self, protected: Option<&K>) -> usize {
        if self.eager_count == 0 {
            return 0;
        }
        let before = self.entries.len();
        self.entries
            .retain(|key, entry| entry.tier() == Tier::Persistent || Some(key) == protected);
        let removed = before - self.entries.len();
        self.eager_count -= removed;
        removed
    }

    /// Persistent entries from least to most recently accessed
    pub(crate) fn persistent_by_recency(&self) -> impl Iterator<Item = (&K, &Entry<V>)> + '_ {
        self.recency.values().filter_map(move |key| {
            self.entries.get(key).map(|entry| (key, entry))
        })
    }

    /// The least recently accessed persistent key other than `protected`
    pub(crate) fn oldest_persistent(&self, protected: Option<&K>) -> Option<K> {
        self.recency
            .values()
            .find(|key| Some(*key) != protected)
            .cloned()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
        self.eager_count = 0;
    }

    /// Panic if the index and counters disagree with the key map
    pub(crate) fn assert_consistent(&self) {
        assert_eq!(
            self.entries.len(),
            self.recency.len() + self.eager_count,
            "entry table counters out of sync"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_touch() {
        let mut table = EntryTable::new();
        table.insert("a", 1, Tier::Persistent);
        table.insert("b", 2, Tier::Persistent);

        assert_eq!(table.touch(&"a"), Some(&1));
        assert_eq!(table.oldest_persistent(None), Some("b"));
        assert_eq!(table.touch(&"missing"), None);
        table.assert_consistent();
    }

    #[test]
    fn test_overwrite_same_tier_keeps_seq() {
        let mut table = EntryTable::new();
        table.insert("a", 1, Tier::Persistent);
        let seq = table.get(&"a").unwrap().insertion_seq();

        assert_eq!(table.insert("a", 2, Tier::Persistent), Some(1));
        let entry = table.get(&"a").unwrap();
        assert_eq!(entry.insertion_seq(), seq);
        assert_eq!(*entry.value(), 2);
        assert_eq!(table.len(), 1);
        table.assert_consistent();
    }

    #[test]
    fn test_tier_change_creates_new_entry() {
        let mut table = EntryTable::new();
        table.insert("a", 1, Tier::Eager);
        let seq = table.get(&"a").unwrap().insertion_seq();

        assert_eq!(table.insert("a", 2, Tier::Persistent), Some(1));
        let entry = table.get(&"a").unwrap();
        assert_eq!(entry.tier(), Tier::Persistent);
        assert!(entry.insertion_seq() > seq);
        assert_eq!(table.eager_count(), 0);
        assert_eq!(table.persistent_count(), 1);
        table.assert_consistent();
    }

    #[test]
    fn test_remove_eager_respects_protected() {
        let mut table = EntryTable::new();
        table.insert("a", 1, Tier::Eager);
        table.insert("b", 2, Tier::Eager);
        table.insert("c", 3, Tier::Persistent);

        assert_eq!(table.remove_eager(Some(&"b")), 1);
        assert!(!table.contains(&"a"));
        assert!(table.contains(&"b"));
        assert!(table.contains(&"c"));
        table.assert_consistent();
    }

    #[test]
    fn test_persistent_by_recency_order() {
        let mut table = EntryTable::new();
        table.insert(1, "one", Tier::Persistent);
        table.insert(2, "two", Tier::Persistent);
        table.insert(3, "three", Tier::Eager);
        table.insert(4, "four", Tier::Persistent);
        table.touch(&1);

        let order: Vec<_> = table.persistent_by_recency().map(|(k, _)| *k).collect();
        assert_eq!(order, vec![2, 4, 1]);
        assert_eq!(table.oldest_persistent(Some(&2)), Some(4));
    }
}
