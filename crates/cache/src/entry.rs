//! Cache entries and their reclaim tiers
//!
//! Every value stored in a [`TieredCache`](crate::TieredCache) lives in an
//! [`Entry`] tagged with a [`Tier`]. The tier decides when a sweep is allowed
//! to reclaim the entry and never changes for the lifetime of the entry.

use std::fmt;

/// Reclaim priority of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Reclaimed on every sweep, regardless of memory pressure
    Eager,
    /// Reclaimed only once memory pressure reaches the configured threshold
    Persistent,
}

impl Tier {
    /// Returns true if this entry is cleared by every sweep
    pub fn is_eager(&self) -> bool {
        matches!(self, Tier::Eager)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Eager => write!(f, "eager"),
            Tier::Persistent => write!(f, "persistent"),
        }
    }
}

/// Logical position of an entry in access order
///
/// Ordered by `tick` first, then by insertion `seq`, so two entries with the
/// same last access resolve to the one inserted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccessStamp {
    /// Logical clock value of the last successful read or write
    pub tick: u64,

    /// Insertion order of the entry, fixed at creation
    pub seq: u64,
}

/// A single cache slot
#[derive(Debug, Clone)]
pub struct Entry<V> {
    value: V,
    tier: Tier,
    stamp: AccessStamp,
}

impl<V> Entry<V> {
    /// Create a new entry accessed at `tick` with insertion order `seq`
    pub fn new(value: V, tier: Tier, tick: u64, seq: u64) -> Self {
        Self {
            value,
            tier,
            stamp: AccessStamp { tick, seq },
        }
    }

    /// The stored value
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Reclaim tier of this entry
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Logical timestamp of the last successful read or write
    pub fn last_access(&self) -> u64 {
        self.stamp.tick
    }

    /// Insertion order of this entry
    pub fn insertion_seq(&self) -> u64 {
        self.stamp.seq
    }

    /// Combined recency key used for least-recently-accessed ordering
    pub fn stamp(&self) -> AccessStamp {
        self.stamp
    }

    /// Mark the entry as accessed at `tick`
    pub(crate) fn touch(&mut self, tick: u64) {
        self.stamp.tick = tick;
    }

    /// Swap in a new value, returning the old one
    pub(crate) fn replace(&mut self, value: V, tick: u64) -> V {
        self.touch(tick);
        std::mem::replace(&mut self.value, value)
    }

    /// Consume the entry and return its value
    pub fn into_value(self) -> V {
        self.value
    }
}
