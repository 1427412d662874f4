//! Tiered cache engine
//!
//! Holds values in two reclaim tiers. Eager entries are dropped on every
//! sweep; persistent entries survive sweeps until the host reports memory
//! pressure at or above the configured threshold, or until capacity forces
//! the least recently accessed one out.

use std::hash::Hash;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::TieredCacheConfig;
use crate::entry::Tier;
use crate::error::{CacheError, CacheResult};
use crate::pressure::{PressureLevel, PressureRelief, PressureSignal};
use crate::sweeper::{ReclaimSweeper, SweepReport, SweepTrigger};
use crate::table::EntryTable;

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of live entries
    pub entry_count: usize,

    /// Live entries in the eager tier
    pub eager_count: usize,

    /// Live entries in the persistent tier
    pub persistent_count: usize,

    /// Maximum number of live entries
    pub capacity: usize,

    /// Current pressure level
    pub pressure: PressureLevel,

    /// Number of lookups that returned a value
    pub hits: u64,

    /// Number of lookups that missed
    pub misses: u64,

    /// Eager entries reclaimed by sweeps
    pub eager_reclaimed: u64,

    /// Persistent entries reclaimed by sweeps under pressure
    pub persistent_reclaimed: u64,

    /// Persistent entries evicted to stay within capacity
    pub capacity_evictions: u64,

    /// Number of sweeps run
    pub sweeps: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate capacity utilization (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.entry_count as f64 / self.capacity as f64
        }
    }

    /// Total entries reclaimed by sweeps and capacity eviction
    pub fn total_reclaimed(&self) -> u64 {
        self.eager_reclaimed + self.persistent_reclaimed + self.capacity_evictions
    }
}

/// Internal cache state, guarded by a single mutex
struct CacheState<K, V> {
    table: EntryTable<K, V>,
    signal: PressureSignal,
    capacity: usize,
    stats: CacheStats,
}

impl<K, V> CacheState<K, V>
where
    K: Eq + Hash + Clone,
{
    fn record_sweep(&mut self, report: &SweepReport) {
        self.stats.sweeps += 1;
        self.stats.eager_reclaimed += report.eager_reclaimed as u64;
        self.stats.persistent_reclaimed += report.persistent_reclaimed as u64;
    }

    fn record_hit(&mut self, hit: bool) {
        if hit {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            entry_count: self.table.len(),
            eager_count: self.table.eager_count(),
            persistent_count: self.table.persistent_count(),
            capacity: self.capacity,
            pressure: self.signal.level(),
            ..self.stats
        }
    }
}

/// Two-tier cache driven by an external pressure signal
///
/// Thread-safe: every operation takes the same lock, so `put`, `get`,
/// `remove`, `set_pressure` and `force_sweep` never overlap. Sweeps run
/// synchronously inside the call that triggered them.
///
/// # Example
///
/// ```
/// use tiered_cache::{PressureLevel, Tier, TieredCache, TieredCacheConfig};
///
/// let cache = TieredCache::new(TieredCacheConfig::new(100)).unwrap();
///
/// cache.put("thumbnail", vec![0u8; 64], Tier::Eager);
/// cache.put("document", vec![1u8; 64], Tier::Persistent);
///
/// // Any pressure report sweeps the eager tier
/// cache.set_pressure(PressureLevel::Medium);
/// assert!(cache.get(&"thumbnail").is_none());
/// assert!(cache.get(&"document").is_some());
///
/// let stats = cache.stats();
/// println!("Hit rate: {:.2}%", stats.hit_rate() * 100.0);
/// ```
pub struct TieredCache<K, V> {
    state: Mutex<CacheState<K, V>>,
    sweeper: ReclaimSweeper<K, V>,
}

impl<K, V> TieredCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a cache that reclaims a batch fraction of persistent entries
    /// per eligible sweep
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidConfiguration`] if the capacity is zero or
    /// the batch fraction is out of range.
    pub fn new(config: TieredCacheConfig) -> CacheResult<Self> {
        config.validate()?;
        let sweeper = ReclaimSweeper::with_batch_fraction(config.batch_fraction());
        Ok(Self::build(&config, sweeper))
    }

    /// Create a cache with default settings and the given capacity
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidConfiguration`] if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> CacheResult<Self> {
        Self::new(TieredCacheConfig::new(capacity))
    }

    /// Create a cache whose pressure sweeps reclaim persistent entries until
    /// `estimator` reports enough relief to drop below the threshold
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidConfiguration`] for an invalid configuration.
    pub fn with_relief<R>(config: TieredCacheConfig, estimator: R) -> CacheResult<Self>
    where
        R: PressureRelief<K, V> + 'static,
    {
        config.validate()?;
        Ok(Self::build(&config, ReclaimSweeper::with_relief(estimator)))
    }

    /// Create a cache configured from `TIERED_CACHE_*` environment variables
    ///
    /// # Errors
    /// Returns an error if a variable is malformed or the result is invalid.
    pub fn from_env() -> CacheResult<Self> {
        Self::new(TieredCacheConfig::from_env()?)
    }

    fn build(config: &TieredCacheConfig, sweeper: ReclaimSweeper<K, V>) -> Self {
        debug!(
            capacity = config.capacity,
            threshold = %config.persistent_reclaim_threshold,
            estimator = sweeper.has_estimator(),
            "tiered cache created"
        );
        Self {
            state: Mutex::new(CacheState {
                table: EntryTable::new(),
                signal: PressureSignal::new(
                    config.initial_pressure,
                    config.persistent_reclaim_threshold,
                ),
                capacity: config.capacity,
                stats: CacheStats::default(),
            }),
            sweeper,
        }
    }

    /// Insert or overwrite a value
    ///
    /// Never fails. If a new key would exceed capacity, a sweep runs first;
    /// if that leaves the cache full, least recently accessed persistent
    /// entries are evicted until the new entry fits. Overwriting with a
    /// different tier replaces the entry with a new one.
    pub fn put(&self, key: K, value: V, tier: Tier) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if !state.table.contains(&key) && state.table.len() >= state.capacity {
            let report =
                self.sweeper
                    .sweep(&mut state.table, &state.signal, SweepTrigger::Capacity, Some(&key));
            state.record_sweep(&report);

            let evicted =
                self.sweeper
                    .reclaim_to_fit(&mut state.table, state.capacity - 1, Some(&key));
            state.stats.capacity_evictions += evicted as u64;
        }

        state.table.insert(key, value, tier);
        assert!(
            state.table.len() <= state.capacity,
            "cache exceeded capacity after insert"
        );
    }

    /// Retrieve a copy of a value, refreshing its access time
    ///
    /// Returns `None` for keys that were never inserted, were removed, or
    /// were reclaimed.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let mut state = self.state.lock();
        let value = state.table.touch(key).cloned();
        state.record_hit(value.is_some());
        value
    }

    /// Try to retrieve a value without blocking
    ///
    /// # Returns
    ///
    /// - `Some(Some(value))` - Cache hit
    /// - `Some(None)` - Cache miss
    /// - `None` - Could not acquire lock (cache is busy)
    pub fn try_get(&self, key: &K) -> Option<Option<V>>
    where
        V: Clone,
    {
        let mut state = self.state.try_lock()?;
        let value = state.table.touch(key).cloned();
        state.record_hit(value.is_some());
        Some(value)
    }

    /// Run `f` on a borrowed view of the value, refreshing its access time
    ///
    /// The cache lock is held while `f` runs.
    pub fn with_value<R>(&self, key: &K, f: impl FnOnce(&V) -> R) -> Option<R> {
        let mut state = self.state.lock();
        let result = state.table.touch(key).map(f);
        state.record_hit(result.is_some());
        result
    }

    /// Check if a key is live without refreshing its access time
    pub fn contains(&self, key: &K) -> bool {
        self.state.lock().table.contains(key)
    }

    /// Tier of a live entry
    pub fn tier_of(&self, key: &K) -> Option<Tier> {
        self.state.lock().table.get(key).map(|entry| entry.tier())
    }

    /// Remove an entry, returning its value
    ///
    /// Removing an absent key is a no-op.
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock();
        state.table.remove(key).map(|entry| entry.into_value())
    }

    /// Report a new pressure level and run one sweep
    ///
    /// Every call sweeps, including calls that lower the pressure or repeat
    /// the current level, so the eager tier is always cleared.
    pub fn set_pressure(&self, level: PressureLevel) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let previous = state.signal.set(level);
        if previous != level {
            info!(from = %previous, to = %level, "memory pressure changed");
        }

        let report =
            self.sweeper
                .sweep(&mut state.table, &state.signal, SweepTrigger::PressureChange, None);
        state.record_sweep(&report);
    }

    /// Run a sweep at the current pressure level
    ///
    /// Advisory: with no eager entries and pressure below the threshold the
    /// sweep reclaims nothing. Returns the number of entries reclaimed.
    pub fn force_sweep(&self) -> usize {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let report = self
            .sweeper
            .sweep(&mut state.table, &state.signal, SweepTrigger::Forced, None);
        state.record_sweep(&report);
        report.total()
    }

    /// Change the maximum entry count
    ///
    /// If the cache holds more entries than the new capacity, a sweep runs
    /// and then least recently accessed persistent entries are evicted.
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidConfiguration`] if `capacity` is zero.
    pub fn set_capacity(&self, capacity: usize) -> CacheResult<()> {
        if capacity == 0 {
            return Err(CacheError::InvalidConfiguration(
                "capacity must be greater than zero".to_string(),
            ));
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;
        info!(from = state.capacity, to = capacity, "cache capacity changed");
        state.capacity = capacity;

        if state.table.len() > capacity {
            let report =
                self.sweeper
                    .sweep(&mut state.table, &state.signal, SweepTrigger::Capacity, None);
            state.record_sweep(&report);

            let evicted = self.sweeper.reclaim_to_fit(&mut state.table, capacity, None);
            state.stats.capacity_evictions += evicted as u64;
        }
        Ok(())
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.state.lock().table.clear();
    }

    /// Number of live entries
    pub fn size(&self) -> usize {
        self.state.lock().table.len()
    }

    /// Returns true if the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Maximum number of live entries
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Current pressure level
    pub fn pressure(&self) -> PressureLevel {
        self.state.lock().signal.level()
    }

    /// Pressure level at which persistent entries become reclaimable
    pub fn threshold(&self) -> PressureLevel {
        self.state.lock().signal.threshold()
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        self.state.lock().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize) -> TieredCache<&'static str, u32> {
        TieredCache::with_capacity(capacity).expect("valid capacity")
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = TieredCache::<u32, u32>::with_capacity(0);
        assert!(matches!(result, Err(CacheError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_miss_for_unknown_key() {
        let cache = cache(4);
        assert_eq!(cache.get(&"missing"), None);

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_eager_visible_until_sweep() {
        let cache = cache(4);
        cache.put("a", 1, Tier::Eager);
        assert_eq!(cache.get(&"a"), Some(1));

        cache.set_pressure(PressureLevel::Low);
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn test_persistent_survives_sweeps_below_threshold() {
        let cache = cache(4);
        cache.put("p", 7, Tier::Persistent);

        for level in [PressureLevel::Low, PressureLevel::Medium, PressureLevel::Low] {
            cache.set_pressure(level);
            assert_eq!(cache.force_sweep(), 0);
            assert_eq!(cache.get(&"p"), Some(7));
        }
    }

    #[test]
    fn test_overwrite_replaces_value() {
        let cache = cache(4);
        cache.put("a", 1, Tier::Persistent);
        cache.put("a", 2, Tier::Persistent);

        assert_eq!(cache.size(), 1);
        assert_eq!(cache.get(&"a"), Some(2));
    }

    #[test]
    fn test_overwrite_with_new_tier() {
        let cache = cache(4);
        cache.put("a", 1, Tier::Eager);
        cache.put("a", 2, Tier::Persistent);
        assert_eq!(cache.tier_of(&"a"), Some(Tier::Persistent));

        cache.force_sweep();
        assert_eq!(cache.get(&"a"), Some(2));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let cache = cache(4);
        cache.put("a", 1, Tier::Persistent);

        assert_eq!(cache.remove(&"a"), Some(1));
        assert_eq!(cache.remove(&"a"), None);
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_put_sweeps_eager_first() {
        let cache = cache(2);
        cache.put("A", 1, Tier::Eager);
        cache.put("B", 2, Tier::Persistent);
        cache.put("C", 3, Tier::Persistent);

        assert_eq!(cache.get(&"A"), None);
        assert_eq!(cache.get(&"B"), Some(2));
        assert_eq!(cache.get(&"C"), Some(3));
        assert_eq!(cache.size(), 2);

        let stats = cache.stats();
        assert_eq!(stats.sweeps, 1);
        assert_eq!(stats.eager_reclaimed, 1);
        assert_eq!(stats.capacity_evictions, 0);
    }

    #[test]
    fn test_capacity_evicts_least_recently_accessed_persistent() {
        let cache = cache(2);
        cache.put("B", 2, Tier::Persistent);
        cache.put("C", 3, Tier::Persistent);
        cache.get(&"B");

        cache.put("D", 4, Tier::Persistent);
        assert!(cache.contains(&"B"));
        assert!(!cache.contains(&"C"));
        assert!(cache.contains(&"D"));
        assert_eq!(cache.stats().capacity_evictions, 1);
    }

    #[test]
    fn test_capacity_put_of_eager_entry_survives_its_own_sweep() {
        let cache = cache(1);
        cache.put("old", 1, Tier::Eager);
        cache.put("new", 2, Tier::Eager);

        assert_eq!(cache.size(), 1);
        assert_eq!(cache.get(&"new"), Some(2));
    }

    #[test]
    fn test_pressure_at_threshold_reclaims_oldest() {
        let config = TieredCacheConfig::new(16).with_batch_fraction(0.5);
        let cache = TieredCache::new(config).unwrap();
        for (i, key) in ["a", "b", "c", "d"].into_iter().enumerate() {
            cache.put(key, i as u32, Tier::Persistent);
        }
        cache.get(&"a");
        cache.get(&"b");

        cache.set_pressure(PressureLevel::High);
        assert!(cache.contains(&"a"));
        assert!(cache.contains(&"b"));
        assert!(!cache.contains(&"c"));
        assert!(!cache.contains(&"d"));
        assert_eq!(cache.stats().persistent_reclaimed, 2);
    }

    #[test]
    fn test_relief_estimator_drives_reclaim() {
        let config = TieredCacheConfig::new(16).with_threshold(PressureLevel::Medium);
        let cache: TieredCache<&str, u32> =
            TieredCache::with_relief(config, |_: &&str, value: &u32| *value as f64).unwrap();
        cache.put("small", 0, Tier::Persistent);
        cache.put("big", 1, Tier::Persistent);
        cache.put("kept", 1, Tier::Persistent);

        // Medium with a Medium threshold needs one level of relief
        cache.set_pressure(PressureLevel::Medium);
        assert!(!cache.contains(&"small"));
        assert!(!cache.contains(&"big"));
        assert!(cache.contains(&"kept"));
    }

    #[test]
    fn test_set_pressure_records_level() {
        let cache = cache(4);
        assert_eq!(cache.pressure(), PressureLevel::Low);
        assert_eq!(cache.threshold(), PressureLevel::High);

        cache.set_pressure(PressureLevel::High);
        assert_eq!(cache.pressure(), PressureLevel::High);
        assert_eq!(cache.stats().sweeps, 1);
    }

    #[test]
    fn test_force_sweep_counts_reclaimed() {
        let cache = cache(8);
        cache.put("a", 1, Tier::Eager);
        cache.put("b", 2, Tier::Eager);
        cache.put("c", 3, Tier::Persistent);

        assert_eq!(cache.force_sweep(), 2);
        assert_eq!(cache.force_sweep(), 0);
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_set_capacity_shrinks() {
        let cache = cache(8);
        for (i, key) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
            cache.put(key, i as u32, Tier::Persistent);
        }
        cache.put("x", 9, Tier::Eager);

        cache.set_capacity(3).unwrap();
        assert_eq!(cache.capacity(), 3);
        assert_eq!(cache.size(), 3);
        assert!(!cache.contains(&"x"));
        assert!(cache.contains(&"c"));
        assert!(cache.contains(&"d"));
        assert!(cache.contains(&"e"));

        assert!(cache.set_capacity(0).is_err());
        assert_eq!(cache.capacity(), 3);
    }

    #[test]
    fn test_with_value_borrows_and_touches() {
        let cache: TieredCache<u32, Vec<u8>> = TieredCache::with_capacity(2).unwrap();
        cache.put(1, vec![1, 2, 3], Tier::Persistent);
        cache.put(2, vec![4], Tier::Persistent);

        assert_eq!(cache.with_value(&1, |v| v.len()), Some(3));
        assert_eq!(cache.with_value(&9, |v| v.len()), None);

        // Key 1 was just read, so key 2 is evicted first
        cache.put(3, vec![], Tier::Persistent);
        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));
    }

    #[test]
    fn test_try_get_non_blocking() {
        let cache = cache(4);
        cache.put("a", 1, Tier::Persistent);

        assert_eq!(cache.try_get(&"a"), Some(Some(1)));
        assert_eq!(cache.try_get(&"b"), Some(None));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_try_get_while_locked() {
        let cache = cache(4);
        let _held = cache.state.lock();
        assert_eq!(cache.try_get(&"a"), None);
    }

    #[test]
    fn test_clear() {
        let cache = cache(4);
        cache.put("a", 1, Tier::Eager);
        cache.put("b", 2, Tier::Persistent);

        cache.clear();
        assert_eq!(cache.size(), 0);
        assert!(!cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert_eq!(cache.stats().total_reclaimed(), 0);
    }

    #[test]
    fn test_stats() {
        let cache = cache(4);
        cache.put("a", 1, Tier::Eager);
        cache.put("b", 2, Tier::Persistent);

        let _ = cache.get(&"a");
        let _ = cache.get(&"x");
        let _ = cache.get(&"y");

        let stats = cache.stats();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.eager_count, 1);
        assert_eq!(stats.persistent_count, 1);
        assert_eq!(stats.capacity, 4);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert!((stats.hit_rate() - 0.333).abs() < 0.01);
        assert_eq!(stats.utilization(), 0.5);
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let cache: Arc<TieredCache<u64, u64>> = Arc::new(TieredCache::with_capacity(64).unwrap());

        let handles: Vec<_> = (0..4u64)
            .map(|thread_id| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    let start = thread_id * 1000;
                    for i in start..start + 200 {
                        let tier = if i % 3 == 0 { Tier::Eager } else { Tier::Persistent };
                        cache.put(i, i, tier);
                        if i % 50 == 0 {
                            cache.set_pressure(PressureLevel::High);
                            cache.set_pressure(PressureLevel::Low);
                        }
                        assert!(cache.size() <= 64);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.size() <= 64);
    }
}
