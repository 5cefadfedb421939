//! LruCache: thread-safe LRU engine
//!
//! Lookups go through the sharded [`KeyIndex`] without touching the engine
//! mutex. The mutex guards only the [`RecencyList`]; every structural change
//! (insert, promote, unlink, evict, clear) and every index write happens
//! while it is held, so both structures agree whenever it is released.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::index::KeyIndex;
use crate::iter::EntryIter;
use crate::list::{Handle, RecencyList};
use crate::stats::{CacheStats, StatsRecorder};

/// Upper bound on slots reserved up front; larger caches grow on demand
const MAX_PREALLOC: usize = 4096;

/// Fixed-capacity, thread-safe least-recently-used cache
///
/// ```
/// use lrucache::LruCache;
///
/// let cache = LruCache::new(2)?;
/// cache.put("a", 1);
/// cache.put("b", 2);
/// cache.get(&"a");
/// cache.put("c", 3); // evicts "b"
///
/// assert_eq!(cache.keys_snapshot(), vec!["c", "a"]);
/// assert_eq!(cache.stats().evictions(), 1);
/// # Ok::<(), lrucache::Error>(())
/// ```
pub struct LruCache<K, V>
where
    K: Hash + Eq,
{
    /// Key -> entry handle, readable without the list lock
    index: KeyIndex<K>,

    /// MRU -> LRU ordering; the only lock in the engine
    list: Mutex<RecencyList<K, V>>,

    /// Maximum entry count, written only under the list lock
    capacity: AtomicUsize,

    /// Modification counter for fail-fast iteration, bumped under the lock
    version: AtomicU64,

    /// Hit/miss/eviction counters
    stats: StatsRecorder,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a new cache holding at most `capacity` entries
    ///
    /// # Returns
    /// * `Err(Error::InvalidCapacity)` if `capacity` is zero
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_config(CacheConfig::new(capacity))
    }

    /// Create a new cache from a validated [`CacheConfig`]
    pub fn with_config(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let reserve = config.capacity.min(MAX_PREALLOC);
        debug!(
            capacity = config.capacity,
            shards = ?config.index_shards,
            "Creating LRU cache"
        );

        Ok(Self {
            index: KeyIndex::new(reserve, config.index_shards),
            list: Mutex::new(RecencyList::with_capacity(reserve)),
            capacity: AtomicUsize::new(config.capacity),
            version: AtomicU64::new(0),
            stats: StatsRecorder::new(),
        })
    }

    /// Get a value and mark it most-recently-used
    ///
    /// Counts a hit when the key is present (whatever its value) and a miss
    /// otherwise.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        // A handle can go stale between the lookup and the lock; that reads
        // as a miss.
        let value = self
            .index
            .lookup(key)
            .and_then(|handle| self.promote(handle));

        match value {
            Some(_) => self.stats.record_hit(),
            None => self.stats.record_miss(),
        }
        value
    }

    /// Get a value without touching recency order or statistics
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let handle = self.index.lookup(key)?;
        self.list.lock().get(handle).cloned()
    }

    /// Insert or overwrite a value, making it most-recently-used
    ///
    /// # Arguments
    /// * `key` - Cache key
    /// * `value` - Value to store
    ///
    /// # Returns
    /// * `Option<V>` - Previous value if the key was present
    ///
    /// Inserting a new key past capacity evicts the least-recently-used
    /// entry. `put` never changes hit/miss/request counters.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        let mut list = self.list.lock();

        if let Some(handle) = self.index.lookup(&key) {
            let previous = list.replace_value(handle, value);
            list.move_to_front(handle);
            self.bump_version();
            return previous;
        }

        // Evict before the new key becomes visible in the index so that an
        // unlocked `len()` never exceeds capacity. The new entry is the head
        // and capacity is at least 1, so it is never the one popped.
        let handle = list.push_front(key.clone(), value);
        let capacity = self.capacity.load(Ordering::Relaxed);
        let evicted = self.evict_overflow(&mut list, capacity);
        self.index.insert(key, handle);
        self.bump_version();
        drop(list);

        self.record_evictions(evicted);
        None
    }

    /// Remove a key, returning its value if it was present
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if !self.index.contains_key(key) {
            return None;
        }

        let mut list = self.list.lock();
        let handle = self.index.remove(key)?;
        let (_, value) = list.unlink(handle)?;
        self.bump_version();
        Some(value)
    }

    /// Returns `true` if the key is cached. No recency or stats effect.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    /// Get current number of entries
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache capacity
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Remove every entry. Statistics are kept.
    pub fn clear(&self) {
        let mut list = self.list.lock();
        if list.is_empty() {
            return;
        }

        let cleared = list.len();
        list.clear();
        self.index.clear();
        self.bump_version();
        drop(list);

        debug!(cleared, "Cleared LRU cache");
    }

    /// Change the capacity, evicting LRU entries until the cache fits
    ///
    /// # Arguments
    /// * `capacity` - New maximum entry count, greater than zero
    ///
    /// # Returns
    /// * `Err(Error::InvalidCapacity)` for zero, with no state change
    pub fn set_max_capacity(&self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity(capacity));
        }

        let mut list = self.list.lock();
        let previous = self.capacity.swap(capacity, Ordering::Relaxed);
        let evicted = self.evict_overflow(&mut list, capacity);
        drop(list);

        self.record_evictions(evicted);
        debug!(previous, capacity, evicted, "Changed cache capacity");
        Ok(())
    }

    /// Get a snapshot of the cache statistics
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Reset hit/miss/eviction/request counters to zero
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Current modification counter
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Copy of every key, most-recently-used first
    pub fn keys_snapshot(&self) -> Vec<K> {
        self.list.lock().iter().map(|(key, _)| key.clone()).collect()
    }

    /// Clone of the least-recently-used entry (the next eviction victim)
    pub fn peek_lru(&self) -> Option<(K, V)> {
        self.list
            .lock()
            .peek_tail()
            .map(|(key, value)| (key.clone(), value.clone()))
    }

    /// Fail-fast iterator over `(key, value)` clones, MRU to LRU
    ///
    /// Any modification of the cache after this call makes the next step
    /// yield [`Error::ConcurrentModification`].
    pub fn iter(&self) -> EntryIter<'_, K, V> {
        let list = self.list.lock();
        let head = list.head();
        let version = self.version.load(Ordering::Relaxed);
        drop(list);

        EntryIter::new(self, head, version)
    }

    /// One iterator step: the entry at `cursor` and its successor
    pub(crate) fn entry_after_check(
        &self,
        cursor: Handle,
        expected: u64,
    ) -> Result<Option<(K, V, Option<Handle>)>> {
        let list = self.list.lock();
        let found = self.version.load(Ordering::Relaxed);
        if found != expected {
            return Err(Error::ConcurrentModification { expected, found });
        }

        Ok(list
            .entry_at(cursor)
            .map(|(key, value, next)| (key.clone(), value.clone(), next)))
    }

    /// Capacity and MRU -> LRU entries, copied under one lock acquisition
    pub(crate) fn capture(&self) -> (usize, Vec<(K, V)>) {
        let list = self.list.lock();
        let capacity = self.capacity.load(Ordering::Relaxed);
        let entries = list
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        (capacity, entries)
    }

    /// Rebuild a cache from captured state with fresh statistics.
    ///
    /// Entries are pushed LRU-first so the head ends up as the first
    /// element of `entries`.
    pub(crate) fn restore(capacity: usize, entries: Vec<(K, V)>) -> Result<Self> {
        let cache = Self::new(capacity)?;
        if entries.len() > capacity {
            return Err(Error::Snapshot(format!(
                "{} entries exceed capacity {}",
                entries.len(),
                capacity
            )));
        }

        {
            let mut list = cache.list.lock();
            for (key, value) in entries.into_iter().rev() {
                let handle = list.push_front(key.clone(), value);
                if cache.index.insert(key, handle).is_some() {
                    return Err(Error::Snapshot("Duplicate key in snapshot".to_string()));
                }
            }
        }

        Ok(cache)
    }

    /// Panic if the key index and recency list disagree.
    ///
    /// Only meaningful while no other thread is writing to the cache.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        use std::collections::HashSet;

        let list = self.list.lock();
        let capacity = self.capacity.load(Ordering::Relaxed);
        assert!(list.len() <= capacity, "len {} over capacity {}", list.len(), capacity);

        let index_keys = self.index.snapshot_keys();
        assert_eq!(index_keys.len(), list.len(), "index and list sizes differ");

        let mut handles = HashSet::with_capacity(index_keys.len());
        for key in &index_keys {
            let handle = self.index.lookup(key);
            let entry = handle.and_then(|handle| list.entry_at(handle));
            assert!(
                matches!(entry, Some((stored, _, _)) if stored == key),
                "index entry points at a missing or foreign node"
            );
            handles.extend(handle);
        }
        assert_eq!(handles.len(), list.len(), "list nodes not covered by the index");
        assert_eq!(list.iter().count(), list.len(), "broken links");
    }

    fn promote(&self, handle: Handle) -> Option<V> {
        let mut list = self.list.lock();
        let value = list.get(handle).cloned()?;
        if list.move_to_front(handle) {
            self.bump_version();
        }
        Some(value)
    }

    /// Pop the tail until `len <= capacity`. Caller holds the list lock.
    fn evict_overflow(&self, list: &mut RecencyList<K, V>, capacity: usize) -> u64 {
        let mut evicted = 0;
        while list.len() > capacity {
            match list.pop_tail() {
                Some((key, _)) => {
                    self.index.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }

        if evicted > 0 {
            self.bump_version();
        }
        evicted
    }

    fn record_evictions(&self, evicted: u64) {
        if evicted > 0 {
            self.stats.record_evictions(evicted);
            trace!(evicted, "Evicted least-recently-used entries");
        }
    }

    fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::Release);
    }
}

impl<K, V> fmt::Debug for LruCache<K, V>
where
    K: Hash + Eq,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("len", &self.index.len())
            .field("capacity", &self.capacity.load(Ordering::Relaxed))
            .field("version", &self.version.load(Ordering::Relaxed))
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_basic() {
        let cache = LruCache::new(10).unwrap();

        assert_eq!(cache.put("a", 1), None);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 0);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = LruCache::<u32, u32>::new(0).unwrap_err();
        assert!(matches!(err, Error::InvalidCapacity(0)));
    }

    #[test]
    fn test_recency_order() {
        let cache = LruCache::new(3).unwrap();
        cache.put("a", 1);
        cache.put("b", 2);
        cache.put("c", 3);

        assert_eq!(cache.keys_snapshot(), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_cache_eviction() {
        let cache = LruCache::new(2).unwrap();
        cache.put("a", 1);
        cache.put("b", 2);
        cache.put("c", 3);

        assert!(!cache.contains_key(&"a"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions(), 1);
        assert_eq!(cache.keys_snapshot(), vec!["c", "b"]);
        cache.debug_validate_invariants();
    }

    #[test]
    fn test_get_promotes() {
        let cache = LruCache::new(2).unwrap();
        cache.put("a", 1);
        cache.put("b", 2);
        cache.get(&"a");
        cache.put("c", 3);

        assert!(cache.contains_key(&"a"));
        assert!(!cache.contains_key(&"b"));
        assert_eq!(cache.keys_snapshot(), vec!["c", "a"]);
    }

    #[test]
    fn test_put_overwrite() {
        let cache = LruCache::new(2).unwrap();
        cache.put("a", 1);
        cache.put("b", 2);

        assert_eq!(cache.put("a", 10), Some(1));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.keys_snapshot(), vec!["a", "b"]);
        assert_eq!(cache.peek(&"a"), Some(10));

        // Overwrite is stats-neutral
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_none_value_is_a_hit() {
        let cache: LruCache<&str, Option<u32>> = LruCache::new(2).unwrap();
        cache.put("k", None);

        assert_eq!(cache.get(&"k"), Some(None));
        assert_eq!(cache.get(&"missing"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits(), 1);
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.requests(), 2);
    }

    #[test]
    fn test_cache_remove() {
        let cache = LruCache::new(3).unwrap();
        cache.put("a", 1);
        cache.put("b", 2);

        assert_eq!(cache.remove(&"a"), Some(1));
        assert_eq!(cache.remove(&"a"), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.keys_snapshot(), vec!["b"]);
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_borrowed_lookup() {
        let cache: LruCache<String, u32> = LruCache::new(2).unwrap();
        cache.put("alpha".to_string(), 1);

        assert_eq!(cache.get("alpha"), Some(1));
        assert!(cache.contains_key("alpha"));
        assert_eq!(cache.remove("alpha"), Some(1));
    }

    #[test]
    fn test_contains_and_peek_are_side_effect_free() {
        let cache = LruCache::new(2).unwrap();
        cache.put("a", 1);
        cache.put("b", 2);
        let version = cache.version();

        assert!(cache.contains_key(&"a"));
        assert_eq!(cache.peek(&"a"), Some(1));
        assert_eq!(cache.peek(&"zz"), None);

        assert_eq!(cache.keys_snapshot(), vec!["b", "a"]);
        assert_eq!(cache.stats(), CacheStats::default());
        assert_eq!(cache.version(), version);
    }

    #[test]
    fn test_cache_clear_keeps_stats() {
        let cache = LruCache::new(10).unwrap();
        cache.put("a", 1);
        cache.put("b", 2);
        cache.get(&"a");
        cache.get(&"x");

        cache.clear();

        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
        assert!(cache.keys_snapshot().is_empty());
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 1);

        // Usable after clear
        cache.put("c", 3);
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn test_shrink_capacity() {
        let cache = LruCache::new(5).unwrap();
        for (i, key) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
            cache.put(key, i);
        }

        cache.set_max_capacity(2).unwrap();

        assert_eq!(cache.capacity(), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.keys_snapshot(), vec!["e", "d"]);
        assert_eq!(cache.stats().evictions(), 3);
        cache.debug_validate_invariants();
    }

    #[test]
    fn test_grow_capacity() {
        let cache = LruCache::new(1).unwrap();
        cache.put(1, 1);
        cache.set_max_capacity(3).unwrap();
        cache.put(2, 2);
        cache.put(3, 3);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.stats().evictions(), 0);
    }

    #[test]
    fn test_set_capacity_zero_rejected() {
        let cache = LruCache::new(2).unwrap();
        cache.put(1, 1);
        let version = cache.version();

        let err = cache.set_max_capacity(0).unwrap_err();
        assert!(matches!(err, Error::InvalidCapacity(0)));
        assert_eq!(cache.capacity(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.version(), version);
    }

    #[test]
    fn test_peek_lru() {
        let cache = LruCache::new(3).unwrap();
        assert_eq!(cache.peek_lru(), None);

        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.peek_lru(), Some(("a", 1)));

        cache.get(&"a");
        assert_eq!(cache.peek_lru(), Some(("b", 2)));
    }

    #[test]
    fn test_version_tracks_order_changes() {
        let cache = LruCache::new(3).unwrap();
        let v0 = cache.version();
        cache.put("a", 1);
        let v1 = cache.version();
        assert!(v1 > v0);

        // Head already MRU: no order change
        cache.get(&"a");
        assert_eq!(cache.version(), v1);

        cache.put("b", 2);
        let v2 = cache.version();
        cache.get(&"a");
        assert!(cache.version() > v2);

        // Misses and removals of absent keys change nothing
        let v3 = cache.version();
        cache.get(&"zz");
        cache.remove(&"zz");
        cache.clear();
        assert!(cache.version() > v3);
        let v4 = cache.version();
        cache.clear();
        assert_eq!(cache.version(), v4);
    }

    #[test]
    fn test_reset_stats() {
        let cache = LruCache::new(1).unwrap();
        cache.put(1, 1);
        cache.put(2, 2);
        cache.get(&2);
        cache.reset_stats();

        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_restore_rejects_duplicates_and_overflow() {
        let err = LruCache::restore(4, vec![(1, "a"), (1, "b")]).unwrap_err();
        assert!(matches!(err, Error::Snapshot(_)));

        let err = LruCache::restore(1, vec![(1, "a"), (2, "b")]).unwrap_err();
        assert!(matches!(err, Error::Snapshot(_)));

        let cache = LruCache::restore(3, vec![(3, "c"), (2, "b"), (1, "a")]).unwrap();
        assert_eq!(cache.keys_snapshot(), vec![3, 2, 1]);
        cache.debug_validate_invariants();
    }

    #[test]
    fn test_random_ops_keep_invariants() {
        let cache = LruCache::new(8).unwrap();
        let mut state = 0x2545_f491_u64;
        for _ in 0..5_000 {
            // xorshift
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let key = state % 24;
            match state % 7 {
                0 => {
                    cache.remove(&key);
                }
                1 | 2 => {
                    cache.get(&key);
                }
                3 if key == 0 => cache.set_max_capacity(1 + (state % 10) as usize).unwrap(),
                4 if key == 1 => cache.clear(),
                _ => {
                    cache.put(key, state);
                }
            }
            assert!(cache.len() <= cache.capacity());
        }
        cache.debug_validate_invariants();

        let stats = cache.stats();
        assert_eq!(stats.requests(), stats.hits() + stats.misses());
    }

    #[test]
    fn test_debug_output() {
        let cache = LruCache::new(4).unwrap();
        cache.put(1, 1);
        let debug = format!("{:?}", cache);
        assert!(debug.contains("len: 1"));
        assert!(debug.contains("capacity: 4"));
    }
}
