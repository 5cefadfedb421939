//! Key index: concurrent key -> handle map
//!
//! Backed by a sharded `DashMap` so lookups and presence checks never touch
//! the engine mutex. Guards returned by `DashMap` are dropped before any
//! method here returns; callers may hold the engine mutex while calling in,
//! but never the other way around.

use std::borrow::Borrow;
use std::hash::Hash;

use ahash::RandomState;
use dashmap::DashMap;

use crate::list::Handle;

/// Concurrent mapping from cache key to its entry handle
#[derive(Debug)]
pub(crate) struct KeyIndex<K>
where
    K: Hash + Eq,
{
    map: DashMap<K, Handle, RandomState>,
}

impl<K> KeyIndex<K>
where
    K: Hash + Eq,
{
    /// Create an index sized for `capacity` keys.
    ///
    /// `shards` must be a power of two greater than one; `None` lets
    /// `DashMap` pick from the available parallelism.
    pub(crate) fn new(capacity: usize, shards: Option<usize>) -> Self {
        let map = match shards {
            Some(shards) => DashMap::with_capacity_and_hasher_and_shard_amount(
                capacity,
                RandomState::new(),
                shards,
            ),
            None => DashMap::with_capacity_and_hasher(capacity, RandomState::new()),
        };
        Self { map }
    }

    pub(crate) fn lookup<Q>(&self, key: &Q) -> Option<Handle>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key).map(|handle| *handle)
    }

    /// Insert a mapping, returning the handle it replaced
    pub(crate) fn insert(&self, key: K, handle: Handle) -> Option<Handle> {
        self.map.insert(key, handle)
    }

    pub(crate) fn remove<Q>(&self, key: &Q) -> Option<Handle>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.remove(key).map(|(_, handle)| handle)
    }

    pub(crate) fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn clear(&self) {
        self.map.clear();
    }
}

impl<K> KeyIndex<K>
where
    K: Hash + Eq + Clone,
{
    /// Copy of every key, in no particular order
    #[cfg(any(test, debug_assertions))]
    pub(crate) fn snapshot_keys(&self) -> Vec<K> {
        self.map.iter().map(|entry| entry.key().clone()).collect()
    }
}
