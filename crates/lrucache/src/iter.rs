//! Fail-fast entry iteration

use std::hash::Hash;
use std::iter::FusedIterator;

use crate::cache::LruCache;
use crate::error::Result;
use crate::list::Handle;

/// Lazy MRU -> LRU iterator over cloned `(key, value)` pairs.
///
/// Created by [`LruCache::iter`]. Every step re-checks the cache's
/// modification counter; on a mismatch it yields a single
/// [`Error::ConcurrentModification`](crate::Error::ConcurrentModification)
/// and is exhausted from then on.
pub struct EntryIter<'a, K, V>
where
    K: Hash + Eq,
{
    cache: &'a LruCache<K, V>,
    cursor: Option<Handle>,
    expected: u64,
    done: bool,
}

impl<'a, K, V> EntryIter<'a, K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub(crate) fn new(cache: &'a LruCache<K, V>, head: Option<Handle>, expected: u64) -> Self {
        Self {
            cache,
            cursor: head,
            expected,
            done: false,
        }
    }
}

impl<K, V> Iterator for EntryIter<'_, K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let Some(cursor) = self.cursor else {
            self.done = true;
            return None;
        };

        match self.cache.entry_after_check(cursor, self.expected) {
            Ok(Some((key, value, next))) => {
                self.cursor = next;
                Some(Ok((key, value)))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<K, V> FusedIterator for EntryIter<'_, K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
}
