//! # lrucache
//!
//! Fixed-capacity, thread-safe LRU cache.
//!
//! ## Architecture
//! - **Key index**: sharded `DashMap` (AHash) from key to entry handle,
//!   read without the engine lock
//! - **Recency list**: doubly-linked list over a slot vector, MRU at the
//!   head, guarded by a single `parking_lot::Mutex`
//! - **Stats**: atomic hit/miss/eviction/request counters
//! - **Snapshots**: binary frame that restores capacity and MRU -> LRU order
//!
//! ## Example
//!
//! ```
//! use lrucache::LruCache;
//!
//! let cache = LruCache::new(2)?;
//! cache.put("a", 1);
//! cache.put("b", 2);
//! assert_eq!(cache.get(&"a"), Some(1));
//!
//! let bytes = cache.to_bytes()?;
//! let restored: LruCache<String, i32> = LruCache::from_bytes(&bytes)?;
//! assert_eq!(restored.keys_snapshot(), vec!["a", "b"]);
//! assert_eq!(restored.stats().requests(), 0);
//! # Ok::<(), lrucache::Error>(())
//! ```

#![warn(missing_docs)]

mod cache;
mod config;
mod error;
mod index;
mod iter;
mod list;
mod snapshot;
mod stats;

pub use cache::LruCache;
pub use config::{CacheConfig, DEFAULT_CAPACITY};
pub use error::{Error, Result};
pub use iter::EntryIter;
pub use snapshot::{SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
pub use stats::CacheStats;
