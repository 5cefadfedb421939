//! Cache configuration

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default cache capacity (number of items)
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Settings used to build an [`LruCache`](crate::LruCache)
///
/// Missing fields fall back to their defaults when deserialized:
///
/// ```
/// use lrucache::CacheConfig;
///
/// let config: CacheConfig = serde_json::from_str(r#"{ "capacity": 512 }"#).unwrap();
/// assert_eq!(config.capacity, 512);
/// assert_eq!(config.index_shards, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries held before the LRU entry is evicted
    pub capacity: usize,

    /// Shard count for the key index; a power of two greater than one.
    /// `None` derives it from the available parallelism.
    pub index_shards: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            index_shards: None,
        }
    }
}

impl CacheConfig {
    /// Config with the given capacity and default sharding
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Set the maximum number of entries
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the key index shard count
    pub fn with_index_shards(mut self, shards: usize) -> Self {
        self.index_shards = Some(shards);
        self
    }

    /// Check the config before any cache is built from it
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidCapacity(self.capacity));
        }

        if let Some(shards) = self.index_shards {
            if shards < 2 || !shards.is_power_of_two() {
                return Err(Error::InvalidConfig(format!(
                    "index_shards must be a power of two greater than 1, got {}",
                    shards
                )));
            }
        }

        Ok(())
    }
}
