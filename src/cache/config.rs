//! Render cache configuration.

use std::num::NonZeroUsize;

use serde::Deserialize;

const DEFAULT_CACHE_MAX_BLOCKS: usize = 250;

/// Capacity settings for the block render cache.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum rendered blocks kept before LRU eviction.
    pub cache_max_blocks: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_max_blocks: DEFAULT_CACHE_MAX_BLOCKS,
        }
    }
}

impl CacheConfig {
    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn max_blocks_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.cache_max_blocks).unwrap_or(NonZeroUsize::MIN)
    }
}
