//! Block render cache.
//!
//! Maps a block's content hash to its rendered HTML with LRU eviction. The
//! cache is owned by the rendering worker, so it takes `&mut self` and needs
//! no interior locking.

use lru::LruCache;
use metrics::counter;
use tracing::trace;

use super::config::CacheConfig;
use super::keys::ContentHash;

const METRIC_CACHE_HIT: &str = "anteprima_cache_hit_total";
const METRIC_CACHE_MISS: &str = "anteprima_cache_miss_total";
const METRIC_CACHE_EVICT: &str = "anteprima_cache_evict_total";

/// Rendered HTML for one block plus the tick of its last access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub html: String,
    pub last_access: u64,
}

/// Cumulative cache counters. Reset by [`RenderCache::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub size: usize,
    pub hit_count: u64,
    pub miss_count: u64,
}

pub struct RenderCache {
    entries: LruCache<ContentHash, CacheEntry>,
    tick: u64,
    hit_count: u64,
    miss_count: u64,
}

impl RenderCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: LruCache::new(config.max_blocks_non_zero()),
            tick: 0,
            hit_count: 0,
            miss_count: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Look up rendered HTML, refreshing the entry's recency on a hit.
    pub fn get(&mut self, id: &ContentHash) -> Option<String> {
        let tick = self.next_tick();
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.last_access = tick;
                self.hit_count += 1;
                counter!(METRIC_CACHE_HIT).increment(1);
                Some(entry.html.clone())
            }
            None => {
                self.miss_count += 1;
                counter!(METRIC_CACHE_MISS).increment(1);
                None
            }
        }
    }

    /// Read without touching recency or counters.
    pub fn peek(&self, id: &ContentHash) -> Option<&CacheEntry> {
        self.entries.peek(id)
    }

    pub fn contains(&self, id: &ContentHash) -> bool {
        self.entries.contains(id)
    }

    /// Insert or replace an entry.
    ///
    /// Returns the id of the least-recently-used entry evicted to make room,
    /// if any.
    pub fn put(&mut self, id: ContentHash, html: String) -> Option<ContentHash> {
        let last_access = self.next_tick();
        let displaced = self.entries.push(id, CacheEntry { html, last_access });

        match displaced {
            Some((old_id, _)) if old_id != id => {
                trace!(evicted = %old_id, inserted = %id, "Render cache evicted block");
                counter!(METRIC_CACHE_EVICT).increment(1);
                Some(old_id)
            }
            _ => None,
        }
    }

    pub fn invalidate(&mut self, id: &ContentHash) {
        self.entries.pop(id);
    }

    /// Drop every entry and reset the hit/miss counters.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hit_count = 0;
        self.miss_count = 0;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            hit_count: self.hit_count,
            miss_count: self.miss_count,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}
