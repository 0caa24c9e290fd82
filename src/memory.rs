use crate::fingerprint::Fingerprint;
use crate::image::DecodedImage;
use crate::stats::{Stats, StatsRecorder};
use lru::LruCache;
use parking_lot::Mutex;
use std::sync::Arc;

/// Tunables for [`MemoryCache`]. See the crate-level config defaults table.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub max_memory_cost: usize,
    pub max_count: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_memory_cost: 50 * 1024 * 1024,
            max_count: 100,
        }
    }
}

struct Entry {
    image: Arc<DecodedImage>,
    cost: usize,
}

/// A bounded, cost- and count-limited, strictly-LRU-by-last-access cache of decoded images.
///
/// `get` refreshes recency; eviction always removes the least-recently-used entry first, whether
/// the cache is over its cost limit, its count limit, or both.
pub struct MemoryCache {
    inner: Mutex<LruCache<Fingerprint, Entry>>,
    config: MemoryConfig,
    total_cost: Mutex<usize>,
    stats: StatsRecorder,
}

impl MemoryCache {
    pub fn new(config: MemoryConfig) -> Self {
        // `LruCache::unbounded` disables the crate's own capacity-triggered eviction, since that
        // would silently drop entries (and their cost) without us ever seeing them; our own
        // cost+count eviction loop in `put` is the sole eviction policy.
        Self {
            inner: Mutex::new(LruCache::unbounded()),
            config,
            total_cost: Mutex::new(0),
            stats: StatsRecorder::new(),
        }
    }

    pub fn get(&self, fp: &Fingerprint) -> Option<Arc<DecodedImage>> {
        let mut inner = self.inner.lock();
        match inner.get(fp) {
            Some(entry) => {
                let image = Arc::clone(&entry.image);
                self.stats.record_hit();
                Some(image)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Like `get`, but never records a hit/miss and never refreshes recency.
    pub fn exists(&self, fp: &Fingerprint) -> bool {
        self.inner.lock().peek(fp).is_some()
    }

    pub fn put(&self, fp: Fingerprint, image: Arc<DecodedImage>) {
        let cost = image.byte_cost();
        let mut inner = self.inner.lock();
        let mut total_cost = self.total_cost.lock();

        if let Some(old) = inner.put(fp, Entry { image, cost }) {
            *total_cost -= old.cost;
        }
        *total_cost += cost;

        while (*total_cost > self.config.max_memory_cost || inner.len() > self.config.max_count)
            && inner.len() > 1
        {
            if let Some((_, evicted)) = inner.pop_lru() {
                *total_cost -= evicted.cost;
            } else {
                break;
            }
        }
        // If a single object is larger than the entire budget, the loop above stops at len() == 1
        // and we accept going over budget for this one oversized entry (best-effort).
    }

    pub fn remove(&self, fp: &Fingerprint) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.pop(fp) {
            *self.total_cost.lock() -= entry.cost;
        }
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
        *self.total_cost.lock() = 0;
    }

    pub fn stats(&self) -> Stats {
        self.stats.snapshot()
    }

    pub fn total_cost(&self) -> usize {
        *self.total_cost.lock()
    }
}
