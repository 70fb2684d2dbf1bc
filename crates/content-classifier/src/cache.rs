use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use tubepace_core_types::Category;

/// Per-category memo of signal results, valid for a short TTL.
pub struct ClassificationCache {
    entries: DashMap<Category, (bool, Instant)>,
    ttl_ms: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    clears: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct CacheMetric {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub clears: u64,
}

impl Default for ClassificationCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

impl ClassificationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_ms: AtomicU64::new(duration_to_millis(ttl)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            clears: AtomicU64::new(0),
        }
    }

    pub fn get(&self, category: Category) -> Option<bool> {
        let ttl = self.ttl();
        if let Some(entry) = self.entries.get(&category) {
            if entry.1.elapsed() < ttl {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.0);
            }
        }
        self.entries.remove(&category);
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn put(&self, category: Category, value: bool) {
        self.entries.insert(category, (value, Instant::now()));
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_ttl(&self, ttl: Duration) {
        self.ttl_ms.store(duration_to_millis(ttl), Ordering::Relaxed);
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms.load(Ordering::Relaxed))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of times the cache has been cleared.
    pub fn clears(&self) -> u64 {
        self.clears.load(Ordering::Relaxed)
    }

    pub fn metrics(&self) -> CacheMetric {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheMetric {
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            clears: self.clears(),
        }
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = ClassificationCache::new(Duration::from_secs(3));
        cache.put(Category::Live, true);
        assert_eq!(cache.get(Category::Live), Some(true));

        tokio::time::advance(Duration::from_millis(2_999)).await;
        assert_eq!(cache.get(Category::Live), Some(true));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get(Category::Live), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_are_keyed_per_category() {
        let cache = ClassificationCache::default();
        cache.put(Category::Live, false);
        cache.put(Category::Shorts, true);
        assert_eq!(cache.get(Category::Live), Some(false));
        assert_eq!(cache.get(Category::Shorts), Some(true));
        assert_eq!(cache.get(Category::Music), None);

        let metric = cache.metrics();
        assert_eq!(metric.hits, 2);
        assert_eq!(metric.misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_drops_everything_and_counts() {
        let cache = ClassificationCache::default();
        cache.put(Category::Premiere, true);
        cache.clear();
        assert_eq!(cache.get(Category::Premiere), None);
        assert_eq!(cache.clears(), 1);
    }
}
