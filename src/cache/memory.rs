use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, trace};

use super::{CacheError, CacheStats, CacheStore};

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    replaces: AtomicU64,
    swaps_succeeded: AtomicU64,
    swaps_failed: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// In-memory [`CacheStore`] backed by a sharded [`DashMap`].
///
/// Keys on different shards never contend. Each operation holds its key's
/// shard lock for its whole duration and never across an `.await`, so
/// `compare_and_swap` reads, compares and writes as one step.
///
/// # Examples
///
/// ```
/// use kvcache::cache::{CacheError, CacheStore, InMemoryCache};
///
/// let cache = InMemoryCache::new();
/// assert_eq!(cache.store("fixture", "yay!"), "yay!");
/// assert_eq!(cache.fetch("fixture").unwrap(), "yay!");
/// assert!(cache.compare_and_swap("fixture", "yay!", "boo"));
/// assert!(!cache.compare_and_swap("fixture", "yay!", "again"));
/// assert!(matches!(cache.fetch("nope"), Err(CacheError::NotFound { .. })));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<String, String>,
    counters: Counters,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for InMemoryCache {
    fn store(&self, key: &str, value: &str) -> String {
        self.entries.insert(key.to_owned(), value.to_owned());
        Counters::bump(&self.counters.stores);
        debug!(key, "stored entry");
        value.to_owned()
    }

    fn fetch(&self, key: &str) -> Result<String, CacheError> {
        match self.entries.get(key) {
            Some(entry) => {
                Counters::bump(&self.counters.hits);
                trace!(key, "cache hit");
                Ok(entry.value().clone())
            }
            None => {
                Counters::bump(&self.counters.misses);
                trace!(key, "cache miss");
                Err(CacheError::NotFound {
                    key: key.to_owned(),
                })
            }
        }
    }

    fn replace(&self, key: &str, value: &str) -> String {
        let previous = self.entries.insert(key.to_owned(), value.to_owned());
        Counters::bump(&self.counters.replaces);
        debug!(key, created = previous.is_none(), "replaced entry");
        value.to_owned()
    }

    fn compare_and_swap(&self, key: &str, expected: &str, new: &str) -> bool {
        // `get_mut` write-locks the shard until `entry` drops.
        let swapped = match self.entries.get_mut(key) {
            Some(mut entry) if entry.value() == expected => {
                *entry.value_mut() = new.to_owned();
                true
            }
            _ => false,
        };

        if swapped {
            Counters::bump(&self.counters.swaps_succeeded);
        } else {
            Counters::bump(&self.counters.swaps_failed);
        }
        debug!(key, swapped, "compare-and-swap");
        swapped
    }

    fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            entries: self.entries.len(),
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            stores: c.stores.load(Ordering::Relaxed),
            replaces: c.replaces.load(Ordering::Relaxed),
            swaps_succeeded: c.swaps_succeeded.load(Ordering::Relaxed),
            swaps_failed: c.swaps_failed.load(Ordering::Relaxed),
        }
    }
}
