//! Bounded cache of fully hydrated, read-only values.
//!
//! The engine stores read-only node handles here. Eviction is least recently
//! used: a hit or a re-insert moves the entry to the front, and when the
//! bound is reached the entry touched longest ago goes first.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, RwLock};

use lru::LruCache;
use vitrine_core::NodeId;

use super::traits::CacheStats;

/// Inflated-node tier.
#[derive(Debug)]
pub struct InflatedCache<T> {
    capacity: NonZeroUsize,
    inner: Mutex<LruCache<NodeId, T>>,
    stats: RwLock<CacheStats>,
}

impl<T: Clone> InflatedCache<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            capacity,
            inner: Mutex::new(LruCache::new(capacity)),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Look up `id`, marking it as the most recently used entry.
    pub fn get(&self, id: NodeId) -> Option<T> {
        let found = self.lock().and_then(|mut cache| cache.get(&id).cloned());
        self.record(|s| {
            if found.is_some() {
                s.hits += 1;
            } else {
                s.misses += 1;
            }
        });
        found
    }

    /// Insert or replace the value of `id`.
    pub fn put(&self, id: NodeId, value: T) {
        let (evicted, entry_count) = {
            let Some(mut cache) = self.lock() else {
                return;
            };
            // `push` hands back either the replaced value of `id` or the
            // least recently used entry it pushed out.
            let evicted = match cache.push(id, value) {
                Some((old, _)) if old != id => 1u64,
                _ => 0,
            };
            (evicted, cache.len() as u64)
        };

        if evicted > 0 {
            tracing::trace!(evicted, capacity = self.capacity.get(), "inflated cache eviction");
        }
        self.record(|s| {
            s.evictions += evicted;
            s.entry_count = entry_count;
        });
    }

    /// Remove the value of `id`. Returns whether one was present.
    pub fn remove(&self, id: NodeId) -> bool {
        let Some((removed, entry_count)) = self.lock().map(|mut cache| {
            let removed = cache.pop(&id).is_some();
            (removed, cache.len() as u64)
        }) else {
            return false;
        };
        if removed {
            self.record(|s| {
                s.invalidations += 1;
                s.entry_count = entry_count;
            });
        }
        removed
    }

    /// Remove the values of every id in `ids`. Returns how many were present.
    pub fn remove_many(&self, ids: &[NodeId]) -> u64 {
        ids.iter().filter(|id| self.remove(**id)).count() as u64
    }

    /// Remove every value for which `matches` holds. The predicate runs
    /// outside the cache lock, so it may take other locks.
    pub fn remove_where(&self, matches: impl Fn(&T) -> bool) -> u64 {
        let snapshot: Vec<(NodeId, T)> = match self.lock() {
            Some(cache) => cache.iter().map(|(id, value)| (*id, value.clone())).collect(),
            None => return 0,
        };
        let doomed: Vec<NodeId> = snapshot
            .into_iter()
            .filter(|(_, value)| matches(value))
            .map(|(id, _)| id)
            .collect();
        self.remove_many(&doomed)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.lock().map(|cache| cache.contains(&id)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry.
    pub fn clear(&self) -> u64 {
        let removed = self
            .lock()
            .map(|mut cache| {
                let removed = cache.len() as u64;
                cache.clear();
                removed
            })
            .unwrap_or(0);
        self.record(|s| {
            s.invalidations += removed;
            s.entry_count = 0;
        });
        removed
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().map(|s| s.clone()).unwrap_or_default()
    }

    fn lock(&self) -> Option<MutexGuard<'_, LruCache<NodeId, T>>> {
        self.inner.lock().ok()
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_put_remove() {
        let cache = InflatedCache::new(10);
        assert!(cache.get(NodeId::new(1)).is_none());
        cache.put(NodeId::new(1), "root");
        assert_eq!(cache.get(NodeId::new(1)), Some("root"));
        assert!(cache.remove(NodeId::new(1)));
        assert!(!cache.remove(NodeId::new(1)));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.invalidations, 1);
    }

    #[test]
    fn test_reinsert_is_not_an_eviction() {
        let cache = InflatedCache::new(2);
        cache.put(NodeId::new(1), 1);
        cache.put(NodeId::new(2), 2);
        cache.put(NodeId::new(1), 10);
        cache.put(NodeId::new(3), 3);

        assert_eq!(cache.get(NodeId::new(1)), Some(10));
        assert!(!cache.contains(NodeId::new(2)));
        assert!(cache.contains(NodeId::new(3)));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_hit_protects_from_eviction() {
        let cache = InflatedCache::new(2);
        cache.put(NodeId::new(1), 1);
        cache.put(NodeId::new(2), 2);
        // A read makes 1 recent, leaving 2 as the eviction candidate.
        assert_eq!(cache.get(NodeId::new(1)), Some(1));
        cache.put(NodeId::new(3), 3);

        assert!(cache.contains(NodeId::new(1)));
        assert!(!cache.contains(NodeId::new(2)));
        assert!(cache.contains(NodeId::new(3)));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let cache = InflatedCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.put(NodeId::new(1), 1);
        cache.put(NodeId::new(2), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(NodeId::new(2)));
    }

    #[test]
    fn test_remove_where() {
        let cache = InflatedCache::new(10);
        for raw in 1..=6 {
            cache.put(NodeId::new(raw), raw);
        }
        assert_eq!(cache.remove_where(|value| value % 2 == 0), 3);
        assert_eq!(cache.len(), 3);
        assert!(cache.contains(NodeId::new(1)));
        assert!(!cache.contains(NodeId::new(4)));
        assert_eq!(cache.stats().invalidations, 3);
    }

    #[test]
    fn test_remove_many_and_clear() {
        let cache = InflatedCache::new(10);
        for raw in 1..=5 {
            cache.put(NodeId::new(raw), raw);
        }
        assert_eq!(cache.remove_many(&[NodeId::new(1), NodeId::new(2), NodeId::new(42)]), 2);
        assert_eq!(cache.clear(), 3);
        assert!(cache.is_empty());
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The cache never holds more entries than its capacity.
        #[test]
        fn prop_len_never_exceeds_capacity(
            capacity in 1usize..16,
            ids in proptest::collection::vec(1i64..64, 0..200)
        ) {
            let cache = InflatedCache::new(capacity);
            for raw in ids {
                cache.put(NodeId::new(raw), raw);
                prop_assert!(cache.len() <= capacity);
            }
        }

        /// The most recently inserted id is always present.
        #[test]
        fn prop_last_insert_survives(
            capacity in 1usize..8,
            ids in proptest::collection::vec(1i64..64, 1..100)
        ) {
            let cache = InflatedCache::new(capacity);
            for raw in &ids {
                cache.put(NodeId::new(*raw), *raw);
            }
            let last = *ids.last().unwrap();
            prop_assert_eq!(cache.get(NodeId::new(last)), Some(last));
        }
    }
}
