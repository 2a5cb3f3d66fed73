//! Process-wide aggregate caches: all galleries, roles per gallery and
//! settings per gallery.
//!
//! Each aggregate is populated lazily on first read. Population of one
//! aggregate is serialized by its own named lock so concurrent first readers
//! query the record store once; reads of a populated aggregate only take the
//! shared side of its `RwLock`.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, RwLock};

use vitrine_core::{
    GalleryId, GalleryRecord, GallerySettings, RoleRecord, StorageError, VitrineError,
    VitrineResult,
};

use super::traits::CacheStats;

/// Named population locks.
#[derive(Debug, Default)]
struct PopulationLocks {
    galleries: Mutex<()>,
    roles: Mutex<()>,
    settings: Mutex<()>,
}

#[derive(Debug, Default)]
pub struct AggregateCache {
    galleries: RwLock<Option<Arc<Vec<GalleryRecord>>>>,
    roles: RwLock<HashMap<GalleryId, Arc<Vec<RoleRecord>>>>,
    settings: RwLock<HashMap<GalleryId, Arc<GallerySettings>>>,
    locks: PopulationLocks,
    stats: RwLock<CacheStats>,
}

impl AggregateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// All galleries, loading them with `load` on first use.
    pub fn galleries<F>(&self, load: F) -> VitrineResult<Arc<Vec<GalleryRecord>>>
    where
        F: FnOnce() -> VitrineResult<Vec<GalleryRecord>>,
    {
        if let Some(value) = self.cached_galleries()? {
            self.record(|s| s.hits += 1);
            return Ok(value);
        }

        let _guard = self
            .locks
            .galleries
            .lock()
            .map_err(|_| VitrineError::Storage(StorageError::LockPoisoned))?;

        if let Some(value) = self.cached_galleries()? {
            self.record(|s| s.hits += 1);
            return Ok(value);
        }

        self.record(|s| s.misses += 1);
        let value = Arc::new(load()?);
        *self
            .galleries
            .write()
            .map_err(|_| VitrineError::Storage(StorageError::LockPoisoned))? = Some(Arc::clone(&value));

        tracing::debug!(aggregate = "galleries", "aggregate populated");
        Ok(value)
    }

    /// Roles of one gallery, loading them with `load` on first use.
    pub fn roles<F>(&self, gallery_id: GalleryId, load: F) -> VitrineResult<Arc<Vec<RoleRecord>>>
    where
        F: FnOnce() -> VitrineResult<Vec<RoleRecord>>,
    {
        self.get_or_populate(&self.roles, &self.locks.roles, gallery_id, "roles", load)
    }

    /// Settings of one gallery, loading them with `load` on first use.
    pub fn settings<F>(&self, gallery_id: GalleryId, load: F) -> VitrineResult<Arc<GallerySettings>>
    where
        F: FnOnce() -> VitrineResult<GallerySettings>,
    {
        self.get_or_populate(&self.settings, &self.locks.settings, gallery_id, "settings", load)
    }

    pub fn purge_galleries(&self) {
        let removed = self
            .galleries
            .write()
            .map(|mut slot| slot.take().is_some())
            .unwrap_or(false);
        if removed {
            tracing::debug!(aggregate = "galleries", removed = 1u64, "aggregate purged");
            self.record(|s| s.invalidations += 1);
        }
    }

    /// Drop the cached roles of every gallery.
    pub fn purge_roles(&self) {
        self.purge(&self.roles, "roles");
    }

    pub fn purge_settings(&self, gallery_id: GalleryId) {
        if let Ok(mut settings) = self.settings.write() {
            if settings.remove(&gallery_id).is_some() {
                self.record(|s| s.invalidations += 1);
            }
        }
    }

    /// Drop every aggregate.
    pub fn clear(&self) {
        self.purge_galleries();
        self.purge(&self.roles, "roles");
        self.purge(&self.settings, "settings");
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().map(|s| s.clone()).unwrap_or_default()
    }

    fn cached_galleries(&self) -> VitrineResult<Option<Arc<Vec<GalleryRecord>>>> {
        let slot = self
            .galleries
            .read()
            .map_err(|_| VitrineError::Storage(StorageError::LockPoisoned))?;
        Ok(slot.clone())
    }

    fn get_or_populate<K, V, F>(
        &self,
        map: &RwLock<HashMap<K, Arc<V>>>,
        lock: &Mutex<()>,
        key: K,
        name: &'static str,
        load: F,
    ) -> VitrineResult<Arc<V>>
    where
        K: Eq + Hash + Copy,
        F: FnOnce() -> VitrineResult<V>,
    {
        if let Some(value) = Self::lookup(map, &key)? {
            self.record(|s| s.hits += 1);
            return Ok(value);
        }

        let _guard = lock
            .lock()
            .map_err(|_| VitrineError::Storage(StorageError::LockPoisoned))?;

        // Another thread may have populated it while we waited.
        if let Some(value) = Self::lookup(map, &key)? {
            self.record(|s| s.hits += 1);
            return Ok(value);
        }

        self.record(|s| s.misses += 1);
        let value = Arc::new(load()?);
        let mut entries = map
            .write()
            .map_err(|_| VitrineError::Storage(StorageError::LockPoisoned))?;
        entries.insert(key, Arc::clone(&value));
        let entry_count = entries.len() as u64;
        drop(entries);

        tracing::debug!(aggregate = name, "aggregate populated");
        self.record(|s| s.entry_count = entry_count);
        Ok(value)
    }

    fn lookup<K, V>(map: &RwLock<HashMap<K, Arc<V>>>, key: &K) -> VitrineResult<Option<Arc<V>>>
    where
        K: Eq + Hash,
    {
        let entries = map
            .read()
            .map_err(|_| VitrineError::Storage(StorageError::LockPoisoned))?;
        Ok(entries.get(key).cloned())
    }

    fn purge<K, V>(&self, map: &RwLock<HashMap<K, Arc<V>>>, name: &'static str) {
        if let Ok(mut entries) = map.write() {
            let removed = entries.len() as u64;
            entries.clear();
            if removed > 0 {
                tracing::debug!(aggregate = name, removed, "aggregate purged");
                self.record(|s| s.invalidations += removed);
            }
        }
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
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use vitrine_core::{NodeId, RolePermissions};

    fn make_role(name: &str) -> RoleRecord {
        RoleRecord {
            name: name.to_string(),
            gallery_id: 1,
            permissions: RolePermissions::VIEW_ALBUM_OR_MEDIA,
            album_ids: vec![NodeId::new(1)],
        }
    }

    #[test]
    fn test_roles_loaded_once_until_purged() {
        let cache = AggregateCache::new();
        let loads = AtomicUsize::new(0);
        let load = || {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(vec![make_role("Friends")])
        };

        assert_eq!(cache.roles(1, load).unwrap().len(), 1);
        assert_eq!(cache.roles(1, load).unwrap().len(), 1);
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        cache.purge_roles();
        cache.roles(1, load).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let cache = AggregateCache::new();
        let result = cache.galleries(|| Err(VitrineError::Storage(StorageError::LockPoisoned)));
        assert!(result.is_err());

        let galleries = cache
            .galleries(|| {
                Ok(vec![GalleryRecord {
                    id: 1,
                    description: "Main".to_string(),
                    is_template: false,
                    date_added: Utc::now(),
                }])
            })
            .unwrap();
        assert_eq!(galleries.len(), 1);
    }

    #[test]
    fn test_galleries_loaded_once_until_purged() {
        let cache = AggregateCache::new();
        let loads = AtomicUsize::new(0);
        let load = || {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        };

        cache.galleries(load).unwrap();
        cache.galleries(load).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        cache.purge_galleries();
        cache.galleries(load).unwrap();
        cache.clear();
        cache.galleries(load).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 3);
        assert_eq!(cache.stats().invalidations, 2);
    }

    #[test]
    fn test_settings_are_per_gallery() {
        let cache = AggregateCache::new();
        cache
            .settings(1, || Ok(GallerySettings::new(1, "/g1")))
            .unwrap();
        cache
            .settings(2, || Ok(GallerySettings::new(2, "/g2")))
            .unwrap();

        cache.purge_settings(1);
        let reloaded = cache
            .settings(1, || Ok(GallerySettings::new(1, "/g1-moved")))
            .unwrap();
        assert_eq!(reloaded.media_object_path.to_str(), Some("/g1-moved"));
        let kept = cache
            .settings(2, || Ok(GallerySettings::new(2, "/other")))
            .unwrap();
        assert_eq!(kept.media_object_path.to_str(), Some("/g2"));
    }

    #[test]
    fn test_concurrent_first_reads_load_once() {
        let cache = Arc::new(AggregateCache::new());
        let loads = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let loads = Arc::clone(&loads);
                thread::spawn(move || {
                    cache
                        .roles(1, || {
                            loads.fetch_add(1, Ordering::SeqCst);
                            Ok(vec![make_role("Editors")])
                        })
                        .unwrap()
                        .len()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
