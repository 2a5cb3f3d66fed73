//! Shared engine state: collaborators, cache tiers and the named locks.
//!
//! One [`EngineContext`] lives behind every [`Gallery`](crate::Gallery).
//! Node trees hold a `Weak` reference to it, so dropping the gallery does not
//! wait on outstanding node handles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use vitrine_core::{
    GalleryId, GalleryRecord, GallerySettings, NodeError, RoleRecord, StorageError, VitrineError,
    VitrineResult,
};
use vitrine_storage::{FileMover, RecordStore};

use crate::cache::CacheTiers;
use crate::events::NodeObserver;
use crate::metadata::{MetadataExtractor, Sanitizer};

/// Process-wide locks, one per logical resource.
///
/// Aggregate population has its own locks inside
/// [`AggregateCache`](vitrine_storage::AggregateCache).
#[derive(Debug, Default)]
pub(crate) struct EngineLocks {
    /// First-time inflation of a node and attachment of children.
    pub inflation: Mutex<()>,
    /// Tree mutations: save, delete, move, copy, sort, thumbnail repair.
    pub mutation: Mutex<()>,
}

pub(crate) struct EngineContext {
    pub store: Arc<dyn RecordStore>,
    pub files: Arc<dyn FileMover>,
    pub caches: CacheTiers,
    pub extractor: Arc<dyn MetadataExtractor>,
    pub sanitizer: Arc<dyn Sanitizer>,
    pub observers: RwLock<Vec<Arc<dyn NodeObserver>>>,
    pub locks: EngineLocks,
    shut_down: AtomicBool,
}

impl EngineContext {
    pub fn new(
        store: Arc<dyn RecordStore>,
        files: Arc<dyn FileMover>,
        caches: CacheTiers,
        extractor: Arc<dyn MetadataExtractor>,
        sanitizer: Arc<dyn Sanitizer>,
        observers: Vec<Arc<dyn NodeObserver>>,
    ) -> Self {
        Self {
            store,
            files,
            caches,
            extractor,
            sanitizer,
            observers: RwLock::new(observers),
            locks: EngineLocks::default(),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn mark_shut_down(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }

    pub fn ensure_running(&self) -> VitrineResult<()> {
        if self.is_shut_down() {
            return Err(NodeError::invalid_state("gallery engine has been shut down").into());
        }
        Ok(())
    }

    pub fn lock(mutex: &Mutex<()>) -> VitrineResult<MutexGuard<'_, ()>> {
        mutex
            .lock()
            .map_err(|_| VitrineError::Storage(StorageError::LockPoisoned))
    }

    pub fn observers(&self) -> Vec<Arc<dyn NodeObserver>> {
        self.observers.read().map(|o| o.clone()).unwrap_or_default()
    }

    // === Aggregates ===

    pub fn settings(&self, gallery_id: GalleryId) -> VitrineResult<Arc<GallerySettings>> {
        self.caches.aggregates().settings(gallery_id, || {
            let pairs = self.store.setting_list(gallery_id)?;
            GallerySettings::from_pairs(
                gallery_id,
                pairs.iter().map(|(name, value)| (name.as_str(), value.as_str())),
            )
        })
    }

    pub fn roles(&self, gallery_id: GalleryId) -> VitrineResult<Arc<Vec<RoleRecord>>> {
        self.caches
            .aggregates()
            .roles(gallery_id, || self.store.role_list(gallery_id))
    }

    pub fn galleries(&self) -> VitrineResult<Arc<Vec<GalleryRecord>>> {
        self.caches.aggregates().galleries(|| self.store.gallery_list())
    }

    /// Drop the aggregates that denormalize container membership.
    pub fn purge_membership_aggregates(&self) {
        self.caches.aggregates().purge_roles();
        self.caches.aggregates().purge_galleries();
    }
}
