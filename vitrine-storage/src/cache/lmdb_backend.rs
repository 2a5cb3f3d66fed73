//! LMDB-backed snapshot backend.
//!
//! Uses the heed crate (Rust bindings for LMDB) to keep asset snapshots in a
//! memory-mapped key-value store, so a restarted process can rehydrate nodes
//! without going back to the record store.
//!
//! Every `put` runs in its own write transaction; kind invalidation walks the
//! kind prefix inside one write transaction.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use vitrine_core::{AssetSnapshot, NodeKind, StorageError, Timestamp, VitrineError, VitrineResult};

use super::key::CacheKey;
use super::traits::SnapshotBackend;

/// Failures of the LMDB snapshot store. Folded into [`StorageError`] at the
/// trait boundary.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    #[error("cannot open snapshot environment: {0}")]
    EnvOpen(String),

    #[error("cannot open snapshot table: {0}")]
    DbOpen(String),

    #[error("snapshot transaction failed: {0}")]
    Transaction(String),

    #[error("cannot encode snapshot: {0}")]
    Serialization(String),

    #[error("stored snapshot is corrupt: {0}")]
    Deserialization(String),

    #[error("snapshot directory: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for VitrineError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::Serialization(reason) | LmdbCacheError::Deserialization(reason) => {
                VitrineError::Storage(StorageError::Serialization { reason })
            }
            other => VitrineError::Storage(StorageError::CacheBackend {
                reason: other.to_string(),
            }),
        }
    }
}

/// LMDB-backed [`SnapshotBackend`].
///
/// Values are stored as `[cached_at millis: 8 bytes LE][JSON snapshot]`.
pub struct LmdbSnapshotBackend {
    path: PathBuf,
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl std::fmt::Debug for LmdbSnapshotBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbSnapshotBackend")
            .field("path", &self.path)
            .finish()
    }
}

impl LmdbSnapshotBackend {
    /// Open (or create) the snapshot store under `path`, mapping at most
    /// `max_size_mb` megabytes.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per directory by this
        // process and never concurrently truncated.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        tracing::debug!(path = %path.as_ref().display(), max_size_mb, "opened LMDB snapshot store");

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            env,
            db,
        })
    }

    fn collect_keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, LmdbCacheError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let iter = self
            .db
            .iter(&rtxn)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let mut keys = Vec::new();
        for (key, _) in iter.flatten() {
            if key.starts_with(prefix) {
                keys.push(key.to_vec());
            }
        }

        Ok(keys)
    }

    fn decode_value(bytes: &[u8]) -> Result<Option<(AssetSnapshot, Timestamp)>, LmdbCacheError> {
        if bytes.len() < 8 {
            return Ok(None);
        }

        let timestamp_bytes: [u8; 8] = bytes[0..8]
            .try_into()
            .map_err(|_| LmdbCacheError::Deserialization("truncated stamp".into()))?;
        let cached_at = DateTime::from_timestamp_millis(i64::from_le_bytes(timestamp_bytes))
            .unwrap_or_else(Utc::now);

        let snapshot: AssetSnapshot = serde_json::from_slice(&bytes[8..])
            .map_err(|e| LmdbCacheError::Deserialization(e.to_string()))?;

        Ok(Some((snapshot, cached_at)))
    }
}

impl SnapshotBackend for LmdbSnapshotBackend {
    fn get(&self, key: &CacheKey) -> VitrineResult<Option<(AssetSnapshot, Timestamp)>> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        match self.db.get(&rtxn, &key.encode()) {
            Ok(Some(bytes)) => Ok(Self::decode_value(bytes)?),
            Ok(None) => Ok(None),
            Err(e) => Err(LmdbCacheError::Transaction(e.to_string()).into()),
        }
    }

    fn put(
        &self,
        key: &CacheKey,
        snapshot: &AssetSnapshot,
        cached_at: Timestamp,
    ) -> VitrineResult<()> {
        let value_bytes = serde_json::to_vec(snapshot)
            .map_err(|e| LmdbCacheError::Serialization(e.to_string()))?;

        let mut full_bytes = Vec::with_capacity(8 + value_bytes.len());
        full_bytes.extend_from_slice(&cached_at.timestamp_millis().to_le_bytes());
        full_bytes.extend_from_slice(&value_bytes);

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        self.db
            .put(&mut wtxn, &key.encode(), &full_bytes)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(())
    }

    fn delete(&self, key: &CacheKey) -> VitrineResult<bool> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let deleted = self
            .db
            .delete(&mut wtxn, &key.encode())
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(deleted)
    }

    fn invalidate_kind(&self, kind: NodeKind) -> VitrineResult<u64> {
        let keys_to_delete = self.collect_keys_with_prefix(&CacheKey::kind_prefix(kind))?;

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let mut deleted = 0u64;
        for key in &keys_to_delete {
            if self.db.delete(&mut wtxn, key).unwrap_or(false) {
                deleted += 1;
            }
        }

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(deleted)
    }

    fn len(&self) -> VitrineResult<u64> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        Ok(self
            .db
            .len(&rtxn)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?)
    }

    fn name(&self) -> &'static str {
        "lmdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_support::{make_test_container, make_test_leaf};
    use tempfile::TempDir;
    use vitrine_core::{ChildIds, NodeId};

    fn create_test_backend() -> (LmdbSnapshotBackend, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let backend =
            LmdbSnapshotBackend::new(temp_dir.path(), 10).expect("backend creation should succeed");
        (backend, temp_dir)
    }

    #[test]
    fn test_put_and_get() {
        let (backend, _temp_dir) = create_test_backend();
        let id = NodeId::new(4);
        let snapshot = make_test_container(
            id,
            Some(ChildIds {
                containers: vec![NodeId::new(5)],
                leaves: vec![NodeId::new(6)],
            }),
        );
        let cached_at = Utc::now();

        backend
            .put(&CacheKey::container(id), &snapshot, cached_at)
            .expect("put should succeed");

        let (value, retrieved_cached_at) = backend
            .get(&CacheKey::container(id))
            .expect("get should succeed")
            .expect("cached should be Some");
        assert_eq!(value, snapshot);
        assert!((cached_at - retrieved_cached_at).num_seconds().abs() < 1);
    }

    #[test]
    fn test_get_nonexistent() {
        let (backend, _temp_dir) = create_test_backend();
        let cached = backend
            .get(&CacheKey::leaf(NodeId::new(1)))
            .expect("get should succeed");
        assert!(cached.is_none());
    }

    #[test]
    fn test_delete() {
        let (backend, _temp_dir) = create_test_backend();
        let key = CacheKey::leaf(NodeId::new(8));
        backend
            .put(&key, &make_test_leaf(NodeId::new(8), NodeId::new(1)), Utc::now())
            .expect("put should succeed");

        assert!(backend.delete(&key).expect("delete should succeed"));
        assert!(backend.get(&key).expect("get should succeed").is_none());
        assert!(!backend.delete(&key).expect("delete should succeed"));
    }

    #[test]
    fn test_invalidate_kind() {
        let (backend, _temp_dir) = create_test_backend();
        for raw in 1..=3 {
            let id = NodeId::new(raw);
            backend
                .put(&CacheKey::container(id), &make_test_container(id, None), Utc::now())
                .expect("put should succeed");
        }
        let leaf = NodeId::new(20);
        backend
            .put(&CacheKey::leaf(leaf), &make_test_leaf(leaf, NodeId::new(1)), Utc::now())
            .expect("put should succeed");

        let deleted = backend
            .invalidate_kind(NodeKind::Container)
            .expect("invalidate_kind should succeed");
        assert_eq!(deleted, 3);
        assert_eq!(backend.len().expect("len should succeed"), 1);
        assert!(backend
            .get(&CacheKey::leaf(leaf))
            .expect("get should succeed")
            .is_some());
    }

    #[test]
    fn test_overwrite() {
        let (backend, _temp_dir) = create_test_backend();
        let id = NodeId::new(2);
        let key = CacheKey::container(id);
        backend
            .put(&key, &make_test_container(id, None), Utc::now())
            .expect("put should succeed");

        let updated = make_test_container(id, Some(ChildIds::default()));
        backend
            .put(&key, &updated, Utc::now())
            .expect("put should succeed");

        let cached = backend.get(&key).expect("get should succeed");
        assert_eq!(cached.map(|(s, _)| s), Some(updated));
        assert_eq!(backend.len().expect("len should succeed"), 1);
    }
}
