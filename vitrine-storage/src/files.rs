//! Physical file operations.
//!
//! The engine never touches the filesystem directly. Every move, copy and
//! delete of an original, optimized or thumbnail file, and of album
//! directories, goes through a [`FileMover`].

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use vitrine_core::{FileError, StorageError, VitrineError, VitrineResult};

/// File operations consumed by the tree mutator.
pub trait FileMover: Send + Sync {
    /// Move one file, creating the destination directory when needed.
    fn move_file(&self, from: &Path, to: &Path) -> VitrineResult<()>;

    /// Copy one file, creating the destination directory when needed.
    fn copy_file(&self, from: &Path, to: &Path) -> VitrineResult<()>;

    /// Move a directory and everything in it.
    fn move_directory(&self, from: &Path, to: &Path) -> VitrineResult<()>;

    fn create_directory(&self, path: &Path) -> VitrineResult<()>;

    /// Delete one file. Deleting a file that does not exist succeeds.
    fn delete_file(&self, path: &Path) -> VitrineResult<()>;

    /// Delete a directory and everything in it. A missing directory succeeds.
    fn delete_directory(&self, path: &Path) -> VitrineResult<()>;

    fn exists(&self, path: &Path) -> bool;
}

// ============================================================================
// LOCAL FILESYSTEM
// ============================================================================

/// [`FileMover`] over the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileMover;

impl LocalFileMover {
    pub fn new() -> Self {
        Self
    }

    fn ensure_parent(path: &Path) -> std::io::Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
            _ => Ok(()),
        }
    }
}

impl FileMover for LocalFileMover {
    fn move_file(&self, from: &Path, to: &Path) -> VitrineResult<()> {
        Self::ensure_parent(to)
            .and_then(|_| fs::rename(from, to))
            .map_err(|e| {
                VitrineError::File(FileError::MoveFailed {
                    from: from.display().to_string(),
                    to: to.display().to_string(),
                    reason: e.to_string(),
                })
            })
    }

    fn copy_file(&self, from: &Path, to: &Path) -> VitrineResult<()> {
        Self::ensure_parent(to)
            .and_then(|_| fs::copy(from, to))
            .map(|_| ())
            .map_err(|e| {
                VitrineError::File(FileError::CopyFailed {
                    from: from.display().to_string(),
                    to: to.display().to_string(),
                    reason: e.to_string(),
                })
            })
    }

    fn move_directory(&self, from: &Path, to: &Path) -> VitrineResult<()> {
        if !from.exists() {
            // Albums whose directory was never created have nothing to move.
            return Ok(());
        }
        Self::ensure_parent(to)
            .and_then(|_| fs::rename(from, to))
            .map_err(|e| {
                VitrineError::File(FileError::MoveFailed {
                    from: from.display().to_string(),
                    to: to.display().to_string(),
                    reason: e.to_string(),
                })
            })
    }

    fn create_directory(&self, path: &Path) -> VitrineResult<()> {
        fs::create_dir_all(path).map_err(|e| {
            VitrineError::File(FileError::CreateDirectoryFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        })
    }

    fn delete_file(&self, path: &Path) -> VitrineResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VitrineError::File(FileError::DeleteFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })),
        }
    }

    fn delete_directory(&self, path: &Path) -> VitrineResult<()> {
        match fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VitrineError::File(FileError::DeleteFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

// ============================================================================
// MOCK FILE MOVER
// ============================================================================

/// In-memory [`FileMover`] for testing. Tracks a set of file paths and a set
/// of directory paths.
#[derive(Debug, Default)]
pub struct MockFileMover {
    files: RwLock<BTreeSet<PathBuf>>,
    directories: RwLock<BTreeSet<PathBuf>>,
}

impl MockFileMover {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file.
    pub fn add_file(&self, path: impl Into<PathBuf>) {
        if let Ok(mut files) = self.files.write() {
            files.insert(path.into());
        }
    }

    /// All tracked file paths, sorted.
    pub fn files(&self) -> Vec<PathBuf> {
        self.files
            .read()
            .map(|f| f.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All tracked directory paths, sorted.
    pub fn directories(&self) -> Vec<PathBuf> {
        self.directories
            .read()
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn files_mut(&self) -> VitrineResult<std::sync::RwLockWriteGuard<'_, BTreeSet<PathBuf>>> {
        self.files
            .write()
            .map_err(|_| VitrineError::Storage(StorageError::LockPoisoned))
    }

    fn directories_mut(
        &self,
    ) -> VitrineResult<std::sync::RwLockWriteGuard<'_, BTreeSet<PathBuf>>> {
        self.directories
            .write()
            .map_err(|_| VitrineError::Storage(StorageError::LockPoisoned))
    }

    fn rebase(set: &mut BTreeSet<PathBuf>, from: &Path, to: &Path) {
        let moved: Vec<PathBuf> = set.iter().filter(|p| p.starts_with(from)).cloned().collect();
        for path in moved {
            set.remove(&path);
            if let Ok(rest) = path.strip_prefix(from) {
                set.insert(to.join(rest));
            }
        }
    }
}

impl FileMover for MockFileMover {
    fn move_file(&self, from: &Path, to: &Path) -> VitrineResult<()> {
        let mut files = self.files_mut()?;
        if !files.remove(from) {
            return Err(VitrineError::File(FileError::MoveFailed {
                from: from.display().to_string(),
                to: to.display().to_string(),
                reason: "source does not exist".to_string(),
            }));
        }
        files.insert(to.to_path_buf());
        Ok(())
    }

    fn copy_file(&self, from: &Path, to: &Path) -> VitrineResult<()> {
        let mut files = self.files_mut()?;
        if !files.contains(from) {
            return Err(VitrineError::File(FileError::CopyFailed {
                from: from.display().to_string(),
                to: to.display().to_string(),
                reason: "source does not exist".to_string(),
            }));
        }
        files.insert(to.to_path_buf());
        Ok(())
    }

    fn move_directory(&self, from: &Path, to: &Path) -> VitrineResult<()> {
        Self::rebase(&mut *self.files_mut()?, from, to);
        Self::rebase(&mut *self.directories_mut()?, from, to);
        Ok(())
    }

    fn create_directory(&self, path: &Path) -> VitrineResult<()> {
        self.directories_mut()?.insert(path.to_path_buf());
        Ok(())
    }

    fn delete_file(&self, path: &Path) -> VitrineResult<()> {
        self.files_mut()?.remove(path);
        Ok(())
    }

    fn delete_directory(&self, path: &Path) -> VitrineResult<()> {
        self.files_mut()?.retain(|p| !p.starts_with(path));
        self.directories_mut()?.retain(|p| !p.starts_with(path));
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let is_file = self.files.read().map(|f| f.contains(path)).unwrap_or(false);
        is_file
            || self
                .directories
                .read()
                .map(|d| d.contains(path))
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mock_move_directory_rebases_descendants() {
        let mover = MockFileMover::new();
        mover.add_file("/g/trips/a.jpg");
        mover.add_file("/g/trips/2024/b.jpg");
        mover.add_file("/g/other/c.jpg");
        mover.create_directory(Path::new("/g/trips/2024")).unwrap();

        mover
            .move_directory(Path::new("/g/trips"), Path::new("/g/archive/trips"))
            .unwrap();

        assert!(mover.exists(Path::new("/g/archive/trips/a.jpg")));
        assert!(mover.exists(Path::new("/g/archive/trips/2024/b.jpg")));
        assert!(mover.exists(Path::new("/g/archive/trips/2024")));
        assert!(mover.exists(Path::new("/g/other/c.jpg")));
        assert!(!mover.exists(Path::new("/g/trips/a.jpg")));
    }

    #[test]
    fn test_mock_move_missing_file_fails() {
        let mover = MockFileMover::new();
        let result = mover.move_file(Path::new("/nope.jpg"), Path::new("/x.jpg"));
        assert!(matches!(result, Err(VitrineError::File(FileError::MoveFailed { .. }))));
    }

    #[test]
    fn test_mock_delete_directory() {
        let mover = MockFileMover::new();
        mover.add_file("/g/trips/a.jpg");
        mover.add_file("/g/trip.jpg");
        mover.delete_directory(Path::new("/g/trips")).unwrap();
        assert_eq!(mover.files(), vec![PathBuf::from("/g/trip.jpg")]);
    }

    #[test]
    fn test_local_move_copy_delete() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let mover = LocalFileMover::new();
        let src = temp_dir.path().join("a.jpg");
        fs::write(&src, b"pixels").unwrap();

        let copied = temp_dir.path().join("copies/a.jpg");
        mover.copy_file(&src, &copied).unwrap();
        assert!(mover.exists(&copied));
        assert!(mover.exists(&src));

        let moved = temp_dir.path().join("moved/deeper/a.jpg");
        mover.move_file(&src, &moved).unwrap();
        assert!(!mover.exists(&src));
        assert_eq!(fs::read(&moved).unwrap(), b"pixels");

        mover.delete_file(&moved).unwrap();
        mover.delete_file(&moved).unwrap();
        assert!(!mover.exists(&moved));
    }

    #[test]
    fn test_local_move_directory() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let mover = LocalFileMover::new();
        let album = temp_dir.path().join("trips");
        mover.create_directory(&album.join("2024")).unwrap();
        fs::write(album.join("2024/b.jpg"), b"b").unwrap();

        let dest = temp_dir.path().join("archive/trips");
        mover.move_directory(&album, &dest).unwrap();
        assert!(mover.exists(&dest.join("2024/b.jpg")));

        mover
            .move_directory(&temp_dir.path().join("never"), &temp_dir.path().join("x"))
            .unwrap();

        mover.delete_directory(&dest).unwrap();
        assert!(!mover.exists(&dest));
    }
}
