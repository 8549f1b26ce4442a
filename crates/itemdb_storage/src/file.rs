//! File-based snapshot backend for persistent storage.

use crate::backend::SnapshotBackend;
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// A snapshot backend stored in a single file.
///
/// The file is created lazily by the first [`replace`](SnapshotBackend::replace);
/// a missing file means "no snapshot yet". Each write truncates and rewrites
/// the file, then syncs it to disk.
///
/// # Locking
///
/// Reads take a shared advisory lock and writes an exclusive one, so two
/// handles never interleave a read with a partial rewrite. A conflicting
/// lock fails with [`StorageError::Locked`] instead of blocking.
///
/// # Example
///
/// ```no_run
/// use itemdb_storage::{SnapshotBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::new(Path::new("items.db"));
/// backend.replace(b"persistent data").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Creates a backend for the file at `path` without touching the disk.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Creates a backend, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created.
    pub fn with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self::new(path))
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_error(&self, err: io::Error) -> StorageError {
        if err.kind() == io::ErrorKind::WouldBlock {
            StorageError::Locked {
                path: self.path.clone(),
            }
        } else {
            StorageError::Io(err)
        }
    }
}

impl SnapshotBackend for FileBackend {
    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn load(&self) -> StorageResult<Option<Vec<u8>>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        FileExt::try_lock_shared(&file).map_err(|e| self.lock_error(e))?;

        let mut data = Vec::new();
        let result = file.read_to_end(&mut data);
        FileExt::unlock(&file)?;
        result?;

        tracing::debug!(path = %self.path.display(), bytes = data.len(), "loaded snapshot");
        Ok(Some(data))
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        FileExt::try_lock_exclusive(&file).map_err(|e| self.lock_error(e))?;

        let result = file
            .set_len(0)
            .and_then(|()| file.write_all(data))
            .and_then(|()| file.sync_all());
        FileExt::unlock(&file)?;
        result?;

        tracing::debug!(path = %self.path.display(), bytes = data.len(), "replaced snapshot");
        Ok(())
    }
}
