//! In-memory snapshot backend for testing.

use crate::backend::SnapshotBackend;
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory snapshot backend.
///
/// Clones share the same image, so a test can keep one handle and hand
/// another to a store, then reopen the store from the surviving handle.
///
/// # Example
///
/// ```rust
/// use itemdb_storage::{SnapshotBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let observer = backend.clone();
/// backend.replace(b"test data").unwrap();
/// assert_eq!(observer.data().unwrap(), b"test data");
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    image: Arc<RwLock<Option<Vec<u8>>>>,
}

impl InMemoryBackend {
    /// Creates a backend with no snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend holding a pre-existing snapshot.
    ///
    /// Useful for testing corrupt or truncated images.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            image: Arc::new(RwLock::new(Some(data))),
        }
    }

    /// Returns a copy of the current snapshot.
    #[must_use]
    pub fn data(&self) -> Option<Vec<u8>> {
        self.image.read().clone()
    }

    /// Drops the snapshot.
    pub fn clear(&mut self) {
        *self.image.write() = None;
    }
}

impl SnapshotBackend for InMemoryBackend {
    fn exists(&self) -> bool {
        self.image.read().is_some()
    }

    fn load(&self) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.image.read().clone())
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        *self.image.write() = Some(data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_without_snapshot() {
        let backend = InMemoryBackend::new();
        assert!(!backend.exists());
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn replace_then_load() {
        let mut backend = InMemoryBackend::new();
        backend.replace(b"first").unwrap();
        backend.replace(b"second").unwrap();
        assert_eq!(backend.load().unwrap().unwrap(), b"second");
    }

    #[test]
    fn clones_share_image() {
        let mut backend = InMemoryBackend::new();
        let other = backend.clone();
        backend.replace(b"shared").unwrap();
        assert!(other.exists());
        assert_eq!(other.data().unwrap(), b"shared");
    }

    #[test]
    fn with_data_and_clear() {
        let mut backend = InMemoryBackend::with_data(vec![1, 2, 3]);
        assert_eq!(backend.data(), Some(vec![1, 2, 3]));
        backend.clear();
        assert!(!backend.exists());
    }
}
