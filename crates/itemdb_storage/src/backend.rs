//! Snapshot backend trait definition.

use crate::error::StorageResult;

/// A store for a single opaque snapshot image.
///
/// # Invariants
///
/// - `load` returns `None` until the first successful `replace`
/// - `load` after `replace(data)` returns exactly `data`
/// - `replace` overwrites the previous image entirely
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait SnapshotBackend: Send + Sync {
    /// Returns true if a snapshot has been stored.
    fn exists(&self) -> bool;

    /// Reads the whole snapshot, or `None` if nothing was ever stored.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn load(&self) -> StorageResult<Option<Vec<u8>>>;

    /// Replaces the snapshot with `data`.
    ///
    /// A failure part way through may leave a truncated image behind.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;
}
