//! Snapshot file engine.
//!
//! Items live in memory while the store is open. `open` loads the whole
//! snapshot, `close` writes it back in one piece:
//!
//! ```text
//! for each container, in registration order:
//!     u16 item count
//!     item count × encoded record
//! ```

use super::{ContainerEngine, ContainerSpec, DatabaseEngine, MemoryEngine, TrackedEngine};
use crate::error::{CoreError, CoreResult};
use crate::meta::MetaItem;
use crate::record::Record;
use crate::schema::Schema;
use crate::types::ItemId;
use itemdb_codec::DataStream;
use itemdb_storage::{FileBackend, InMemoryBackend, SnapshotBackend};
use parking_lot::Mutex;
use std::io;
use std::path::Path;
use std::sync::Arc;

type SharedStore = Arc<Mutex<TrackedEngine<MemoryEngine>>>;

/// Database engine persisting a snapshot through a [`SnapshotBackend`].
pub struct FileDatabase {
    backend: Box<dyn SnapshotBackend>,
    stores: Vec<(Arc<Schema>, SharedStore)>,
}

impl FileDatabase {
    /// Creates an engine over an arbitrary backend.
    pub fn new(backend: impl SnapshotBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            stores: Vec::new(),
        }
    }

    /// Creates an engine persisting to the file at `path`.
    pub fn open_path(path: impl AsRef<Path>) -> Self {
        Self::new(FileBackend::new(path.as_ref()))
    }

    /// Creates an engine whose snapshot lives in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(InMemoryBackend::new())
    }

    fn load(&mut self, bytes: Vec<u8>) -> CoreResult<()> {
        let mut stream = DataStream::from_slice(&bytes);
        for (schema, store) in &self.stores {
            let mut store = store.lock();
            let count = stream.read_u16().map_err(snapshot_error)?;
            for _ in 0..count {
                let record = Record::decode(schema, &mut stream).map_err(snapshot_error)?;
                store.insert_item(record).map_err(snapshot_error)?;
            }
            tracing::debug!(table = schema.table(), items = count, "loaded container");
        }
        if !stream.is_empty() {
            tracing::warn!(trailing = stream.len(), "snapshot has trailing bytes");
        }
        Ok(())
    }

    fn snapshot(&self) -> CoreResult<Vec<u8>> {
        let mut stream = DataStream::new();
        for (schema, store) in &self.stores {
            let store = store.lock();
            let count = store.item_count()?;
            let count = u16::try_from(count).map_err(|_| {
                CoreError::invalid_operation(format!(
                    "{} holds {count} items, a snapshot stores at most {}",
                    schema.table(),
                    u16::MAX
                ))
            })?;
            stream.write_u16(count);
            for record in store.all_items()? {
                record.encode(&mut stream)?;
            }
        }
        Ok(stream.into_bytes().to_vec())
    }
}

impl std::fmt::Debug for FileDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDatabase")
            .field("containers", &self.stores.len())
            .finish_non_exhaustive()
    }
}

fn snapshot_error(err: impl Into<CoreError>) -> CoreError {
    match err.into() {
        CoreError::Codec(e) if e.is_incomplete() => {
            CoreError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, e.to_string()))
        }
        CoreError::Io(e) => CoreError::Io(e),
        other => CoreError::corrupt_snapshot(other.to_string()),
    }
}

impl DatabaseEngine for FileDatabase {
    fn open(&mut self) -> CoreResult<bool> {
        for (_, store) in &self.stores {
            let mut store = store.lock();
            store.inner_mut().reset();
            store.forget_metadata();
        }
        match self.backend.load()? {
            None => Ok(true),
            Some(bytes) => {
                tracing::info!(bytes = bytes.len(), "loading snapshot");
                self.load(bytes)?;
                Ok(false)
            }
        }
    }

    fn close(&mut self) -> CoreResult<()> {
        let bytes = self.snapshot()?;
        self.backend.replace(&bytes)?;
        tracing::info!(bytes = bytes.len(), "snapshot saved");
        Ok(())
    }

    fn create_container_engine(&mut self, spec: &ContainerSpec) -> CoreResult<Box<dyn ContainerEngine>> {
        let store = Arc::new(Mutex::new(TrackedEngine::new(
            MemoryEngine::new(&spec.schema),
            spec.clock.clone(),
        )));
        self.stores.push((spec.schema.clone(), store.clone()));
        Ok(Box::new(FileContainer { store }))
    }
}

/// Container engine of a [`FileDatabase`].
#[derive(Debug)]
pub struct FileContainer {
    store: SharedStore,
}

impl ContainerEngine for FileContainer {
    fn add_item(&mut self, item: Record) -> CoreResult<ItemId> {
        self.store.lock().add_item(item)
    }

    fn insert_item(&mut self, item: Record) -> CoreResult<()> {
        self.store.lock().insert_item(item)
    }

    fn get_item(&self, id: ItemId) -> CoreResult<Record> {
        self.store.lock().get_item(id)
    }

    fn set_item(&mut self, item: Record) -> CoreResult<()> {
        self.store.lock().set_item(item)
    }

    fn remove_item(&mut self, id: ItemId) -> CoreResult<()> {
        self.store.lock().remove_item(id)
    }

    fn item_ids(&self) -> CoreResult<Vec<ItemId>> {
        self.store.lock().item_ids()
    }

    fn check_item_exists(&self, id: ItemId) -> CoreResult<bool> {
        self.store.lock().check_item_exists(id)
    }

    fn all_items(&self) -> CoreResult<Vec<Record>> {
        self.store.lock().all_items()
    }

    fn item_count(&self) -> CoreResult<usize> {
        self.store.lock().item_count()
    }

    fn clear(&mut self) -> CoreResult<()> {
        self.store.lock().clear()
    }

    fn meta_items(&self) -> CoreResult<Vec<MetaItem>> {
        self.store.lock().meta_items()
    }

    fn meta_item(&self, id: ItemId) -> CoreResult<MetaItem> {
        self.store.lock().meta_item(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::schema::Attribute;
    use crate::types::ContainerId;

    fn participant() -> Arc<Schema> {
        Schema::builder("Participant")
            .attribute(Attribute::string("name", "Participant name"))
            .build()
            .unwrap()
    }

    fn spec(id: u8, schema: &Arc<Schema>) -> ContainerSpec {
        ContainerSpec {
            id: ContainerId(id),
            schema: schema.clone(),
            clock: Arc::new(SystemClock),
        }
    }

    fn named(schema: &Arc<Schema>, name: &str) -> Record {
        Record::build(schema, [("name", name)]).unwrap()
    }

    #[test]
    fn missing_snapshot_is_new() {
        let mut db = FileDatabase::in_memory();
        let schema = participant();
        db.create_container_engine(&spec(0, &schema)).unwrap();
        assert!(db.open().unwrap());
    }

    #[test]
    fn close_then_open_restores_items() {
        let backend = InMemoryBackend::new();
        let schema = participant();

        let mut db = FileDatabase::new(backend.clone());
        let mut container = db.create_container_engine(&spec(0, &schema)).unwrap();
        db.open().unwrap();
        container.add_item(named(&schema, "Peter")).unwrap();
        container.add_item(named(&schema, "Konrad")).unwrap();
        db.close().unwrap();

        let mut db = FileDatabase::new(backend);
        let container = db.create_container_engine(&spec(0, &schema)).unwrap();
        assert!(!db.open().unwrap());
        assert_eq!(container.item_ids().unwrap(), vec![0, 1]);
        assert_eq!(container.get_item(1).unwrap().get_str("name"), Some("Konrad"));
    }

    #[test]
    fn snapshot_layout() {
        let backend = InMemoryBackend::new();
        let schema = participant();
        let mut db = FileDatabase::new(backend.clone());
        let mut container = db.create_container_engine(&spec(0, &schema)).unwrap();
        db.open().unwrap();
        container.add_item(named(&schema, "A")).unwrap();
        db.close().unwrap();

        assert_eq!(backend.data().unwrap(), vec![0, 1, 0, 0, 0, 0, 0, 1, b'A']);
    }

    #[test]
    fn reopen_discards_unsaved_changes() {
        let backend = InMemoryBackend::new();
        let schema = participant();
        let mut db = FileDatabase::new(backend);
        let mut container = db.create_container_engine(&spec(0, &schema)).unwrap();
        db.open().unwrap();
        container.add_item(named(&schema, "kept")).unwrap();
        db.close().unwrap();

        container.add_item(named(&schema, "lost")).unwrap();
        db.open().unwrap();
        assert_eq!(container.item_count().unwrap(), 1);
    }

    #[test]
    fn truncated_snapshot_is_unexpected_eof() {
        let schema = participant();
        let mut db = FileDatabase::new(InMemoryBackend::with_data(vec![0, 2, 0, 0]));
        db.create_container_engine(&spec(0, &schema)).unwrap();
        match db.open().unwrap_err() {
            CoreError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_ids_are_corrupt() {
        let schema = participant();
        let mut bytes = vec![0, 2];
        for _ in 0..2 {
            bytes.extend_from_slice(&named(&schema, "x").with_id(0).to_bytes().unwrap());
        }
        let mut db = FileDatabase::new(InMemoryBackend::with_data(bytes));
        db.create_container_engine(&spec(0, &schema)).unwrap();
        match db.open().unwrap_err() {
            CoreError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::InvalidData),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn file_backend_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.db");
        let schema = participant();

        let mut db = FileDatabase::open_path(&path);
        let mut container = db.create_container_engine(&spec(0, &schema)).unwrap();
        assert!(db.open().unwrap());
        container.add_item(named(&schema, "Peter")).unwrap();
        db.close().unwrap();
        assert!(path.exists());

        let mut db = FileDatabase::open_path(&path);
        let container = db.create_container_engine(&spec(0, &schema)).unwrap();
        assert!(!db.open().unwrap());
        assert_eq!(container.item_count().unwrap(), 1);
    }
}
