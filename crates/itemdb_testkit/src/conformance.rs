//! Backend conformance suite.
//!
//! Every storage backend must give the same answers to the same calls.
//! Each check runs on a fresh [`TestDatabase`] and panics with the
//! backend's name on the first divergence.

use crate::fixtures::{Backend, TestDatabase};
use crate::generators::ContainerOp;
use itemdb_core::{
    epoch, Attribute, Clock, ContainerId, CoreError, Database, DatabaseConfig, ItemId,
    ManualClock, Record, Schema,
};
use std::sync::Arc;

/// The record type used by the suite: a note with one text field.
pub fn note_schema() -> Arc<Schema> {
    Schema::builder("Note")
        .attribute(Attribute::string("text", ""))
        .build()
        .expect("note schema")
}

/// A note with `text`.
pub fn note(schema: &Arc<Schema>, text: &str) -> Record {
    Record::build(schema, [("text", text)]).expect("note record")
}

/// An open database with the note container registered.
pub struct NoteDb {
    /// The database; keeps its temporary directory alive.
    pub db: TestDatabase,
    /// The note container.
    pub notes: ContainerId,
    /// The note record type.
    pub schema: Arc<Schema>,
    /// The clock driving metadata timestamps.
    pub clock: Arc<ManualClock>,
}

impl NoteDb {
    /// Opens a fresh note database on `backend`.
    pub fn open(backend: Backend) -> Self {
        let clock = Arc::new(ManualClock::new(epoch()));
        let config = DatabaseConfig::default().with_clock(clock.clone());
        let mut db = TestDatabase::with_config(backend, config);
        let schema = note_schema();
        let notes = db.register(Arc::clone(&schema)).expect("register notes");
        db.open().expect("open note database");
        Self {
            db,
            notes,
            schema,
            clock,
        }
    }

    /// Stored `(id, text)` pairs in id order.
    pub fn snapshot(&mut self) -> Vec<(ItemId, String)> {
        snapshot(&mut self.db, self.notes)
    }
}

fn snapshot(db: &mut Database, notes: ContainerId) -> Vec<(ItemId, String)> {
    db.container(notes)
        .expect("note container")
        .all_items()
        .expect("all items")
        .iter()
        .map(|r| (r.id(), r.get_str("text").unwrap_or_default().to_owned()))
        .collect()
}

/// Outcome class of one operation, comparable across backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutcome {
    /// Succeeded; `Some(id)` for adds.
    Ok(Option<ItemId>),
    /// Item-not-found error.
    NotFound,
    /// Item-exists error.
    Exists,
    /// Any other error, by message.
    Other(String),
}

impl From<&CoreError> for OpOutcome {
    fn from(err: &CoreError) -> Self {
        if err.is_not_found() {
            OpOutcome::NotFound
        } else if err.is_exists() {
            OpOutcome::Exists
        } else {
            OpOutcome::Other(err.to_string())
        }
    }
}

/// Applies `ops` to the note container and reports each outcome.
pub fn apply_ops(db: &mut NoteDb, ops: &[ContainerOp]) -> Vec<OpOutcome> {
    let schema = Arc::clone(&db.schema);
    let mut handle = db.db.container(db.notes).expect("note container");
    ops.iter()
        .map(|op| {
            let result = match op {
                ContainerOp::Add(text) => handle.add_item(note(&schema, text)).map(Some),
                ContainerOp::Insert(id, text) => {
                    handle.insert_item(note(&schema, text).with_id(*id)).map(|()| None)
                }
                ContainerOp::Set(id, text) => {
                    handle.set_item(note(&schema, text).with_id(*id)).map(|()| None)
                }
                ContainerOp::Remove(id) => handle.remove_item(*id).map(|()| None),
                ContainerOp::Clear => handle.clear().map(|()| None),
            };
            match result {
                Ok(id) => OpOutcome::Ok(id),
                Err(err) => OpOutcome::from(&err),
            }
        })
        .collect()
}

/// Runs every check against `backend`.
pub fn run_all(backend: Backend) {
    ids_start_at_zero_and_follow_max(backend);
    insert_requires_free_id(backend);
    set_and_remove_require_existing(backend);
    bulk_failure_keeps_earlier_items(backend);
    filter_and_count(backend);
    metadata_follows_changes(backend);
    clear_tombstones_everything(backend);
}

/// New ids are `max + 1`, starting from zero.
pub fn ids_start_at_zero_and_follow_max(backend: Backend) {
    let mut n = NoteDb::open(backend);
    let schema = Arc::clone(&n.schema);
    let mut notes = n.db.container(n.notes).expect("notes");
    assert_eq!(notes.add_item(note(&schema, "a")).unwrap(), 0, "{backend:?}");
    notes.insert_item(note(&schema, "b").with_id(10)).unwrap();
    assert_eq!(notes.add_item(note(&schema, "c")).unwrap(), 11, "{backend:?}");
    assert_eq!(notes.item_ids().unwrap(), vec![0, 10, 11], "{backend:?}");
}

/// Insert fails on an occupied id and leaves the item alone.
pub fn insert_requires_free_id(backend: Backend) {
    let mut n = NoteDb::open(backend);
    let schema = Arc::clone(&n.schema);
    let mut notes = n.db.container(n.notes).expect("notes");
    notes.insert_item(note(&schema, "first").with_id(3)).unwrap();
    let err = notes.insert_item(note(&schema, "second").with_id(3)).unwrap_err();
    assert!(err.is_exists(), "{backend:?}: {err}");
    assert_eq!(notes.get_item(3).unwrap().get_str("text"), Some("first"), "{backend:?}");
}

/// Set and remove of an unknown id fail with not-found.
pub fn set_and_remove_require_existing(backend: Backend) {
    let mut n = NoteDb::open(backend);
    let schema = Arc::clone(&n.schema);
    let mut notes = n.db.container(n.notes).expect("notes");
    assert!(notes.set_item(note(&schema, "x").with_id(5)).unwrap_err().is_not_found(), "{backend:?}");
    assert!(notes.remove_item(5).unwrap_err().is_not_found(), "{backend:?}");
    assert!(notes.get_item(5).unwrap_err().is_not_found(), "{backend:?}");
    assert!(!notes.check_item_exists(5).unwrap(), "{backend:?}");
}

/// A failing bulk insert stops at the failure; earlier items stay.
pub fn bulk_failure_keeps_earlier_items(backend: Backend) {
    let mut n = NoteDb::open(backend);
    let schema = Arc::clone(&n.schema);
    let mut notes = n.db.container(n.notes).expect("notes");
    notes.insert_item(note(&schema, "taken").with_id(2)).unwrap();
    let batch = vec![
        note(&schema, "one").with_id(1),
        note(&schema, "dup").with_id(2),
        note(&schema, "three").with_id(3),
    ];
    assert!(notes.insert_items(batch).is_err(), "{backend:?}");
    assert_eq!(notes.item_ids().unwrap(), vec![1, 2], "{backend:?}");

    let texts = notes.get_items(&[1, 2]).unwrap();
    assert_eq!(texts[1].get_str("text"), Some("taken"), "{backend:?}");
}

/// Filtering and counting agree with the stored items.
pub fn filter_and_count(backend: Backend) {
    let mut n = NoteDb::open(backend);
    let schema = Arc::clone(&n.schema);
    let mut notes = n.db.container(n.notes).expect("notes");
    notes
        .add_items(["apple", "banana", "avocado"].map(|t| note(&schema, t)).to_vec())
        .unwrap();
    let a = notes
        .filter_items(|r| r.get_str("text").is_some_and(|t| t.starts_with('a')))
        .unwrap();
    assert_eq!(a.iter().map(Record::id).collect::<Vec<_>>(), vec![0, 2], "{backend:?}");
    assert_eq!(notes.item_count().unwrap(), 3, "{backend:?}");
}

/// Add and set stamp the clock; remove leaves a tombstone; insert revives.
pub fn metadata_follows_changes(backend: Backend) {
    let mut n = NoteDb::open(backend);
    let schema = Arc::clone(&n.schema);
    let clock = Arc::clone(&n.clock);
    let mut notes = n.db.container(n.notes).expect("notes");

    let id = notes.add_item(note(&schema, "a")).unwrap();
    let created = clock.now();
    assert_eq!(notes.meta_item(id).unwrap().last_update, created, "{backend:?}");

    clock.advance(10);
    notes.set_item(note(&schema, "b").with_id(id)).unwrap();
    let meta = notes.meta_item(id).unwrap();
    assert_eq!((meta.last_update, meta.deleted), (clock.now(), false), "{backend:?}");

    clock.advance(10);
    notes.remove_item(id).unwrap();
    let meta = notes.meta_item(id).unwrap();
    assert_eq!((meta.last_update, meta.deleted), (clock.now(), true), "{backend:?}");

    clock.advance(10);
    notes.insert_item(note(&schema, "c").with_id(id)).unwrap();
    let meta = notes.meta_item(id).unwrap();
    assert_eq!((meta.last_update, meta.deleted), (clock.now(), false), "{backend:?}");
    assert_eq!(notes.meta_items().unwrap().len(), 1, "{backend:?}");
}

/// Clear empties the container and tombstones every item.
pub fn clear_tombstones_everything(backend: Backend) {
    let mut n = NoteDb::open(backend);
    let schema = Arc::clone(&n.schema);
    let mut notes = n.db.container(n.notes).expect("notes");
    notes.add_items(vec![note(&schema, "a"), note(&schema, "b")]).unwrap();
    notes.clear().unwrap();
    assert_eq!(notes.item_count().unwrap(), 0, "{backend:?}");
    let metas = notes.meta_items().unwrap();
    assert_eq!(metas.len(), 2, "{backend:?}");
    assert!(metas.iter().all(|m| m.deleted), "{backend:?}");
}
