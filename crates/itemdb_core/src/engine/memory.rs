//! In-memory engine.

use super::{ContainerEngine, ContainerSpec, DatabaseEngine, TrackedEngine};
use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use crate::schema::Schema;
use crate::types::{ItemId, UNASSIGNED_ID};
use std::collections::BTreeMap;

/// Items of one record type held in an ordered map.
///
/// New ids are `max(existing ids) + 1`, or 0 when empty.
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    table: String,
    items: BTreeMap<ItemId, Record>,
}

impl MemoryEngine {
    /// Creates an empty engine for `schema`.
    #[must_use]
    pub fn new(schema: &Schema) -> Self {
        Self {
            table: schema.table().to_owned(),
            items: BTreeMap::new(),
        }
    }

    /// Drops every item without any bookkeeping.
    pub fn reset(&mut self) {
        self.items.clear();
    }

    fn next_item_id(&self) -> CoreResult<ItemId> {
        match self.items.keys().next_back() {
            None => Ok(0),
            Some(max) => max
                .checked_add(1)
                .ok_or_else(|| CoreError::invalid_operation(format!("{} ran out of ids", self.table))),
        }
    }

    fn not_found(&self, id: ItemId) -> CoreError {
        CoreError::item_not_found(self.table.as_str(), id)
    }
}

impl ContainerEngine for MemoryEngine {
    fn add_item(&mut self, mut item: Record) -> CoreResult<ItemId> {
        let id = self.next_item_id()?;
        item.set_id(id);
        self.items.insert(id, item);
        Ok(id)
    }

    fn insert_item(&mut self, item: Record) -> CoreResult<()> {
        let id = item.id();
        if id == UNASSIGNED_ID {
            return Err(CoreError::validation(format!(
                "cannot insert into {} without an id",
                self.table
            )));
        }
        if self.items.contains_key(&id) {
            return Err(CoreError::item_exists(self.table.as_str(), id));
        }
        self.items.insert(id, item);
        Ok(())
    }

    fn get_item(&self, id: ItemId) -> CoreResult<Record> {
        self.items.get(&id).cloned().ok_or_else(|| self.not_found(id))
    }

    fn set_item(&mut self, item: Record) -> CoreResult<()> {
        let id = item.id();
        match self.items.get_mut(&id) {
            Some(slot) => {
                *slot = item;
                Ok(())
            }
            None => Err(self.not_found(id)),
        }
    }

    fn remove_item(&mut self, id: ItemId) -> CoreResult<()> {
        self.items.remove(&id).map(|_| ()).ok_or_else(|| self.not_found(id))
    }

    fn item_ids(&self) -> CoreResult<Vec<ItemId>> {
        Ok(self.items.keys().copied().collect())
    }

    fn check_item_exists(&self, id: ItemId) -> CoreResult<bool> {
        Ok(self.items.contains_key(&id))
    }

    fn all_items(&self) -> CoreResult<Vec<Record>> {
        Ok(self.items.values().cloned().collect())
    }

    fn item_count(&self) -> CoreResult<usize> {
        Ok(self.items.len())
    }

    fn clear(&mut self) -> CoreResult<()> {
        self.items.clear();
        Ok(())
    }
}

/// Database engine keeping everything in memory.
///
/// Nothing survives the process. With metadata tracking enabled every
/// container keeps a tombstone side-table and can serve as the
/// authoritative store of a sync server.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    track_meta: bool,
    opened_before: bool,
}

impl MemoryDatabase {
    /// Creates an engine without metadata tracking.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine whose containers track replication metadata.
    #[must_use]
    pub fn tracked() -> Self {
        Self {
            track_meta: true,
            opened_before: false,
        }
    }
}

impl DatabaseEngine for MemoryDatabase {
    fn open(&mut self) -> CoreResult<bool> {
        let newly_created = !self.opened_before;
        self.opened_before = true;
        Ok(newly_created)
    }

    fn close(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn create_container_engine(&mut self, spec: &ContainerSpec) -> CoreResult<Box<dyn ContainerEngine>> {
        let engine = MemoryEngine::new(&spec.schema);
        if self.track_meta {
            Ok(Box::new(TrackedEngine::new(engine, spec.clock.clone())))
        } else {
            Ok(Box::new(engine))
        }
    }
}
