//! The engine contract every storage backend implements.
//!
//! A [`DatabaseEngine`] owns the backing store and hands out one
//! [`ContainerEngine`] per registered record type. Container engines see
//! records with references flattened to ids; reference resolution and
//! events live one layer up, in the container.

mod file;
mod memory;
mod sql;
mod tracked;

pub use file::{FileContainer, FileDatabase};
pub use memory::{MemoryDatabase, MemoryEngine};
pub use sql::{column_type, SqlConfig, SqlContainer, SqlDatabase, DEFAULT_BUSY_TIMEOUT, SQL_DATE_TIME_FORMAT};
pub use tracked::TrackedEngine;

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::meta::MetaItem;
use crate::record::Record;
use crate::schema::Schema;
use crate::types::{ContainerId, ItemId};
use std::sync::Arc;

/// What a database engine needs to know to create a container engine.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Registration slot of the container.
    pub id: ContainerId,
    /// Record type stored in the container.
    pub schema: Arc<Schema>,
    /// Time source for metadata.
    pub clock: Arc<dyn Clock>,
}

/// Primitive CRUD over the items of one record type.
///
/// The engine is the sole authority on id assignment. Bulk operations
/// apply item by item unless an implementation batches natively; either
/// way the first failure stops the batch and earlier items stay applied.
pub trait ContainerEngine: Send {
    /// Stores `item` under a fresh id, ignoring the id it carries.
    fn add_item(&mut self, item: Record) -> CoreResult<ItemId>;

    /// Stores `item` under its own id.
    ///
    /// # Errors
    ///
    /// Fails with an item-exists error if the id is occupied.
    fn insert_item(&mut self, item: Record) -> CoreResult<()>;

    /// Reads the item stored under `id`.
    fn get_item(&self, id: ItemId) -> CoreResult<Record>;

    /// Overwrites the item stored under `item`'s id.
    fn set_item(&mut self, item: Record) -> CoreResult<()>;

    /// Removes the item stored under `id`.
    fn remove_item(&mut self, id: ItemId) -> CoreResult<()>;

    /// Every stored id, ascending.
    fn item_ids(&self) -> CoreResult<Vec<ItemId>>;

    /// Returns true if an item is stored under `id`.
    fn check_item_exists(&self, id: ItemId) -> CoreResult<bool>;

    /// Adds several items.
    fn add_items(&mut self, items: Vec<Record>) -> CoreResult<Vec<ItemId>> {
        items.into_iter().map(|item| self.add_item(item)).collect()
    }

    /// Inserts several items.
    fn insert_items(&mut self, items: Vec<Record>) -> CoreResult<()> {
        items.into_iter().try_for_each(|item| self.insert_item(item))
    }

    /// Overwrites several items.
    fn set_items(&mut self, items: Vec<Record>) -> CoreResult<()> {
        items.into_iter().try_for_each(|item| self.set_item(item))
    }

    /// Removes several items.
    fn remove_items(&mut self, ids: &[ItemId]) -> CoreResult<()> {
        ids.iter().try_for_each(|id| self.remove_item(*id))
    }

    /// Reads several items.
    fn get_items(&self, ids: &[ItemId]) -> CoreResult<Vec<Record>> {
        ids.iter().map(|id| self.get_item(*id)).collect()
    }

    /// Every stored item, in id order.
    fn all_items(&self) -> CoreResult<Vec<Record>> {
        self.get_items(&self.item_ids()?)
    }

    /// Items for which `predicate` returns true.
    fn filter_items(&self, predicate: &mut dyn FnMut(&Record) -> bool) -> CoreResult<Vec<Record>> {
        let mut items = self.all_items()?;
        items.retain(|item| predicate(item));
        Ok(items)
    }

    /// Number of stored items.
    fn item_count(&self) -> CoreResult<usize> {
        Ok(self.item_ids()?.len())
    }

    /// Removes every item.
    fn clear(&mut self) -> CoreResult<()> {
        let ids = self.item_ids()?;
        self.remove_items(&ids)
    }

    /// Pulls remote changes. Local engines have none.
    fn update(&mut self) -> CoreResult<()> {
        Ok(())
    }

    /// Replication metadata of every item ever stored, tombstones included.
    ///
    /// # Errors
    ///
    /// Engines that do not track metadata return an invalid-operation error.
    fn meta_items(&self) -> CoreResult<Vec<MetaItem>> {
        Err(untracked())
    }

    /// Replication metadata of one item.
    fn meta_item(&self, id: ItemId) -> CoreResult<MetaItem> {
        self.meta_items()?
            .into_iter()
            .find(|meta| meta.id == id)
            .ok_or_else(|| CoreError::invalid_operation(format!("no metadata for item {id}")))
    }
}

pub(crate) fn untracked() -> CoreError {
    CoreError::invalid_operation("engine does not track item metadata")
}

/// A storage backend: opens and closes the store and creates container
/// engines for registered record types.
pub trait DatabaseEngine: Send {
    /// Opens the store. Returns true if it did not exist before.
    fn open(&mut self) -> CoreResult<bool>;

    /// Closes the store, persisting whatever the backend persists on close.
    fn close(&mut self) -> CoreResult<()>;

    /// Commits pending work. Backends that write through do nothing.
    fn commit(&mut self) -> CoreResult<()> {
        Ok(())
    }

    /// Creates the engine for a newly registered container.
    ///
    /// Called in registration order, before the first `open`.
    fn create_container_engine(&mut self, spec: &ContainerSpec) -> CoreResult<Box<dyn ContainerEngine>>;
}
