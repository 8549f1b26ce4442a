//! Container handles: typed CRUD with reference resolution and events.

use crate::database::Database;
use crate::error::CoreResult;
use crate::event::{Event, Listener, ListenerId};
use crate::meta::MetaItem;
use crate::record::Record;
use crate::schema::Schema;
use crate::types::{ContainerId, ItemId};
use std::sync::Arc;

/// Mutable access to one container of an open [`Database`].
///
/// Every operation fails with an access error while the database is
/// closed. Writes flatten nested references to ids, reads resolve them
/// back into records. Each successful operation posts its event to the
/// container's listeners.
pub struct ContainerHandle<'a> {
    db: &'a mut Database,
    id: ContainerId,
}

impl<'a> ContainerHandle<'a> {
    pub(crate) fn new(db: &'a mut Database, id: ContainerId) -> Self {
        Self { db, id }
    }

    /// Container id.
    #[must_use]
    pub fn id(&self) -> ContainerId {
        self.id
    }

    /// Record type stored here.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.db.slot(self.id).schema
    }

    fn post(&mut self, event: Event) {
        self.db.slot_mut(self.id).listeners.post(&event);
    }

    fn prepare(&mut self, mut item: Record) -> CoreResult<Record> {
        self.db.check_type(self.id, &item)?;
        self.db.flatten(self.id, &mut item, 0)?;
        Ok(item)
    }

    fn prepare_all(&mut self, items: Vec<Record>) -> CoreResult<Vec<Record>> {
        items.into_iter().map(|item| self.prepare(item)).collect()
    }

    fn resolved(&self, mut item: Record) -> CoreResult<Record> {
        self.db.resolve(self.id, &mut item, 0)?;
        Ok(item)
    }

    // ========================================================================
    // Single items
    // ========================================================================

    /// Stores `item` under a fresh id and returns it. The id `item` carries
    /// is ignored.
    pub fn add_item(&mut self, item: Record) -> CoreResult<ItemId> {
        let id = self.add_item_quietly(item)?;
        self.post(Event::ItemAdded {
            container: self.id,
            id,
        });
        Ok(id)
    }

    /// Adds without posting an event. Used to seed bookkeeping records.
    pub(crate) fn add_item_quietly(&mut self, item: Record) -> CoreResult<ItemId> {
        self.db.check_access()?;
        let item = self.prepare(item)?;
        self.db.slot_mut(self.id).engine.add_item(item)
    }

    /// Stores `item` under its own id.
    pub fn insert_item(&mut self, item: Record) -> CoreResult<()> {
        self.db.check_access()?;
        let item = self.prepare(item)?;
        let id = item.id();
        self.db.slot_mut(self.id).engine.insert_item(item)?;
        self.post(Event::ItemInserted {
            container: self.id,
            id,
        });
        Ok(())
    }

    /// Reads an item with its references resolved.
    pub fn get_item(&mut self, id: ItemId) -> CoreResult<Record> {
        self.db.check_access()?;
        let item = self.db.slot(self.id).engine.get_item(id)?;
        let item = self.resolved(item)?;
        self.post(Event::ItemRead {
            container: self.id,
            id,
        });
        Ok(item)
    }

    /// Overwrites the item stored under `item`'s id.
    pub fn set_item(&mut self, item: Record) -> CoreResult<()> {
        self.db.check_access()?;
        let item = self.prepare(item)?;
        let id = item.id();
        self.db.slot_mut(self.id).engine.set_item(item)?;
        self.post(Event::ItemSet {
            container: self.id,
            id,
        });
        Ok(())
    }

    /// Removes the item stored under `id`.
    pub fn remove_item(&mut self, id: ItemId) -> CoreResult<()> {
        self.db.check_access()?;
        self.db.slot_mut(self.id).engine.remove_item(id)?;
        self.post(Event::ItemRemoved {
            container: self.id,
            id,
        });
        Ok(())
    }

    // ========================================================================
    // Bulk variants
    // ========================================================================

    /// Adds several items and returns their ids in input order.
    pub fn add_items(&mut self, items: Vec<Record>) -> CoreResult<Vec<ItemId>> {
        self.db.check_access()?;
        let items = self.prepare_all(items)?;
        let ids = self.db.slot_mut(self.id).engine.add_items(items)?;
        self.post(Event::ItemsAdded {
            container: self.id,
            ids: ids.clone(),
        });
        Ok(ids)
    }

    /// Inserts several items.
    pub fn insert_items(&mut self, items: Vec<Record>) -> CoreResult<()> {
        self.db.check_access()?;
        let items = self.prepare_all(items)?;
        let ids = items.iter().map(Record::id).collect();
        self.db.slot_mut(self.id).engine.insert_items(items)?;
        self.post(Event::ItemsInserted {
            container: self.id,
            ids,
        });
        Ok(())
    }

    /// Reads several items.
    pub fn get_items(&mut self, ids: &[ItemId]) -> CoreResult<Vec<Record>> {
        self.db.check_access()?;
        let items = self.db.slot(self.id).engine.get_items(ids)?;
        let items = items
            .into_iter()
            .map(|item| self.resolved(item))
            .collect::<CoreResult<Vec<_>>>()?;
        self.post(Event::ItemsRead {
            container: self.id,
            ids: ids.to_vec(),
        });
        Ok(items)
    }

    /// Overwrites several items.
    pub fn set_items(&mut self, items: Vec<Record>) -> CoreResult<()> {
        self.db.check_access()?;
        let items = self.prepare_all(items)?;
        let ids = items.iter().map(Record::id).collect();
        self.db.slot_mut(self.id).engine.set_items(items)?;
        self.post(Event::ItemsSet {
            container: self.id,
            ids,
        });
        Ok(())
    }

    /// Removes several items.
    pub fn remove_items(&mut self, ids: &[ItemId]) -> CoreResult<()> {
        self.db.check_access()?;
        self.db.slot_mut(self.id).engine.remove_items(ids)?;
        self.post(Event::ItemsRemoved {
            container: self.id,
            ids: ids.to_vec(),
        });
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Every item, resolved, in id order.
    pub fn all_items(&self) -> CoreResult<Vec<Record>> {
        self.db.check_access()?;
        self.db
            .slot(self.id)
            .engine
            .all_items()?
            .into_iter()
            .map(|item| self.resolved(item))
            .collect()
    }

    /// Resolved items for which `predicate` returns true.
    pub fn filter_items<F>(&mut self, mut predicate: F) -> CoreResult<Vec<Record>>
    where
        F: FnMut(&Record) -> bool,
    {
        let mut items = self.all_items()?;
        items.retain(|item| predicate(item));
        self.post(Event::ItemsFiltered {
            container: self.id,
            ids: items.iter().map(Record::id).collect(),
        });
        Ok(items)
    }

    /// Every stored id, ascending.
    pub fn item_ids(&self) -> CoreResult<Vec<ItemId>> {
        self.db.check_access()?;
        self.db.slot(self.id).engine.item_ids()
    }

    /// Number of stored items.
    pub fn item_count(&self) -> CoreResult<usize> {
        self.db.check_access()?;
        self.db.slot(self.id).engine.item_count()
    }

    /// Returns true if an item is stored under `id`.
    pub fn check_item_exists(&self, id: ItemId) -> CoreResult<bool> {
        self.db.check_access()?;
        self.db.slot(self.id).engine.check_item_exists(id)
    }

    /// Removes every item.
    pub fn clear(&mut self) -> CoreResult<()> {
        self.db.check_access()?;
        self.db.slot_mut(self.id).engine.clear()?;
        self.post(Event::Cleared { container: self.id });
        Ok(())
    }

    /// Pulls remote changes. A no-op for local engines, but the event is
    /// posted either way.
    pub fn update(&mut self) -> CoreResult<()> {
        self.db.check_access()?;
        self.db.slot_mut(self.id).engine.update()?;
        self.post(Event::Updated { container: self.id });
        Ok(())
    }

    /// Replication metadata, tombstones included.
    pub fn meta_items(&self) -> CoreResult<Vec<MetaItem>> {
        self.db.check_access()?;
        self.db.slot(self.id).engine.meta_items()
    }

    /// Replication metadata of one item.
    pub fn meta_item(&self, id: ItemId) -> CoreResult<MetaItem> {
        self.db.check_access()?;
        self.db.slot(self.id).engine.meta_item(id)
    }

    /// Reads an item as stored: references stay ids and no event is posted.
    pub fn stored_item(&self, id: ItemId) -> CoreResult<Record> {
        self.db.check_access()?;
        self.db.slot(self.id).engine.get_item(id)
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    /// Subscribes to this container's item events.
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.db
            .slot_mut(self.id)
            .listeners
            .add(Box::new(listener) as Listener)
    }

    /// Removes a container listener. Returns false if it was unknown.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.db.slot_mut(self.id).listeners.remove(id)
    }
}

impl std::fmt::Debug for ContainerHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("id", &self.id)
            .field("table", &self.schema().table())
            .finish()
    }
}
