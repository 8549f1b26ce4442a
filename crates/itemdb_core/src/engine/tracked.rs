//! Metadata tracking layer.

use super::ContainerEngine;
use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::meta::MetaItem;
use crate::record::Record;
use crate::types::ItemId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Wraps an engine and keeps a [`MetaItem`] per id it has ever stored.
///
/// Add and insert create metadata, set refreshes the timestamp, remove and
/// clear leave tombstones behind. Inserting over a tombstone revives it.
#[derive(Debug)]
pub struct TrackedEngine<E> {
    inner: E,
    metas: BTreeMap<ItemId, MetaItem>,
    clock: Arc<dyn Clock>,
}

impl<E: ContainerEngine> TrackedEngine<E> {
    /// Wraps `inner`.
    pub fn new(inner: E, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            metas: BTreeMap::new(),
            clock,
        }
    }

    /// The wrapped engine.
    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// Drops the metadata table.
    pub fn forget_metadata(&mut self) {
        self.metas.clear();
    }

    /// Mutable access to the wrapped engine, bypassing metadata.
    pub fn inner_mut(&mut self) -> &mut E {
        &mut self.inner
    }

    fn touch(&mut self, id: ItemId) {
        let now = self.clock.now();
        self.metas
            .entry(id)
            .and_modify(|meta| meta.touch(now))
            .or_insert_with(|| MetaItem::new(id, now));
    }

    fn tombstone(&mut self, id: ItemId) {
        let now = self.clock.now();
        self.metas
            .entry(id)
            .or_insert_with(|| MetaItem::new(id, now))
            .tombstone(now);
    }
}

impl<E: ContainerEngine> ContainerEngine for TrackedEngine<E> {
    fn add_item(&mut self, item: Record) -> CoreResult<ItemId> {
        let id = self.inner.add_item(item)?;
        self.touch(id);
        Ok(id)
    }

    fn insert_item(&mut self, item: Record) -> CoreResult<()> {
        let id = item.id();
        self.inner.insert_item(item)?;
        self.touch(id);
        Ok(())
    }

    fn get_item(&self, id: ItemId) -> CoreResult<Record> {
        self.inner.get_item(id)
    }

    fn set_item(&mut self, item: Record) -> CoreResult<()> {
        let id = item.id();
        self.inner.set_item(item)?;
        self.touch(id);
        Ok(())
    }

    fn remove_item(&mut self, id: ItemId) -> CoreResult<()> {
        self.inner.remove_item(id)?;
        self.tombstone(id);
        Ok(())
    }

    fn item_ids(&self) -> CoreResult<Vec<ItemId>> {
        self.inner.item_ids()
    }

    fn check_item_exists(&self, id: ItemId) -> CoreResult<bool> {
        self.inner.check_item_exists(id)
    }

    fn all_items(&self) -> CoreResult<Vec<Record>> {
        self.inner.all_items()
    }

    fn item_count(&self) -> CoreResult<usize> {
        self.inner.item_count()
    }

    fn clear(&mut self) -> CoreResult<()> {
        let ids = self.inner.item_ids()?;
        self.inner.clear()?;
        for id in ids {
            self.tombstone(id);
        }
        Ok(())
    }

    fn meta_items(&self) -> CoreResult<Vec<MetaItem>> {
        Ok(self.metas.values().cloned().collect())
    }

    fn meta_item(&self, id: ItemId) -> CoreResult<MetaItem> {
        self.metas
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::invalid_operation(format!("no metadata for item {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{epoch, ManualClock};
    use crate::engine::MemoryEngine;
    use crate::schema::{Attribute, Schema};

    fn setup() -> (TrackedEngine<MemoryEngine>, Arc<ManualClock>, Arc<Schema>) {
        let schema = Schema::builder("Note")
            .attribute(Attribute::string("text", ""))
            .build()
            .unwrap();
        let clock = Arc::new(ManualClock::new(epoch()));
        let engine = TrackedEngine::new(MemoryEngine::new(&schema), clock.clone());
        (engine, clock, schema)
    }

    #[test]
    fn add_set_remove_lifecycle() {
        let (mut engine, clock, schema) = setup();
        let id = engine.add_item(Record::new(&schema).unwrap()).unwrap();
        let created = engine.meta_items().unwrap()[0].clone();
        assert_eq!(created, MetaItem::new(id, epoch()));

        clock.advance(5);
        engine.set_item(Record::new(&schema).unwrap().with_id(id)).unwrap();
        assert_eq!(engine.meta_items().unwrap()[0].last_update, clock.now());

        clock.advance(5);
        engine.remove_item(id).unwrap();
        let meta = &engine.meta_items().unwrap()[0];
        assert!(meta.deleted);
        assert_eq!(meta.last_update, clock.now());
        assert!(!engine.check_item_exists(id).unwrap());
    }

    #[test]
    fn failed_operations_leave_metadata_alone() {
        let (mut engine, _, schema) = setup();
        assert!(engine.remove_item(4).is_err());
        assert!(engine.set_item(Record::new(&schema).unwrap().with_id(4)).is_err());
        assert!(engine.meta_items().unwrap().is_empty());
    }

    #[test]
    fn clear_tombstones_everything() {
        let (mut engine, _, schema) = setup();
        engine
            .add_items(vec![Record::new(&schema).unwrap(), Record::new(&schema).unwrap()])
            .unwrap();
        engine.clear().unwrap();

        let metas = engine.meta_items().unwrap();
        assert_eq!(metas.len(), 2);
        assert!(metas.iter().all(|m| m.deleted));
        assert_eq!(engine.item_count().unwrap(), 0);
    }

    #[test]
    fn insert_revives_tombstone() {
        let (mut engine, clock, schema) = setup();
        engine.insert_item(Record::new(&schema).unwrap().with_id(2)).unwrap();
        engine.remove_item(2).unwrap();
        clock.advance(1);
        engine.insert_item(Record::new(&schema).unwrap().with_id(2)).unwrap();

        let metas = engine.meta_items().unwrap();
        assert_eq!(metas.len(), 1);
        assert!(!metas[0].deleted);
        assert_eq!(metas[0].last_update, clock.now());
    }
}
