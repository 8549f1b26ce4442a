//! Applies pulled update batches to a local mirror.

use chrono::NaiveDateTime;
use itemdb_core::{ContainerEngine, CoreResult};
use itemdb_sync_protocol::UpdateBatch;

/// What applying one batch changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyStats {
    /// Items unknown locally that were inserted.
    pub inserted: usize,
    /// Items that overwrote a local copy.
    pub overwritten: usize,
    /// Tombstones that removed a local copy.
    pub removed: usize,
    /// Tombstones for items the mirror never held.
    pub skipped: usize,
    /// Watermark for the next pull, once the last page is applied.
    pub watermark: NaiveDateTime,
}

impl ApplyStats {
    fn new(watermark: NaiveDateTime) -> Self {
        Self {
            inserted: 0,
            overwritten: 0,
            removed: 0,
            skipped: 0,
            watermark,
        }
    }

    /// Number of local changes made.
    pub fn changes(&self) -> usize {
        self.inserted + self.overwritten + self.removed
    }
}

/// Applies `batch` to `local`.
///
/// Tombstones remove the item if present. Live items are inserted when
/// unknown and overwrite the local copy otherwise, so applying the same
/// batch twice leaves the mirror as applying it once. The returned
/// watermark is the server time the batch was cut at.
pub fn apply_batch(local: &mut dyn ContainerEngine, batch: &UpdateBatch) -> CoreResult<ApplyStats> {
    let mut stats = ApplyStats::new(batch.server_time);
    for entry in &batch.entries {
        let id = entry.meta.id;
        let exists = local.check_item_exists(id)?;
        match (&entry.record, entry.meta.deleted) {
            (Some(record), false) => {
                let record = record.clone().with_id(id);
                if exists {
                    local.set_item(record)?;
                    stats.overwritten += 1;
                } else {
                    local.insert_item(record)?;
                    stats.inserted += 1;
                }
            }
            _ if exists => {
                local.remove_item(id)?;
                stats.removed += 1;
            }
            _ => stats.skipped += 1,
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemdb_core::{epoch, Attribute, MemoryEngine, MetaItem, Record, Schema};
    use itemdb_sync_protocol::BatchEntry;
    use std::sync::Arc;

    fn note() -> Arc<Schema> {
        Schema::builder("Note")
            .attribute(Attribute::string("text", ""))
            .build()
            .unwrap()
    }

    fn at(seconds: i64) -> NaiveDateTime {
        epoch() + chrono::Duration::seconds(seconds)
    }

    fn live(schema: &Arc<Schema>, id: i32, text: &str, seconds: i64) -> BatchEntry {
        BatchEntry {
            meta: MetaItem::new(id, at(seconds)),
            record: Some(Record::build(schema, [("text", text)]).unwrap().with_id(id)),
        }
    }

    fn tombstone(id: i32, seconds: i64) -> BatchEntry {
        let mut meta = MetaItem::new(id, at(seconds));
        meta.tombstone(at(seconds));
        BatchEntry { meta, record: None }
    }

    #[test]
    fn inserts_overwrites_and_removes() {
        let schema = note();
        let mut local = MemoryEngine::new(&schema);
        local.insert_item(Record::build(&schema, [("text", "old")]).unwrap().with_id(1)).unwrap();
        local.insert_item(Record::build(&schema, [("text", "gone")]).unwrap().with_id(2)).unwrap();

        let batch = UpdateBatch {
            entries: vec![
                live(&schema, 0, "new", 5),
                live(&schema, 1, "changed", 5),
                tombstone(2, 6),
                tombstone(9, 6),
            ],
            server_time: at(10),
            more: false,
        };
        let stats = apply_batch(&mut local, &batch).unwrap();

        assert_eq!((stats.inserted, stats.overwritten, stats.removed, stats.skipped), (1, 1, 1, 1));
        assert_eq!(stats.changes(), 3);
        assert_eq!(stats.watermark, at(10));
        assert_eq!(local.item_ids().unwrap(), vec![0, 1]);
        assert_eq!(local.get_item(1).unwrap().get_str("text"), Some("changed"));
    }

    #[test]
    fn replaying_a_batch_converges() {
        let schema = note();
        let batch = UpdateBatch {
            entries: vec![live(&schema, 3, "x", 1), tombstone(4, 2)],
            server_time: at(3),
            more: false,
        };

        let mut once = MemoryEngine::new(&schema);
        apply_batch(&mut once, &batch).unwrap();

        let mut twice = MemoryEngine::new(&schema);
        apply_batch(&mut twice, &batch).unwrap();
        let second = apply_batch(&mut twice, &batch).unwrap();

        assert_eq!(second.inserted, 0);
        assert_eq!(second.overwritten, 1);
        assert_eq!(once.all_items().unwrap(), twice.all_items().unwrap());
    }

    #[test]
    fn empty_batch_only_moves_watermark() {
        let schema = note();
        let mut local = MemoryEngine::new(&schema);
        let stats = apply_batch(
            &mut local,
            &UpdateBatch {
                entries: Vec::new(),
                server_time: at(42),
                more: false,
            },
        )
        .unwrap();
        assert_eq!(stats.changes(), 0);
        assert_eq!(stats.watermark, at(42));
    }
}
