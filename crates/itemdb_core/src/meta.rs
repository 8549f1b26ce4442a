//! Per-item replication metadata.

use crate::error::CoreResult;
use crate::types::ItemId;
use chrono::NaiveDateTime;
use itemdb_codec::DataStream;

/// Companion record kept for every item a tracking engine has stored.
///
/// Removal flips the entry to a tombstone instead of dropping it, so a
/// replica pulling changes learns that the id was deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaItem {
    /// Item id.
    pub id: ItemId,
    /// Time of the last add, insert, set or remove.
    pub last_update: NaiveDateTime,
    /// True once the item has been removed.
    pub deleted: bool,
}

impl MetaItem {
    /// Metadata for an item stored at `now`.
    #[must_use]
    pub fn new(id: ItemId, now: NaiveDateTime) -> Self {
        Self {
            id,
            last_update: now,
            deleted: false,
        }
    }

    /// Marks the item as (re)written at `now`.
    pub fn touch(&mut self, now: NaiveDateTime) {
        self.last_update = now;
        self.deleted = false;
    }

    /// Marks the item as removed at `now`.
    pub fn tombstone(&mut self, now: NaiveDateTime) {
        self.last_update = now;
        self.deleted = true;
    }

    /// Writes the fields in attribute-name order: deleted, id, lastUpdate.
    pub fn encode(&self, stream: &mut DataStream) -> CoreResult<()> {
        stream.write_bool(self.deleted);
        stream.write_i32(self.id);
        stream.write_date_time(&self.last_update)?;
        Ok(())
    }

    /// Reads metadata written by [`encode`](Self::encode).
    pub fn decode(stream: &mut DataStream) -> CoreResult<Self> {
        let deleted = stream.read_bool()?;
        let id = stream.read_i32()?;
        let last_update = stream.read_date_time()?;
        Ok(Self {
            id,
            last_update,
            deleted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, second)
            .unwrap()
    }

    #[test]
    fn tombstone_then_touch() {
        let mut meta = MetaItem::new(3, at(0));
        meta.tombstone(at(5));
        assert!(meta.deleted);
        assert_eq!(meta.last_update, at(5));

        meta.touch(at(9));
        assert!(!meta.deleted);
        assert_eq!(meta.last_update, at(9));
    }

    #[test]
    fn wire_layout() {
        let mut meta = MetaItem::new(258, at(59));
        meta.tombstone(at(59));
        let mut stream = DataStream::new();
        meta.encode(&mut stream).unwrap();
        assert_eq!(stream.as_slice(), &[1, 0, 0, 1, 2, 0x07, 0xe8, 5, 1, 12, 0, 59]);
        assert_eq!(MetaItem::decode(&mut stream).unwrap(), meta);
    }
}
