//! Update batches returned by pull requests.
//!
//! A pull is answered in pages. Each page holds as many changes, ordered by
//! `(last_update, id)`, as fit one response frame; `more` tells the client
//! to ask again from [`UpdateBatch::resume_from`].

use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::MAX_FRAME_LEN;
use chrono::NaiveDateTime;
use itemdb_codec::DataStream;
use itemdb_core::{CoreError, CoreResult, ItemId, MetaItem, Record, Schema};
use std::sync::Arc;

/// Largest encoded batch that fits a response frame.
///
/// The response header ahead of it is flag(1), correlation(2), status(1).
pub const MAX_BATCH_LEN: usize = MAX_FRAME_LEN - 4;

// deleted(1) + id(4) + lastUpdate(7)
const META_LEN: usize = 12;
// count(2) + server time(7) + more(1)
const BATCH_OVERHEAD: usize = 10;

/// One changed item: its metadata and, unless deleted, its current record.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    /// Replication metadata.
    pub meta: MetaItem,
    /// Current record, absent for tombstones.
    pub record: Option<Record>,
}

/// One page of items changed since a watermark, plus the server time the
/// page was cut.
///
/// Once the last page (`more == false`) is applied the client stores its
/// `server_time` as the next watermark.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateBatch {
    /// Changed items ordered by update time, then id.
    pub entries: Vec<BatchEntry>,
    /// Server time at collection.
    pub server_time: NaiveDateTime,
    /// True if changes past the last entry were left for another page.
    pub more: bool,
}

impl UpdateBatch {
    /// Selects the items updated after the cursor `(watermark, after)`:
    /// everything newer than `watermark`, plus the items stamped exactly
    /// `watermark` whose id is greater than `after`. Pass
    /// [`UNASSIGNED_ID`](itemdb_core::UNASSIGNED_ID) as `after` to include
    /// the whole second.
    ///
    /// Entries are taken in `(last_update, id)` order until the encoded
    /// batch would exceed `limit` bytes. `fetch` loads the record of a live
    /// item.
    ///
    /// # Errors
    ///
    /// Fails if `fetch` fails, or if the first pending item alone does not
    /// fit in `limit`.
    pub fn collect<F>(
        metas: Vec<MetaItem>,
        watermark: NaiveDateTime,
        after: ItemId,
        server_time: NaiveDateTime,
        limit: usize,
        mut fetch: F,
    ) -> CoreResult<Self>
    where
        F: FnMut(ItemId) -> CoreResult<Record>,
    {
        let mut pending: Vec<MetaItem> = metas
            .into_iter()
            .filter(|m| m.last_update > watermark || (m.last_update == watermark && m.id > after))
            .collect();
        pending.sort_by_key(|m| (m.last_update, m.id));

        let mut entries = Vec::new();
        let mut size = BATCH_OVERHEAD;
        let mut more = false;
        for meta in pending {
            let record = if meta.deleted {
                None
            } else {
                Some(fetch(meta.id)?)
            };
            let len = META_LEN + record.as_ref().map_or(Ok(0), |r| r.to_bytes().map(|b| b.len()))?;
            if size + len > limit || entries.len() == usize::from(u16::MAX) {
                if entries.is_empty() {
                    return Err(CoreError::invalid_operation(format!(
                        "item {} does not fit in an update batch",
                        meta.id
                    )));
                }
                more = true;
                break;
            }
            size += len;
            entries.push(BatchEntry { meta, record });
        }
        Ok(Self {
            entries,
            server_time,
            more,
        })
    }

    /// The cursor to pull the next page from, if there is one.
    #[must_use]
    pub fn resume_from(&self) -> Option<(NaiveDateTime, ItemId)> {
        if !self.more {
            return None;
        }
        self.entries.last().map(|e| (e.meta.last_update, e.meta.id))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes count, entries, server time, then the `more` flag.
    pub fn encode(&self, stream: &mut DataStream) -> ProtocolResult<()> {
        let count = u16::try_from(self.entries.len())
            .map_err(|_| ProtocolError::BatchTooLarge(self.entries.len()))?;
        stream.write_u16(count);
        for entry in &self.entries {
            entry.meta.encode(stream)?;
            if let (false, Some(record)) = (entry.meta.deleted, &entry.record) {
                record.encode(stream)?;
            }
        }
        stream.write_date_time(&self.server_time)?;
        stream.write_bool(self.more);
        Ok(())
    }

    /// Reads a batch whose records are of type `schema`.
    pub fn decode(schema: &Arc<Schema>, stream: &mut DataStream) -> ProtocolResult<Self> {
        let count = stream.read_u16()?;
        let mut entries = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let meta = MetaItem::decode(stream)?;
            let record = if meta.deleted {
                None
            } else {
                Some(Record::decode(schema, stream)?)
            };
            entries.push(BatchEntry { meta, record });
        }
        let server_time = stream.read_date_time()?;
        let more = stream.read_bool()?;
        Ok(Self {
            entries,
            server_time,
            more,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use itemdb_core::{epoch, Attribute, UNASSIGNED_ID};

    fn at(second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, second)
            .unwrap()
    }

    fn participant() -> Arc<Schema> {
        Schema::builder("Participant")
            .attribute(Attribute::string("name", "Participant name"))
            .build()
            .unwrap()
    }

    #[test]
    fn collect_filters_by_watermark() {
        let schema = participant();
        let metas = vec![
            MetaItem::new(0, at(1)),
            MetaItem::new(1, at(5)),
            MetaItem {
                id: 2,
                last_update: at(6),
                deleted: true,
            },
        ];
        let batch = UpdateBatch::collect(metas, at(5), UNASSIGNED_ID, at(9), MAX_BATCH_LEN, |id| {
            Ok(Record::new(&schema)?.with_id(id))
        })
        .unwrap();

        let ids: Vec<_> = batch.entries.iter().map(|e| e.meta.id).collect();
        assert_eq!(ids, [1, 2]);
        assert!(batch.entries[0].record.is_some());
        assert!(batch.entries[1].record.is_none());
        assert_eq!(batch.server_time, at(9));
        assert!(!batch.more);
        assert_eq!(batch.resume_from(), None);
    }

    #[test]
    fn collect_propagates_fetch_failure() {
        let metas = vec![MetaItem::new(3, at(1))];
        let err = UpdateBatch::collect(metas, epoch(), UNASSIGNED_ID, at(2), MAX_BATCH_LEN, |id| {
            Err(CoreError::item_not_found("participants", id))
        })
        .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn tombstones_carry_no_record() {
        let schema = participant();
        let batch = UpdateBatch {
            entries: vec![
                BatchEntry {
                    meta: MetaItem::new(1, at(1)),
                    record: Some(
                        Record::build(&schema, [("name", "Al")]).unwrap().with_id(1),
                    ),
                },
                BatchEntry {
                    meta: MetaItem {
                        id: 2,
                        last_update: at(2),
                        deleted: true,
                    },
                    record: None,
                },
            ],
            server_time: at(3),
            more: true,
        };

        let mut stream = DataStream::new();
        batch.encode(&mut stream).unwrap();
        // count + meta(1+4+7) + record(4+2+2) + meta(1+4+7) + time(7) + more(1)
        assert_eq!(stream.len(), 2 + 12 + 8 + 12 + 7 + 1);

        let decoded = UpdateBatch::decode(&schema, &mut stream).unwrap();
        assert_eq!(decoded, batch);
        assert!(stream.is_empty());
    }

    #[test]
    fn empty_batch_is_count_and_time() {
        let batch = UpdateBatch {
            entries: Vec::new(),
            server_time: epoch(),
            more: false,
        };
        let mut stream = DataStream::new();
        batch.encode(&mut stream).unwrap();
        assert_eq!(stream.len(), 2 + 7 + 1);
        assert!(UpdateBatch::decode(&participant(), &mut stream)
            .unwrap()
            .is_empty());
    }

    fn named(schema: &Arc<Schema>, id: ItemId) -> CoreResult<Record> {
        let name = format!("Participant number {id:05}");
        Ok(Record::build(schema, [("name", name.as_str())])?.with_id(id))
    }

    #[test]
    fn collect_orders_by_time_then_id() {
        let schema = participant();
        let metas = vec![
            MetaItem::new(4, at(2)),
            MetaItem::new(9, at(1)),
            MetaItem::new(2, at(2)),
            MetaItem::new(7, at(1)),
        ];
        let batch =
            UpdateBatch::collect(metas, at(1), 7, at(3), MAX_BATCH_LEN, |id| named(&schema, id)).unwrap();
        let cursor: Vec<_> = batch.entries.iter().map(|e| (e.meta.last_update, e.meta.id)).collect();
        assert_eq!(cursor, [(at(1), 9), (at(2), 2), (at(2), 4)]);
    }

    #[test]
    fn pages_split_within_one_second() {
        let schema = participant();
        let metas: Vec<_> = (0..3000).map(|id| MetaItem::new(id, at(0))).collect();

        let mut seen = Vec::new();
        let (mut watermark, mut after) = (at(0), UNASSIGNED_ID);
        let mut pages = 0;
        loop {
            let batch = UpdateBatch::collect(metas.clone(), watermark, after, at(1), MAX_BATCH_LEN, |id| {
                named(&schema, id)
            })
            .unwrap();
            pages += 1;

            let mut stream = DataStream::new();
            batch.encode(&mut stream).unwrap();
            assert!(stream.len() <= MAX_BATCH_LEN);

            seen.extend(batch.entries.iter().map(|e| e.meta.id));
            match batch.resume_from() {
                Some((time, id)) => (watermark, after) = (time, id),
                None => break,
            }
        }
        assert!(pages > 1);
        assert_eq!(seen, (0..3000).collect::<Vec<_>>());
    }

    #[test]
    fn page_fills_to_the_limit() {
        let schema = participant();
        let metas: Vec<_> = (0..3).map(|id| MetaItem::new(id, at(0))).collect();
        let entry = META_LEN + named(&schema, 0).unwrap().to_bytes().unwrap().len();

        let limit = BATCH_OVERHEAD + 2 * entry;
        let batch =
            UpdateBatch::collect(metas, epoch(), UNASSIGNED_ID, at(1), limit, |id| named(&schema, id)).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.resume_from(), Some((at(0), 1)));

        let mut stream = DataStream::new();
        batch.encode(&mut stream).unwrap();
        assert_eq!(stream.len(), BATCH_OVERHEAD + 2 * entry);
    }

    #[test]
    fn item_larger_than_a_page_is_refused() {
        let schema = participant();
        let metas = vec![MetaItem::new(5, at(0))];
        let err =
            UpdateBatch::collect(metas, epoch(), UNASSIGNED_ID, at(1), 20, |id| named(&schema, id)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }), "{err}");
    }
}
