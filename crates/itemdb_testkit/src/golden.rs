//! Golden wire vectors.
//!
//! `vectors/wire.json` pins the byte layout of records, metadata and
//! protocol frames. A change that alters any of them breaks compatibility
//! with existing files and peers, and shows up here first.

use serde::{Deserialize, Serialize};

const WIRE_VECTORS: &str = include_str!("../vectors/wire.json");

/// One named byte sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldenVector {
    /// Unique identifier.
    pub name: String,
    /// What the bytes encode.
    pub description: String,
    /// Expected bytes, hex-encoded.
    pub hex: String,
}

/// The vector file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorFile {
    /// Layout version.
    pub version: u32,
    /// Vectors in file order.
    pub vectors: Vec<GoldenVector>,
}

impl VectorFile {
    /// Looks a vector up by name.
    pub fn get(&self, name: &str) -> Option<&GoldenVector> {
        self.vectors.iter().find(|v| v.name == name)
    }
}

/// Parses the bundled wire vectors.
pub fn wire_vectors() -> VectorFile {
    serde_json::from_str(WIRE_VECTORS).expect("bundled wire vectors are valid JSON")
}

/// Panics unless `actual` equals the bundled vector `name`.
pub fn assert_golden(name: &str, actual: &[u8]) {
    let vectors = wire_vectors();
    let vector = vectors
        .get(name)
        .unwrap_or_else(|| panic!("no golden vector named {name}"));
    let actual = hex_encode(actual);
    assert_eq!(
        actual, vector.hex,
        "golden vector '{name}' ({}) changed",
        vector.description
    );
}

/// Lower-case hex encoding.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decodes lower- or upper-case hex.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Election;
    use chrono::NaiveDate;
    use itemdb_codec::DataStream;
    use itemdb_core::{ContainerId, MetaItem, Record};
    use itemdb_sync_protocol::{
        encode_frame, Call, ErrorCode, Opcode, RemoteError, Reply, Request, Response,
    };

    fn framed(payload: Vec<u8>) -> Vec<u8> {
        encode_frame(&payload).unwrap()
    }

    #[test]
    fn vector_names_are_unique() {
        let file = wire_vectors();
        let mut names: Vec<_> = file.vectors.iter().map(|v| v.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), file.vectors.len());
        assert_eq!(file.version, 1);
    }

    #[test]
    fn hex_helpers() {
        assert_eq!(hex_encode(&[0x00, 0xab, 0xff]), "00abff");
        assert_eq!(hex_decode("00ABff"), Some(vec![0x00, 0xab, 0xff]));
        assert_eq!(hex_decode("abc"), None);
        assert_eq!(hex_decode("zz"), None);
    }

    #[test]
    fn record_layouts() {
        let election = Election::new();
        let peter = election.participant("Peter").with_id(0);
        assert_golden("participant_peter", &peter.to_bytes().unwrap());

        let unsaved = Record::new(&election.participant).unwrap();
        assert_golden("participant_default", &unsaved.to_bytes().unwrap());

        let vote = election.vote(&[0, 1], Some(0)).with_id(0);
        assert_golden("vote_two_ranked", &vote.to_bytes().unwrap());
    }

    #[test]
    fn records_decode_from_vectors() {
        let election = Election::new();
        let bytes = hex_decode(&wire_vectors().get("participant_peter").unwrap().hex).unwrap();
        let mut stream = DataStream::from_slice(&bytes);
        let peter = Record::decode(&election.participant, &mut stream).unwrap();
        assert_eq!(peter.id(), 0);
        assert_eq!(peter.get_str("name"), Some("Peter"));
    }

    #[test]
    fn meta_layout() {
        let at = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(7, 8, 9)
            .unwrap();
        let mut meta = MetaItem::new(3, at);
        meta.tombstone(at);
        let mut stream = DataStream::new();
        meta.encode(&mut stream).unwrap();
        assert_golden("meta_tombstone", stream.as_slice());
    }

    #[test]
    fn request_frames() {
        let open = Request::new(1, Call::Open { password: "pw".into() });
        assert_golden("frame_open", &framed(open.encode().unwrap()));

        let update = Request::new(
            2,
            Call::Update {
                container: ContainerId::new(5),
                watermark: itemdb_core::epoch(),
                after: itemdb_core::UNASSIGNED_ID,
            },
        );
        assert_golden("frame_update", &framed(update.encode().unwrap()));

        let remove = Request::new(
            3,
            Call::Remove {
                container: ContainerId::new(5),
                connection: 0,
                id: 7,
            },
        );
        assert_golden("frame_remove", &framed(remove.encode().unwrap()));
    }

    #[test]
    fn response_frames() {
        let added = Response {
            correlation: 4,
            result: Ok(Reply::Added(4)),
        };
        assert_golden("frame_added", &framed(added.encode().unwrap()));

        let missing = Response {
            correlation: 5,
            result: Err(RemoteError {
                code: ErrorCode::ItemNotFound,
                detail: "item 8 does not exist in votes".into(),
                item_id: 8,
            }),
        };
        assert_golden("frame_not_found", &framed(missing.encode().unwrap()));
        assert_eq!(Opcode::Remove as u8, 0x14);
    }
}
