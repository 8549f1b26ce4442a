//! # ItemDB Sync Protocol
//!
//! Framed request/response messages exchanged between a replica and the
//! authoritative server.
//!
//! This crate provides:
//! - Length-prefixed framing with incremental reassembly ([`FrameDecoder`])
//! - Database calls (`Open`, `Close`, `AddConnection`, `CloseConnection`)
//!   and container calls (`Update`, `Add`, `Insert`, `Set`, `Remove`)
//! - Responses correlated to requests by a 16-bit id
//! - [`UpdateBatch`], one page of the reply to a pull
//! - [`RemoteError`], mapping server failures to and from [`itemdb_core::CoreError`]
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Usage
//!
//! ```
//! use itemdb_sync_protocol::{encode_frame, Call, FrameDecoder, Message, Request};
//!
//! let payload = Request::new(1, Call::Open { password: "pw".into() })
//!     .encode()
//!     .unwrap();
//!
//! let mut decoder = FrameDecoder::default();
//! decoder.push(&encode_frame(&payload).unwrap());
//! let frame = decoder.next_frame().unwrap().unwrap();
//!
//! match Message::decode(&frame).unwrap() {
//!     Message::Request { header, .. } => assert_eq!(header.correlation, 1),
//!     Message::Response(_) => unreachable!(),
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod error;
mod frame;
mod message;
mod remote_error;

pub use batch::{BatchEntry, UpdateBatch, MAX_BATCH_LEN};
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{encode_frame, FrameDecoder, FRAME_HEADER_LEN, MAX_FRAME_LEN};
pub use message::{
    Call, Message, Opcode, RawResponse, Reply, Request, RequestHeader, Response,
    DATABASE_SELECTOR, STATUS_ERROR, STATUS_OK,
};
pub use remote_error::{ErrorCode, RemoteError};

#[cfg(test)]
mod tests {
    use super::*;
    use itemdb_core::{Attribute, Record, Schema};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn participant() -> Arc<Schema> {
        Schema::builder("Participant")
            .attribute(Attribute::string("name", "Participant name"))
            .build()
            .unwrap()
    }

    proptest! {
        #[test]
        fn framed_requests_survive_arbitrary_splits(
            names in prop::collection::vec("[a-zA-Z ]{0,40}", 1..8),
            chunk in 1usize..16,
        ) {
            let schema = participant();
            let mut wire = Vec::new();
            let mut sent = Vec::new();
            for (n, name) in names.iter().enumerate() {
                let record = Record::build(&schema, [("name", name.as_str())]).unwrap().with_id(n as i32);
                let request = Request::new(n as u16, Call::Set {
                    container: itemdb_core::ContainerId::new(0),
                    connection: 1,
                    record,
                });
                wire.extend(encode_frame(&request.encode().unwrap()).unwrap());
                sent.push(request);
            }

            let mut decoder = FrameDecoder::default();
            let mut received = Vec::new();
            for piece in wire.chunks(chunk) {
                decoder.push(piece);
                while let Some(frame) = decoder.next_frame().unwrap() {
                    if let Message::Request { header, args } = Message::decode(&frame).unwrap() {
                        received.push(Request::decode(header, &args, |_| Some(Arc::clone(&schema))).unwrap());
                    }
                }
            }
            prop_assert!(!decoder.is_mid_frame());
            prop_assert_eq!(received, sent);
        }

        #[test]
        fn truncated_payloads_never_panic(cut in 0usize..12) {
            let payload = Request::new(3, Call::AddConnection {
                user: "admin".into(),
                password: "pw".into(),
            }).encode().unwrap();
            let cut = cut.min(payload.len());
            if let Ok(Message::Request { header, args }) = Message::decode(&payload[..cut]) {
                let result = Request::decode(header, &args, |_| None);
                prop_assert!(result.is_err() || cut == payload.len());
            }
        }
    }
}
