//! # ItemDB Codec
//!
//! Binary wire codec shared by ItemDB file persistence and the sync protocol.
//!
//! ## Encoding Rules
//!
//! - Signed and unsigned 8/16/32/64-bit integers, big-endian, fixed width
//! - Booleans as a single `0`/`1` byte
//! - Single and double floats as big-endian IEEE 754
//! - Blobs with a 16-bit big-endian length prefix (max 65535 bytes)
//! - Strings as UTF-8 blobs
//! - Date-times as a 16-bit year then month, day, hour, minute, second bytes
//!
//! Bytes produced for a file snapshot and bytes sent over the network are
//! the same encoding, so either side can decode the other's output.
//!
//! ## Usage
//!
//! ```
//! use itemdb_codec::DataStream;
//!
//! let mut stream = DataStream::new();
//! stream.write_u16(2);
//! stream.write_bool(true);
//!
//! let mut incoming = DataStream::from_slice(stream.as_slice());
//! assert_eq!(incoming.read_u16().unwrap(), 2);
//! assert!(incoming.read_bool().unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod stream;

pub use error::{CodecError, CodecResult};
pub use stream::{DataStream, DATE_TIME_LEN, MAX_BLOB_LEN};
