//! # ItemDB Storage
//!
//! Snapshot storage backends for ItemDB.
//!
//! A snapshot backend holds exactly one opaque byte image: the whole
//! persisted database. It is read once when a store opens and replaced
//! wholesale when the store closes. Backends do not interpret the bytes.
//!
//! ## Design Principles
//!
//! - One snapshot per backend, loaded and replaced as a unit
//! - No incremental append, no write-ahead log
//! - A missing snapshot is distinct from an empty one
//! - Must be `Send + Sync`
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral stores
//! - [`FileBackend`] - For persistent storage in a single file
//!
//! ## Example
//!
//! ```rust
//! use itemdb_storage::{SnapshotBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! assert!(backend.load().unwrap().is_none());
//!
//! backend.replace(b"snapshot").unwrap();
//! assert_eq!(backend.load().unwrap().as_deref(), Some(&b"snapshot"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::SnapshotBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
