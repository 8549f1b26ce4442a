//! # ItemDB Sync Engine
//!
//! Client side of ItemDB replication.
//!
//! This crate provides:
//! - [`SyncClient`], a TCP connection multiplexing requests by correlation id
//! - [`RemoteEngine`], a [`DatabaseEngine`](itemdb_core::DatabaseEngine)
//!   proxy that keeps a local mirror of an authoritative server
//! - [`apply_batch`], the pull semantics on their own
//! - [`BackgroundSync`], a thread pulling on a fixed interval
//!
//! ## Architecture
//!
//! ```text
//! Database ── RemoteContainer ──┬── local ContainerEngine (reads, mirror)
//!                               └── SyncTransport ── SyncClient ── TCP
//! ```
//!
//! Mutations are sent to the server first and mirrored locally once the
//! server accepts them. Reads only touch the mirror. Each container keeps a
//! watermark; `update` asks for every item changed at or after it, applies
//! the batch, and moves the watermark to the server's time.
//!
//! ## Key Invariants
//!
//! - The server is authoritative; a rejected mutation leaves the mirror as is
//! - Replaying a pull batch converges to the same state
//! - Removing an item the mirror never held is a no-op
//! - A reply arriving after its request timed out is dropped
//!
//! ## Usage
//!
//! ```no_run
//! use itemdb_core::{MemoryDatabase, UserDatabase, DatabaseConfig};
//! use itemdb_sync_engine::{RemoteEngine, SyncConfig};
//!
//! let config = SyncConfig::new("127.0.0.1:7345".parse().unwrap())
//!     .with_database_password("db")
//!     .with_credentials("admin", "secret");
//! let engine = RemoteEngine::connect(MemoryDatabase::new(), &config).unwrap();
//! let mut db = UserDatabase::new(engine, DatabaseConfig::default()).unwrap();
//! db.open().unwrap();
//! db.database_mut().update_all().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod background;
mod client;
mod config;
mod error;
mod remote;
mod transport;

pub use applier::{apply_batch, ApplyStats};
pub use background::{BackgroundSync, Pull};
pub use client::SyncClient;
pub use config::{RetryConfig, SyncConfig, DEFAULT_REQUEST_TIMEOUT};
pub use error::{SyncError, SyncResult};
pub use remote::{RemoteContainer, RemoteEngine};
pub use transport::SyncTransport;
