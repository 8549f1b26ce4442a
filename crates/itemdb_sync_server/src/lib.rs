//! # ItemDB Sync Server
//!
//! Authoritative TCP server for ItemDB replicas.
//!
//! This crate provides:
//! - A tokio listener with one task per client socket
//! - A single dispatcher owning the authoritative [`itemdb_core::UserDatabase`]
//! - Session state: database password verified, connection ids owned
//! - Permission-gated mutations and metadata-driven pulls
//!
//! # Architecture
//!
//! ```text
//! socket task ──┐
//! socket task ──┼── mpsc ── dispatcher (spawn_blocking) ── UserDatabase
//! socket task ──┘               │
//!                         oneshot per request
//! ```
//!
//! Socket tasks reassemble frames and queue requests; responses travel
//! back through a oneshot channel to the socket's writer task. Closing a
//! socket releases every connection id it allocated.
//!
//! # Protocol
//!
//! A client session runs:
//! 1. `Open` with the database password
//! 2. `AddConnection` with user credentials, receiving a connection id
//! 3. Container calls (`Add`, `Insert`, `Set`, `Remove`) naming that id
//! 4. `Update` pulls, which only need the opened session

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod config;
mod dispatcher;
mod error;
mod handler;
mod server;

pub use config::{ServerConfig, DEFAULT_PORT};
pub use error::{ServerError, ServerResult};
pub use handler::{RequestHandler, SessionId};
pub use server::SyncServer;
