//! # ItemDB Core
//!
//! Schema model, container engines and storage backends for ItemDB.
//!
//! This crate provides:
//! - Record types declared with an explicit [`SchemaBuilder`]
//! - [`Record`] instances with defaults, type checks and validation hooks
//! - The [`ContainerEngine`] / [`DatabaseEngine`] contract and three
//!   backends: in-memory, snapshot file and SQLite
//! - The [`Database`] facade with reference resolution and [`Event`]s
//! - Replication metadata ([`MetaItem`]) with tombstones
//! - Group-based access control through [`UserDatabase`]
//!
//! ## Usage
//!
//! ```
//! use itemdb_core::{Attribute, Database, Record, Reference, Schema};
//!
//! let participant = Schema::builder("Participant")
//!     .attribute(Attribute::string("name", "Participant name"))
//!     .build()
//!     .unwrap();
//! let vote = Schema::builder("Vote")
//!     .attribute(Attribute::reference("vote1", &participant))
//!     .build()
//!     .unwrap();
//!
//! let mut db = Database::in_memory();
//! let participants = db.register(participant.clone()).unwrap();
//! let votes = db.register(vote.clone()).unwrap();
//! db.open().unwrap();
//!
//! let peter = Record::build(&participant, [("name", "Peter")]).unwrap();
//! let peter_id = db.container(participants).unwrap().add_item(peter).unwrap();
//!
//! let ballot = Record::build(&vote, [("vote1", Reference::Id(peter_id))]).unwrap();
//! let ballot_id = db.container(votes).unwrap().add_item(ballot).unwrap();
//!
//! let ballot = db.container(votes).unwrap().get_item(ballot_id).unwrap();
//! let chosen = ballot.get_reference("vote1").unwrap().record().unwrap();
//! assert_eq!(chosen.get_str("name"), Some("Peter"));
//! ```
//!
//! ## Engines
//!
//! | engine | persistence | metadata |
//! |---|---|---|
//! | [`MemoryDatabase`] | none | with [`MemoryDatabase::tracked`] |
//! | [`FileDatabase`] | whole snapshot on close | always |
//! | [`SqlDatabase`] | SQLite, autocommit | with [`SqlConfig::track_meta`] |

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod access;
mod clock;
mod config;
mod container;
mod database;
mod engine;
mod error;
mod event;
mod meta;
mod record;
mod schema;
mod types;
mod value;

pub use access::{
    AclSchemas, ConnectionId, GuardedContainer, PermissionKind, UserDatabase, GROUPS, MEMBERSHIPS,
    PERMISSIONS, PERMISSION_ASSIGNMENTS, USERS,
};
pub use clock::{epoch, Clock, ManualClock, SystemClock};
pub use config::{DatabaseConfig, DEFAULT_MAX_REFERENCE_DEPTH};
pub use container::ContainerHandle;
pub use database::Database;
pub use engine::{
    column_type, ContainerEngine, ContainerSpec, DatabaseEngine, FileContainer, FileDatabase,
    MemoryDatabase, MemoryEngine, SqlConfig, SqlContainer, SqlDatabase, TrackedEngine,
    DEFAULT_BUSY_TIMEOUT, SQL_DATE_TIME_FORMAT,
};
pub use error::{CoreError, CoreResult, NetworkErrorKind};
pub use event::{Event, Listener, ListenerId};
pub use meta::MetaItem;
pub use record::Record;
pub use schema::{Attribute, AttributeKind, Schema, SchemaBuilder, Validator, ID_ATTRIBUTE};
pub use types::{ContainerId, ItemId, UNASSIGNED_ID};
pub use value::{Reference, Value};
