//! # ItemDB Testkit
//!
//! Test utilities for ItemDB.
//!
//! This crate provides:
//! - Election fixtures (`Participant`, `VoteGroup`, `Vote`) and test
//!   databases on every backend
//! - Property-based test generators using proptest
//! - A conformance suite every storage backend must pass
//! - Golden wire vectors stored as JSON
//!
//! ## Usage
//!
//! ```
//! use itemdb_testkit::{with_election_db, Backend};
//!
//! with_election_db(Backend::Memory, |db, election, ids| {
//!     let peter = db
//!         .container(ids.participants)
//!         .unwrap()
//!         .add_item(election.participant("Peter"))
//!         .unwrap();
//!     assert_eq!(peter, 0);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod conformance;
pub mod fixtures;
pub mod generators;
pub mod golden;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::conformance::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::golden::*;
}

pub use fixtures::*;
pub use generators::*;
pub use golden::*;
