//! Election fixtures and test database helpers.
//!
//! The election model is small but exercises every interesting path:
//! string defaults, booleans, and several references into two tables.

use itemdb_core::{
    Attribute, ContainerId, Database, DatabaseConfig, FileDatabase, ItemId, MemoryDatabase, Record,
    Reference, Schema, SqlConfig, SqlDatabase,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Names of the six ranked vote slots, best first.
pub const VOTE_SLOTS: [&str; 6] = ["vote1", "vote2", "vote3", "vote4", "vote5", "vote6"];

/// The election record types.
#[derive(Debug, Clone)]
pub struct Election {
    /// A candidate; `name` defaults to "Participant name".
    pub participant: Arc<Schema>,
    /// A group of voters; `name` defaults to "VoteGroup name".
    pub vote_group: Arc<Schema>,
    /// One ballot ranking up to six participants.
    pub vote: Arc<Schema>,
}

impl Election {
    /// Builds the three schemas.
    pub fn new() -> Self {
        let participant = Schema::builder("Participant")
            .attribute(Attribute::string("name", "Participant name"))
            .build()
            .expect("participant schema");
        let vote_group = Schema::builder("VoteGroup")
            .attribute(Attribute::string("name", "VoteGroup name"))
            .build()
            .expect("vote group schema");
        let mut vote = Schema::builder("Vote");
        for slot in VOTE_SLOTS {
            vote = vote.attribute(Attribute::reference(slot, &participant));
        }
        let vote = vote
            .attribute(Attribute::reference("vote_group", &vote_group))
            .attribute(Attribute::boolean("valid", true))
            .build()
            .expect("vote schema");
        Self {
            participant,
            vote_group,
            vote,
        }
    }

    /// Registers participants, vote groups and votes, in that order.
    pub fn register(&self, db: &mut Database) -> ElectionIds {
        ElectionIds {
            participants: db.register(Arc::clone(&self.participant)).expect("register participants"),
            vote_groups: db.register(Arc::clone(&self.vote_group)).expect("register vote groups"),
            votes: db.register(Arc::clone(&self.vote)).expect("register votes"),
        }
    }

    /// An unsaved participant.
    pub fn participant(&self, name: &str) -> Record {
        Record::build(&self.participant, [("name", name)]).expect("participant record")
    }

    /// An unsaved vote group.
    pub fn vote_group(&self, name: &str) -> Record {
        Record::build(&self.vote_group, [("name", name)]).expect("vote group record")
    }

    /// An unsaved vote ranking `ranked` (participant ids, best first).
    pub fn vote(&self, ranked: &[ItemId], group: Option<ItemId>) -> Record {
        let mut record = Record::new(&self.vote).expect("vote record");
        for (slot, id) in VOTE_SLOTS.iter().zip(ranked) {
            record.set(slot, Reference::Id(*id)).expect("vote slot");
        }
        if let Some(group) = group {
            record.set("vote_group", Reference::Id(group)).expect("vote group");
        }
        record
    }
}

impl Default for Election {
    fn default() -> Self {
        Self::new()
    }
}

/// Container ids of the registered election types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectionIds {
    /// `participants`.
    pub participants: ContainerId,
    /// `votegroups`.
    pub vote_groups: ContainerId,
    /// `votes`.
    pub votes: ContainerId,
}

/// Storage backend of a [`TestDatabase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// [`MemoryDatabase`] with metadata tracking.
    Memory,
    /// [`FileDatabase`] in a temporary directory.
    File,
    /// [`SqlDatabase`] in a temporary directory, tracking metadata.
    Sql,
}

impl Backend {
    /// Every backend.
    pub const ALL: [Backend; 3] = [Backend::Memory, Backend::File, Backend::Sql];
}

/// A database on a given backend with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// Which backend `db` runs on.
    pub backend: Backend,
    dir: TempDir,
}

impl TestDatabase {
    /// Creates a closed database on `backend` with default configuration.
    pub fn new(backend: Backend) -> Self {
        Self::with_config(backend, DatabaseConfig::default())
    }

    /// Creates a closed database on `backend`.
    pub fn with_config(backend: Backend, config: DatabaseConfig) -> Self {
        let dir = TempDir::new().expect("temp directory");
        let db = open_engine(backend, &dir.path().join(file_name(backend)), config);
        Self { db, backend, dir }
    }

    /// A fresh closed database on the same backend and file.
    pub fn reopen(&mut self, config: DatabaseConfig) {
        if self.db.is_open() {
            self.db.close().expect("close before reopen");
        }
        self.db = open_engine(self.backend, &self.path(), config);
    }

    /// Path of the backing file. In-memory databases never create it.
    pub fn path(&self) -> PathBuf {
        self.dir.path().join(file_name(self.backend))
    }
}

fn file_name(backend: Backend) -> &'static str {
    match backend {
        Backend::Memory => "unused",
        Backend::File => "snapshot.db",
        Backend::Sql => "store.sqlite",
    }
}

fn open_engine(backend: Backend, path: &std::path::Path, config: DatabaseConfig) -> Database {
    match backend {
        Backend::Memory => Database::new(MemoryDatabase::tracked(), config),
        Backend::File => Database::new(FileDatabase::open_path(path), config),
        Backend::Sql => Database::new(
            SqlDatabase::new(path, SqlConfig::new().with_track_meta(true)),
            config,
        ),
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

impl std::ops::DerefMut for TestDatabase {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.db
    }
}

/// Runs `f` with an open election database on `backend`.
pub fn with_election_db<F, R>(backend: Backend, f: F) -> R
where
    F: FnOnce(&mut Database, &Election, ElectionIds) -> R,
{
    let election = Election::new();
    let mut test_db = TestDatabase::new(backend);
    let ids = election.register(&mut test_db);
    test_db.open().expect("open election database");
    f(&mut test_db, &election, ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_defaults() {
        let election = Election::new();
        let p = Record::new(&election.participant).unwrap();
        assert_eq!(p.get_str("name"), Some("Participant name"));
        let v = Record::new(&election.vote).unwrap();
        assert_eq!(v.get_bool("valid"), Some(true));
        assert!(v.get_reference("vote3").unwrap().is_unset());
        assert_eq!(election.vote_group.table(), "votegroups");
    }

    #[test]
    fn ballots_resolve_on_every_backend() {
        for backend in Backend::ALL {
            with_election_db(backend, |db, election, ids| {
                let peter = db.container(ids.participants).unwrap().add_item(election.participant("Peter")).unwrap();
                let konrad = db.container(ids.participants).unwrap().add_item(election.participant("Konrad")).unwrap();
                let group = db.container(ids.vote_groups).unwrap().add_item(election.vote_group("1a")).unwrap();
                let ballot = db
                    .container(ids.votes)
                    .unwrap()
                    .add_item(election.vote(&[peter, konrad], Some(group)))
                    .unwrap();

                let ballot = db.container(ids.votes).unwrap().get_item(ballot).unwrap();
                let second = ballot.get_reference("vote2").unwrap().record().unwrap();
                assert_eq!(second.get_str("name"), Some("Konrad"), "{backend:?}");
                let group = ballot.get_reference("vote_group").unwrap().record().unwrap();
                assert_eq!(group.get_str("name"), Some("1a"), "{backend:?}");
            });
        }
    }

    #[test]
    fn reopen_keeps_file_backed_data() {
        for backend in [Backend::File, Backend::Sql] {
            let election = Election::new();
            let mut test_db = TestDatabase::new(backend);
            let ids = election.register(&mut test_db);
            test_db.open().unwrap();
            test_db.container(ids.participants).unwrap().add_item(election.participant("Peter")).unwrap();
            test_db.commit().unwrap();

            test_db.reopen(DatabaseConfig::default());
            let ids = election.register(&mut test_db);
            assert!(!test_db.open().unwrap());
            assert_eq!(test_db.container(ids.participants).unwrap().item_count().unwrap(), 1);
        }
    }
}
