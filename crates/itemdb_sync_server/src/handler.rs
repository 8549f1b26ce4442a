//! Request handling against the authoritative database.

use itemdb_core::{ConnectionId, CoreError, CoreResult, ItemId, UserDatabase};
use itemdb_sync_protocol::{
    Call, ErrorCode, RemoteError, Reply, Request, RequestHeader, Response, UpdateBatch,
    MAX_BATCH_LEN,
};
use std::collections::{BTreeSet, HashMap};

/// Identifies one client socket.
pub type SessionId = u64;

/// Per-socket state.
#[derive(Debug, Default)]
struct Session {
    /// Set once the database password was verified.
    opened: bool,
    /// Connection ids allocated through this socket.
    connections: BTreeSet<ConnectionId>,
}

/// Executes decoded calls for every session.
///
/// The handler owns the [`UserDatabase`]; the server runs it on a single
/// dispatcher so calls from all sockets are serialised.
pub struct RequestHandler {
    db: UserDatabase,
    password: String,
    sessions: HashMap<SessionId, Session>,
}

impl RequestHandler {
    /// Creates a handler over an open database.
    pub fn new(db: UserDatabase, password: impl Into<String>) -> Self {
        Self {
            db,
            password: password.into(),
            sessions: HashMap::new(),
        }
    }

    /// The authoritative database.
    pub fn database(&self) -> &UserDatabase {
        &self.db
    }

    /// The authoritative database, mutable.
    pub fn database_mut(&mut self) -> &mut UserDatabase {
        &mut self.db
    }

    /// Gives the database back.
    pub fn into_database(self) -> UserDatabase {
        self.db
    }

    /// Number of sockets with state.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Decodes and executes one request payload.
    ///
    /// Undecodable arguments produce an internal error response carrying
    /// the request's correlation id.
    pub fn handle_frame(&mut self, session: SessionId, header: RequestHeader, args: &[u8]) -> Response {
        let db = &self.db;
        let decoded = Request::decode(header, args, |id| db.database().schema(id).cloned());
        let result = match decoded {
            Ok(request) => self
                .handle(session, request.call)
                .map_err(|err| RemoteError::from(&err)),
            Err(err) => {
                tracing::warn!(session, error = %err, "malformed request");
                Err(RemoteError::new(ErrorCode::Internal, err.to_string()))
            }
        };
        Response {
            correlation: header.correlation,
            result,
        }
    }

    /// Executes one call on behalf of `session`.
    pub fn handle(&mut self, session: SessionId, call: Call) -> CoreResult<Reply> {
        let opcode = call.opcode();
        let result = self.execute(session, call);
        if let Err(err) = &result {
            tracing::debug!(session, ?opcode, error = %err, "request failed");
        }
        result
    }

    fn execute(&mut self, session: SessionId, call: Call) -> CoreResult<Reply> {
        match call {
            Call::Open { password } => {
                if password != self.password {
                    return Err(CoreError::Authentication {
                        user: "database".into(),
                    });
                }
                self.sessions.entry(session).or_default().opened = true;
                Ok(Reply::Done)
            }
            Call::Close => {
                self.disconnect(session);
                Ok(Reply::Done)
            }
            Call::AddConnection { user, password } => {
                self.require_opened(session)?;
                let connection = self.db.add_connection(&user, &password)?;
                self.sessions
                    .entry(session)
                    .or_default()
                    .connections
                    .insert(connection);
                Ok(Reply::Connection(connection))
            }
            Call::CloseConnection { connection } => {
                self.require_owned(session, connection)?;
                self.db.close_connection(connection)?;
                if let Some(state) = self.sessions.get_mut(&session) {
                    state.connections.remove(&connection);
                }
                Ok(Reply::Done)
            }
            Call::Update {
                container,
                watermark,
                after,
            } => {
                self.require_opened(session)?;
                let db = self.db.database_mut();
                let now = db.current_date_time();
                let handle = db.container(container)?;
                let metas = handle.meta_items()?;
                let batch = UpdateBatch::collect(metas, watermark, after, now, MAX_BATCH_LEN, |id| {
                    handle.stored_item(id)
                })?;
                Ok(Reply::Batch(batch))
            }
            Call::Add {
                container,
                connection,
                record,
            } => {
                let user = self.require_owned(session, connection)?;
                let id = self.db.container(user, container)?.add_item(record)?;
                self.db.commit()?;
                Ok(Reply::Added(id))
            }
            Call::Insert {
                container,
                connection,
                record,
            } => {
                let user = self.require_owned(session, connection)?;
                self.db.container(user, container)?.insert_item(record)?;
                self.db.commit()?;
                Ok(Reply::Done)
            }
            Call::Set {
                container,
                connection,
                record,
            } => {
                let user = self.require_owned(session, connection)?;
                self.db.container(user, container)?.set_item(record)?;
                self.db.commit()?;
                Ok(Reply::Done)
            }
            Call::Remove {
                container,
                connection,
                id,
            } => {
                let user = self.require_owned(session, connection)?;
                self.db.container(user, container)?.remove_item(id)?;
                self.db.commit()?;
                Ok(Reply::Done)
            }
        }
    }

    /// Drops a session and releases its connections.
    pub fn disconnect(&mut self, session: SessionId) {
        let Some(state) = self.sessions.remove(&session) else {
            return;
        };
        for connection in state.connections {
            if let Err(err) = self.db.close_connection(connection) {
                tracing::debug!(session, connection, error = %err, "connection already closed");
            }
        }
    }

    fn require_opened(&self, session: SessionId) -> CoreResult<()> {
        match self.sessions.get(&session) {
            Some(state) if state.opened => Ok(()),
            _ => Err(CoreError::access("database not opened by this session")),
        }
    }

    fn require_owned(&self, session: SessionId, connection: ConnectionId) -> CoreResult<ItemId> {
        self.require_opened(session)?;
        let owned = self
            .sessions
            .get(&session)
            .is_some_and(|state| state.connections.contains(&connection));
        if !owned {
            return Err(CoreError::access(format!(
                "connection {connection} does not belong to this session"
            )));
        }
        self.db.connection_user(connection)
    }
}

impl std::fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandler")
            .field("db", &self.db)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemdb_core::{
        epoch, Attribute, Clock, ContainerId, DatabaseConfig, ManualClock, MemoryDatabase,
        PermissionKind, Record, Schema, UNASSIGNED_ID,
    };
    use itemdb_sync_protocol::encode_frame;
    use std::sync::Arc;

    fn note() -> Arc<Schema> {
        Schema::builder("Note")
            .attribute(Attribute::string("text", ""))
            .build()
            .unwrap()
    }

    struct Fixture {
        handler: RequestHandler,
        notes: ContainerId,
        schema: Arc<Schema>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(epoch()));
        let mut db = UserDatabase::new(
            MemoryDatabase::tracked(),
            DatabaseConfig::default().with_clock(clock.clone()),
        )
        .unwrap();
        let schema = note();
        let notes = db.register(schema.clone()).unwrap();
        db.open().unwrap();
        db.init_admin_group("admin", "secret", "admins").unwrap();
        let reader = db.add_user("reader", "r").unwrap();
        let group = db.add_group("readers").unwrap();
        db.add_membership(reader, group).unwrap();
        db.grant(group, notes, PermissionKind::Get).unwrap();
        Fixture {
            handler: RequestHandler::new(db, "pw"),
            notes,
            schema,
            clock,
        }
    }

    fn login(handler: &mut RequestHandler, session: SessionId, user: &str, password: &str) -> ConnectionId {
        handler
            .handle(session, Call::Open { password: "pw".into() })
            .unwrap();
        match handler
            .handle(
                session,
                Call::AddConnection {
                    user: user.into(),
                    password: password.into(),
                },
            )
            .unwrap()
        {
            Reply::Connection(id) => id,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wrong_password_rejected() {
        let mut f = fixture();
        let err = f
            .handler
            .handle(1, Call::Open { password: "nope".into() })
            .unwrap_err();
        assert!(matches!(err, CoreError::Authentication { .. }));
    }

    #[test]
    fn update_requires_open_session() {
        let mut f = fixture();
        let call = Call::Update {
            container: f.notes,
            watermark: epoch(),
            after: UNASSIGNED_ID,
        };
        assert!(matches!(
            f.handler.handle(1, call.clone()),
            Err(CoreError::Access { .. })
        ));
        f.handler.handle(1, Call::Open { password: "pw".into() }).unwrap();
        assert!(matches!(f.handler.handle(1, call), Ok(Reply::Batch(_))));
    }

    #[test]
    fn add_then_pull() {
        let mut f = fixture();
        let conn = login(&mut f.handler, 1, "admin", "secret");
        let record = Record::build(&f.schema, [("text", "hello")]).unwrap();
        let reply = f
            .handler
            .handle(
                1,
                Call::Add {
                    container: f.notes,
                    connection: conn,
                    record,
                },
            )
            .unwrap();
        assert_eq!(reply, Reply::Added(0));

        f.clock.advance(10);
        let Reply::Batch(batch) = f
            .handler
            .handle(
                1,
                Call::Update {
                    container: f.notes,
                    watermark: epoch(),
                    after: UNASSIGNED_ID,
                },
            )
            .unwrap()
        else {
            panic!("expected batch");
        };
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.entries[0].record.as_ref().unwrap().get_str("text"), Some("hello"));
        assert_eq!(batch.server_time, f.clock.now());
        assert!(!batch.more);
    }

    #[test]
    fn large_pull_is_paged() {
        let mut f = fixture();
        {
            let mut notes = f.handler.database_mut().database_mut().container(f.notes).unwrap();
            for n in 0..3000 {
                let text = format!("Participant number {n:05}");
                notes.add_item(Record::build(&f.schema, [("text", text.as_str())]).unwrap()).unwrap();
            }
        }
        f.handler.handle(1, Call::Open { password: "pw".into() }).unwrap();

        let (mut watermark, mut after) = (epoch(), UNASSIGNED_ID);
        let mut ids = Vec::new();
        let mut pages = 0;
        loop {
            let call = Call::Update {
                container: f.notes,
                watermark,
                after,
            };
            let Reply::Batch(batch) = f.handler.handle(1, call).unwrap() else {
                panic!("expected batch");
            };
            pages += 1;
            let response = Response {
                correlation: pages,
                result: Ok(Reply::Batch(batch.clone())),
            };
            assert!(encode_frame(&response.encode().unwrap()).is_ok());

            ids.extend(batch.entries.iter().map(|e| e.meta.id));
            match batch.resume_from() {
                Some((time, id)) => (watermark, after) = (time, id),
                None => break,
            }
        }
        assert!(pages > 1);
        assert_eq!(ids, (0..3000).collect::<Vec<_>>());
    }

    #[test]
    fn permission_gate_applies() {
        let mut f = fixture();
        let conn = login(&mut f.handler, 1, "reader", "r");
        let err = f
            .handler
            .handle(
                1,
                Call::Remove {
                    container: f.notes,
                    connection: conn,
                    id: 0,
                },
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Permission { .. }));
    }

    #[test]
    fn connections_are_bound_to_their_session() {
        let mut f = fixture();
        let conn = login(&mut f.handler, 1, "admin", "secret");
        f.handler.handle(2, Call::Open { password: "pw".into() }).unwrap();
        let err = f
            .handler
            .handle(
                2,
                Call::Remove {
                    container: f.notes,
                    connection: conn,
                    id: 0,
                },
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Access { .. }));
    }

    #[test]
    fn disconnect_releases_connections() {
        let mut f = fixture();
        let conn = login(&mut f.handler, 1, "admin", "secret");
        assert_eq!(f.handler.session_count(), 1);
        f.handler.disconnect(1);
        assert_eq!(f.handler.session_count(), 0);
        assert!(f.handler.database().connection_user(conn).is_err());
    }

    #[test]
    fn malformed_arguments_answer_with_error() {
        let mut f = fixture();
        let header = RequestHeader {
            correlation: 44,
            selector: 0xFF,
            opcode: 1,
        };
        let response = f.handler.handle_frame(1, header, &[0, 9]);
        assert_eq!(response.correlation, 44);
        assert_eq!(response.result.unwrap_err().code, ErrorCode::Internal);
    }
}
