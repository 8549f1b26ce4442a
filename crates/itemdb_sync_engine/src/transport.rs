//! Transport abstraction between remote containers and the server.

use crate::error::{SyncError, SyncResult};
use itemdb_core::{ConnectionId, ContainerId, ItemId, Record, Schema};
use itemdb_sync_protocol::{Call, Reply, UpdateBatch};
use chrono::NaiveDateTime;
use std::sync::Arc;

/// Sends calls to the authoritative server and waits for the replies.
///
/// [`SyncClient`](crate::SyncClient) implements this over TCP; tests can
/// substitute an in-process implementation. The provided methods wrap
/// [`call`](Self::call) with typed replies.
pub trait SyncTransport: Send + Sync {
    /// Sends one call and waits for its reply. Update calls pass the
    /// container's record type so the batch can be decoded.
    fn call(&self, call: Call, schema: Option<&Arc<Schema>>) -> SyncResult<Reply>;

    /// Checks if the transport can still carry calls.
    fn is_connected(&self) -> bool;

    /// Closes the transport. Pending and later calls fail.
    fn close(&self);

    /// Opens the remote database.
    fn open_database(&self, password: &str) -> SyncResult<()> {
        expect_done(self.call(
            Call::Open {
                password: password.to_owned(),
            },
            None,
        )?)
    }

    /// Closes the remote database session.
    fn close_database(&self) -> SyncResult<()> {
        expect_done(self.call(Call::Close, None)?)
    }

    /// Logs a user in.
    fn add_connection(&self, user: &str, password: &str) -> SyncResult<ConnectionId> {
        match self.call(
            Call::AddConnection {
                user: user.to_owned(),
                password: password.to_owned(),
            },
            None,
        )? {
            Reply::Connection(id) => Ok(id),
            other => Err(unexpected(&other)),
        }
    }

    /// Logs a connection out.
    fn close_connection(&self, connection: ConnectionId) -> SyncResult<()> {
        expect_done(self.call(Call::CloseConnection { connection }, None)?)
    }

    /// Pulls one page of changes after the cursor `(watermark, after)`.
    fn pull(
        &self,
        container: ContainerId,
        schema: &Arc<Schema>,
        watermark: NaiveDateTime,
        after: ItemId,
    ) -> SyncResult<UpdateBatch> {
        match self.call(
            Call::Update {
                container,
                watermark,
                after,
            },
            Some(schema),
        )? {
            Reply::Batch(batch) => Ok(batch),
            other => Err(unexpected(&other)),
        }
    }

    /// Adds a record; the server assigns the id.
    fn add(&self, container: ContainerId, connection: ConnectionId, record: Record) -> SyncResult<ItemId> {
        match self.call(
            Call::Add {
                container,
                connection,
                record,
            },
            None,
        )? {
            Reply::Added(id) => Ok(id),
            other => Err(unexpected(&other)),
        }
    }

    /// Inserts a record under its own id.
    fn insert(&self, container: ContainerId, connection: ConnectionId, record: Record) -> SyncResult<()> {
        expect_done(self.call(
            Call::Insert {
                container,
                connection,
                record,
            },
            None,
        )?)
    }

    /// Overwrites a record.
    fn set(&self, container: ContainerId, connection: ConnectionId, record: Record) -> SyncResult<()> {
        expect_done(self.call(
            Call::Set {
                container,
                connection,
                record,
            },
            None,
        )?)
    }

    /// Removes a record.
    fn remove(&self, container: ContainerId, connection: ConnectionId, id: ItemId) -> SyncResult<()> {
        expect_done(self.call(
            Call::Remove {
                container,
                connection,
                id,
            },
            None,
        )?)
    }
}

fn expect_done(reply: Reply) -> SyncResult<()> {
    match reply {
        Reply::Done => Ok(()),
        other => Err(unexpected(&other)),
    }
}

fn unexpected(reply: &Reply) -> SyncError {
    SyncError::UnexpectedReply(format!("{reply:?}"))
}
