//! Proxy engines that mirror an authoritative server.
//!
//! [`RemoteEngine`] wraps any local [`DatabaseEngine`]. Mutations go to the
//! server first and are applied to the local mirror only once the server
//! accepted them. Reads never leave the process; `update` pulls whatever
//! changed on the server since the container's watermark.

use crate::applier::apply_batch;
use crate::client::SyncClient;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::transport::SyncTransport;
use chrono::NaiveDateTime;
use itemdb_core::{
    epoch, ConnectionId, ContainerEngine, ContainerId, ContainerSpec, CoreError, CoreResult,
    DatabaseEngine, ItemId, MetaItem, Record, Schema, UNASSIGNED_ID,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Connection id shared by the engine and all of its containers.
type SharedConnection = Arc<Mutex<Option<ConnectionId>>>;

/// A database engine whose containers mirror a sync server.
///
/// Register the same record types in the same order as the server so
/// container ids line up. Wrapping the client database in a
/// [`UserDatabase`](itemdb_core::UserDatabase) does that for the
/// access-control types.
pub struct RemoteEngine<E> {
    local: E,
    transport: Arc<dyn SyncTransport>,
    database_password: String,
    user: String,
    password: String,
    connection: SharedConnection,
}

impl<E: DatabaseEngine> RemoteEngine<E> {
    /// Wraps `local`, talking to the server through `transport` with the
    /// credentials in `config`.
    pub fn new(local: E, transport: Arc<dyn SyncTransport>, config: &SyncConfig) -> Self {
        Self {
            local,
            transport,
            database_password: config.database_password.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            connection: Arc::new(Mutex::new(None)),
        }
    }

    /// Connects a [`SyncClient`] to `config.server_addr` and wraps `local`.
    pub fn connect(local: E, config: &SyncConfig) -> SyncResult<Self> {
        let client = SyncClient::connect(config)?;
        Ok(Self::new(local, Arc::new(client), config))
    }

    /// The transport shared with the containers.
    pub fn transport(&self) -> &Arc<dyn SyncTransport> {
        &self.transport
    }

    /// Connection id while open.
    pub fn connection(&self) -> Option<ConnectionId> {
        *self.connection.lock()
    }

    /// The local mirror engine.
    pub fn local(&self) -> &E {
        &self.local
    }

    fn log_in(&self) -> SyncResult<ConnectionId> {
        self.transport.open_database(&self.database_password)?;
        let connection = self.transport.add_connection(&self.user, &self.password)?;
        tracing::info!(user = %self.user, connection, "logged in to sync server");
        Ok(connection)
    }
}

impl<E: DatabaseEngine> DatabaseEngine for RemoteEngine<E> {
    fn open(&mut self) -> CoreResult<bool> {
        let connection = self.log_in().map_err(|err| err.into_core_error("database"))?;
        *self.connection.lock() = Some(connection);
        self.local.open()
    }

    fn close(&mut self) -> CoreResult<()> {
        if let Some(connection) = self.connection.lock().take() {
            let logged_out = self
                .transport
                .close_connection(connection)
                .and_then(|()| self.transport.close_database());
            if let Err(err) = logged_out {
                tracing::warn!(connection, error = %err, "logging out of sync server failed");
            }
        }
        self.local.close()
    }

    fn commit(&mut self) -> CoreResult<()> {
        self.local.commit()
    }

    fn create_container_engine(&mut self, spec: &ContainerSpec) -> CoreResult<Box<dyn ContainerEngine>> {
        let local = self.local.create_container_engine(spec)?;
        Ok(Box::new(RemoteContainer {
            local,
            transport: Arc::clone(&self.transport),
            container: spec.id,
            schema: Arc::clone(&spec.schema),
            connection: Arc::clone(&self.connection),
            watermark: epoch(),
        }))
    }
}

impl<E> std::fmt::Debug for RemoteEngine<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEngine")
            .field("user", &self.user)
            .field("connection", &*self.connection.lock())
            .field("connected", &self.transport.is_connected())
            .finish_non_exhaustive()
    }
}

/// A container that forwards mutations to the server and reads its mirror.
pub struct RemoteContainer {
    local: Box<dyn ContainerEngine>,
    transport: Arc<dyn SyncTransport>,
    container: ContainerId,
    schema: Arc<Schema>,
    connection: SharedConnection,
    watermark: NaiveDateTime,
}

impl RemoteContainer {
    /// Timestamp the next pull starts from.
    pub fn watermark(&self) -> NaiveDateTime {
        self.watermark
    }

    fn connection(&self) -> CoreResult<ConnectionId> {
        (*self.connection.lock()).ok_or_else(|| CoreError::access("not logged in to sync server"))
    }

    fn remote<T>(&self, result: SyncResult<T>) -> CoreResult<T> {
        result.map_err(|err| err.into_core_error(self.schema.table()))
    }

    /// Stores `item` locally, overwriting an existing copy.
    fn mirror(&mut self, item: Record) -> CoreResult<()> {
        if self.local.check_item_exists(item.id())? {
            self.local.set_item(item)
        } else {
            self.local.insert_item(item)
        }
    }
}

impl ContainerEngine for RemoteContainer {
    fn add_item(&mut self, item: Record) -> CoreResult<ItemId> {
        let connection = self.connection()?;
        let id = self.remote(self.transport.add(self.container, connection, item.clone()))?;
        self.mirror(item.with_id(id))?;
        Ok(id)
    }

    fn insert_item(&mut self, item: Record) -> CoreResult<()> {
        let connection = self.connection()?;
        self.remote(self.transport.insert(self.container, connection, item.clone()))?;
        self.mirror(item)
    }

    fn get_item(&self, id: ItemId) -> CoreResult<Record> {
        self.local.get_item(id)
    }

    fn set_item(&mut self, item: Record) -> CoreResult<()> {
        let connection = self.connection()?;
        self.remote(self.transport.set(self.container, connection, item.clone()))?;
        self.mirror(item)
    }

    fn remove_item(&mut self, id: ItemId) -> CoreResult<()> {
        let connection = self.connection()?;
        self.remote(self.transport.remove(self.container, connection, id))?;
        match self.local.remove_item(id) {
            Err(err) if err.is_not_found() => Ok(()),
            other => other,
        }
    }

    fn item_ids(&self) -> CoreResult<Vec<ItemId>> {
        self.local.item_ids()
    }

    fn check_item_exists(&self, id: ItemId) -> CoreResult<bool> {
        self.local.check_item_exists(id)
    }

    fn get_items(&self, ids: &[ItemId]) -> CoreResult<Vec<Record>> {
        self.local.get_items(ids)
    }

    fn all_items(&self) -> CoreResult<Vec<Record>> {
        self.local.all_items()
    }

    fn filter_items(&self, predicate: &mut dyn FnMut(&Record) -> bool) -> CoreResult<Vec<Record>> {
        self.local.filter_items(predicate)
    }

    fn item_count(&self) -> CoreResult<usize> {
        self.local.item_count()
    }

    fn update(&mut self) -> CoreResult<()> {
        let (mut watermark, mut after) = (self.watermark, UNASSIGNED_ID);
        loop {
            let batch = self.remote(self.transport.pull(self.container, &self.schema, watermark, after))?;
            let stats = apply_batch(self.local.as_mut(), &batch)?;
            tracing::debug!(
                table = self.schema.table(),
                inserted = stats.inserted,
                overwritten = stats.overwritten,
                removed = stats.removed,
                more = batch.more,
                "applied update batch"
            );
            match batch.resume_from() {
                Some(cursor) => (watermark, after) = cursor,
                None => {
                    // only a complete pull moves the watermark
                    self.watermark = stats.watermark;
                    return Ok(());
                }
            }
        }
    }

    fn meta_items(&self) -> CoreResult<Vec<MetaItem>> {
        self.local.meta_items()
    }

    fn meta_item(&self, id: ItemId) -> CoreResult<MetaItem> {
        self.local.meta_item(id)
    }
}

impl std::fmt::Debug for RemoteContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteContainer")
            .field("table", &self.schema.table())
            .field("container", &self.container)
            .field("watermark", &self.watermark)
            .finish_non_exhaustive()
    }
}
