//! One SQLite connection per accessing thread.

use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

/// Where the database lives.
#[derive(Debug, Clone)]
pub(crate) enum Location {
    File(PathBuf),
    /// Shared-cache in-memory database, reachable by URI from every thread.
    Memory(String),
}

impl Location {
    pub(crate) fn memory() -> Self {
        Self::Memory(format!(
            "file:itemdb-{}?mode=memory&cache=shared",
            uuid::Uuid::new_v4().simple()
        ))
    }
}

type Shared = Arc<Mutex<Connection>>;

/// Lazily opens a connection for each thread that touches the store.
///
/// The anchor connection keeps an in-memory database alive between
/// accesses and is held for as long as the pool is open.
pub(crate) struct ConnectionPool {
    location: Location,
    busy_timeout: Duration,
    anchor: Mutex<Option<Connection>>,
    connections: Mutex<HashMap<ThreadId, Shared>>,
}

impl ConnectionPool {
    pub(crate) fn new(location: Location, busy_timeout: Duration) -> Self {
        Self {
            location,
            busy_timeout,
            anchor: Mutex::new(None),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Opens the anchor connection. Returns true if the database already
    /// existed.
    pub(crate) fn open(&self) -> CoreResult<bool> {
        let existed = match &self.location {
            Location::File(path) => path.exists(),
            Location::Memory(_) => false,
        };
        let anchor = self.connect()?;
        *self.anchor.lock() = Some(anchor);
        Ok(existed)
    }

    /// Drops every connection.
    pub(crate) fn close(&self) {
        let dropped = {
            let mut connections = self.connections.lock();
            let n = connections.len();
            connections.clear();
            n
        };
        self.anchor.lock().take();
        tracing::debug!(connections = dropped, "sql connections closed");
    }

    pub(crate) fn is_open(&self) -> bool {
        self.anchor.lock().is_some()
    }

    /// The calling thread's connection.
    pub(crate) fn connection(&self) -> CoreResult<Shared> {
        if !self.is_open() {
            return Err(CoreError::access("sql store is not open"));
        }
        let id = thread::current().id();
        let mut connections = self.connections.lock();
        if let Some(conn) = connections.get(&id) {
            return Ok(Arc::clone(conn));
        }
        let conn = Arc::new(Mutex::new(self.connect()?));
        connections.insert(id, Arc::clone(&conn));
        tracing::trace!(thread = ?id, "sql connection opened");
        Ok(conn)
    }

    fn connect(&self) -> CoreResult<Connection> {
        let conn = match &self.location {
            Location::File(path) => Connection::open(path)?,
            Location::Memory(uri) => Connection::open(uri)?,
        };
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("location", &self.location)
            .field("connections", &self.connections.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_pool_refuses_connections() {
        let pool = ConnectionPool::new(Location::memory(), Duration::from_millis(100));
        assert!(matches!(pool.connection(), Err(CoreError::Access { .. })));
    }

    #[test]
    fn same_thread_reuses_connection() {
        let pool = ConnectionPool::new(Location::memory(), Duration::from_millis(100));
        pool.open().unwrap();
        let a = pool.connection().unwrap();
        let b = pool.connection().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn threads_share_in_memory_database() {
        let pool = Arc::new(ConnectionPool::new(Location::memory(), Duration::from_millis(500)));
        pool.open().unwrap();
        pool.connection()
            .unwrap()
            .lock()
            .execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (7);")
            .unwrap();

        let other = Arc::clone(&pool);
        let (seen, same) = thread::spawn(move || {
            let conn = other.connection().unwrap();
            let x: i64 = conn.lock().query_row("SELECT x FROM t", [], |r| r.get(0)).unwrap();
            (x, conn)
        })
        .join()
        .unwrap();

        assert_eq!(seen, 7);
        assert!(!Arc::ptr_eq(&same, &pool.connection().unwrap()));
    }

    #[test]
    fn file_existence_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite");
        let pool = ConnectionPool::new(Location::File(path.clone()), Duration::from_millis(100));
        assert!(!pool.open().unwrap());
        pool.connection()
            .unwrap()
            .lock()
            .execute_batch("CREATE TABLE t (x INTEGER);")
            .unwrap();
        pool.close();
        assert!(pool.open().unwrap());
    }
}
