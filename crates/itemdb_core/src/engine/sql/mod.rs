//! SQLite table engine.
//!
//! Every container maps to one table named after its schema, with one
//! column per attribute in canonical order. Statements are generated once
//! per container and run through `prepare_cached`. Writes autocommit.
//!
//! Ids are assigned as `MAX(id) + 1` so that ids match the other engines.
//! Two writers on separate connections can race for the same id; the
//! loser fails with a constraint error.

mod convert;
mod pool;
mod statements;

pub use convert::{column_type, SQL_DATE_TIME_FORMAT};

use self::convert::{from_sql, parse_date_time, to_sql};
use self::pool::{ConnectionPool, Location};
use self::statements::Statements;
use super::{untracked, ContainerEngine, ContainerSpec, DatabaseEngine};
use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::meta::MetaItem;
use crate::record::Record;
use crate::schema::Schema;
use crate::types::{ItemId, UNASSIGNED_ID};
use crate::value::Value;
use rusqlite::types::{ToSql, Value as SqlValue};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Default time a connection waits on a locked database.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQL engine settings.
#[derive(Debug, Clone)]
pub struct SqlConfig {
    /// Maintain a `<table>_meta` table per container for sync.
    pub track_meta: bool,
    /// How long a connection waits for a lock held by another.
    pub busy_timeout: Duration,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            track_meta: false,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

impl SqlConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables metadata tables.
    #[must_use]
    pub fn with_track_meta(mut self, track_meta: bool) -> Self {
        self.track_meta = track_meta;
        self
    }

    /// Sets the lock wait time.
    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

/// Database engine storing each container in an SQLite table.
#[derive(Debug)]
pub struct SqlDatabase {
    pool: Arc<ConnectionPool>,
    config: SqlConfig,
    statements: Vec<Arc<Statements>>,
}

impl SqlDatabase {
    /// Creates an engine over the database file at `path`.
    pub fn new(path: impl AsRef<Path>, config: SqlConfig) -> Self {
        Self::with_location(Location::File(path.as_ref().to_path_buf()), config)
    }

    /// Creates an engine over a private in-memory database. Its contents
    /// are dropped on close.
    #[must_use]
    pub fn in_memory(config: SqlConfig) -> Self {
        Self::with_location(Location::memory(), config)
    }

    fn with_location(location: Location, config: SqlConfig) -> Self {
        Self {
            pool: Arc::new(ConnectionPool::new(location, config.busy_timeout)),
            config,
            statements: Vec::new(),
        }
    }
}

impl DatabaseEngine for SqlDatabase {
    fn open(&mut self) -> CoreResult<bool> {
        let existed = self.pool.open()?;
        let mut ddl = String::new();
        for statements in &self.statements {
            ddl.push_str(&statements.create_table);
            if self.config.track_meta {
                ddl.push_str(&statements.create_meta);
            }
        }
        let conn = self.pool.connection()?;
        conn.lock().execute_batch(&ddl)?;
        tracing::info!(tables = self.statements.len(), new = !existed, "sql store opened");
        Ok(!existed)
    }

    fn close(&mut self) -> CoreResult<()> {
        self.pool.close();
        Ok(())
    }

    fn create_container_engine(&mut self, spec: &ContainerSpec) -> CoreResult<Box<dyn ContainerEngine>> {
        let statements = Arc::new(Statements::generate(&spec.schema)?);
        self.statements.push(Arc::clone(&statements));
        Ok(Box::new(SqlContainer {
            pool: Arc::clone(&self.pool),
            statements,
            schema: Arc::clone(&spec.schema),
            clock: Arc::clone(&spec.clock),
            track_meta: self.config.track_meta,
        }))
    }
}

/// Container engine of an [`SqlDatabase`].
#[derive(Debug)]
pub struct SqlContainer {
    pool: Arc<ConnectionPool>,
    statements: Arc<Statements>,
    schema: Arc<Schema>,
    clock: Arc<dyn Clock>,
    track_meta: bool,
}

impl SqlContainer {
    fn with_conn<T>(&self, work: impl FnOnce(&Connection) -> CoreResult<T>) -> CoreResult<T> {
        let conn = self.pool.connection()?;
        let conn = conn.lock();
        work(&conn)
    }

    /// Runs `work` in one transaction. Whatever succeeded before a failure
    /// is still committed.
    fn batch<T>(&self, work: impl FnOnce(&Connection) -> CoreResult<T>) -> CoreResult<T> {
        let conn = self.pool.connection()?;
        let mut conn = conn.lock();
        let tx = conn.transaction()?;
        let result = work(&tx);
        tx.commit()?;
        result
    }

    fn not_found(&self, id: ItemId) -> CoreError {
        CoreError::item_not_found(self.statements.table.as_str(), id)
    }

    fn bind(&self, item: &Record) -> CoreResult<Vec<SqlValue>> {
        item.values().iter().map(to_sql).collect()
    }

    fn read_row(&self, row: &Row<'_>) -> rusqlite::Result<Vec<SqlValue>> {
        (0..self.schema.len()).map(|i| row.get(i)).collect()
    }

    fn to_record(&self, columns: Vec<SqlValue>) -> CoreResult<Record> {
        let values = self
            .schema
            .attributes()
            .iter()
            .zip(columns)
            .enumerate()
            .map(|(i, (attribute, value))| from_sql(attribute.kind(), i, attribute.name(), value))
            .collect::<CoreResult<Vec<_>>>()?;
        Record::from_values(&self.schema, values)
    }

    fn exists_on(&self, conn: &Connection, id: ItemId) -> CoreResult<bool> {
        let mut stmt = conn.prepare_cached(&self.statements.exists)?;
        Ok(stmt.exists(params![id])?)
    }

    fn write_meta(&self, conn: &Connection, id: ItemId, deleted: bool) -> CoreResult<()> {
        if self.track_meta {
            let now = to_sql(&Value::DateTime(self.clock.now()))?;
            conn.prepare_cached(&self.statements.upsert_meta)?
                .execute(params![id, now, deleted])?;
        }
        Ok(())
    }

    fn insert_on(&self, conn: &Connection, item: &Record) -> CoreResult<()> {
        let values = self.bind(item)?;
        conn.prepare_cached(&self.statements.insert)?
            .execute(params_from_iter(values.iter()))?;
        self.write_meta(conn, item.id(), false)
    }

    fn add_on(&self, conn: &Connection, mut item: Record) -> CoreResult<ItemId> {
        let next: i64 = conn
            .prepare_cached(&self.statements.next_id)?
            .query_row([], |row| row.get(0))?;
        let id = ItemId::try_from(next).map_err(|_| {
            CoreError::invalid_operation(format!("{} ran out of ids", self.statements.table))
        })?;
        item.set_id(id);
        self.insert_on(conn, &item)?;
        Ok(id)
    }

    fn insert_checked(&self, conn: &Connection, item: &Record) -> CoreResult<()> {
        let id = item.id();
        if id == UNASSIGNED_ID {
            return Err(CoreError::validation(format!(
                "cannot insert into {} without an id",
                self.statements.table
            )));
        }
        if self.exists_on(conn, id)? {
            return Err(CoreError::item_exists(self.statements.table.as_str(), id));
        }
        self.insert_on(conn, item)
    }

    fn set_on(&self, conn: &Connection, item: &Record) -> CoreResult<()> {
        let id = item.id();
        if !self.exists_on(conn, id)? {
            return Err(self.not_found(id));
        }
        let values = self.bind(item)?;
        let names: Vec<String> = self
            .schema
            .attributes()
            .iter()
            .map(|a| format!(":{}", a.name()))
            .collect();
        let named: Vec<(&str, &dyn ToSql)> = names
            .iter()
            .map(String::as_str)
            .zip(values.iter().map(|v| v as &dyn ToSql))
            .collect();
        conn.prepare_cached(&self.statements.update)?
            .execute(named.as_slice())?;
        self.write_meta(conn, id, false)
    }

    fn remove_on(&self, conn: &Connection, id: ItemId) -> CoreResult<()> {
        let removed = conn
            .prepare_cached(&self.statements.delete)?
            .execute(params![id])?;
        if removed == 0 {
            return Err(self.not_found(id));
        }
        self.write_meta(conn, id, true)
    }

    fn read_meta(row: &Row<'_>) -> rusqlite::Result<(ItemId, String, bool)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    }

    fn to_meta((id, last_update, deleted): (ItemId, String, bool)) -> CoreResult<MetaItem> {
        Ok(MetaItem {
            id,
            last_update: parse_date_time(1, &last_update)?,
            deleted,
        })
    }
}

impl ContainerEngine for SqlContainer {
    fn add_item(&mut self, item: Record) -> CoreResult<ItemId> {
        self.with_conn(|conn| self.add_on(conn, item))
    }

    fn insert_item(&mut self, item: Record) -> CoreResult<()> {
        self.with_conn(|conn| self.insert_checked(conn, &item))
    }

    fn get_item(&self, id: ItemId) -> CoreResult<Record> {
        let columns = self.with_conn(|conn| {
            Ok(conn
                .prepare_cached(&self.statements.select)?
                .query_row(params![id], |row| self.read_row(row))
                .optional()?)
        })?;
        match columns {
            Some(columns) => self.to_record(columns),
            None => Err(self.not_found(id)),
        }
    }

    fn set_item(&mut self, item: Record) -> CoreResult<()> {
        self.with_conn(|conn| self.set_on(conn, &item))
    }

    fn remove_item(&mut self, id: ItemId) -> CoreResult<()> {
        self.with_conn(|conn| self.remove_on(conn, id))
    }

    fn item_ids(&self) -> CoreResult<Vec<ItemId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&self.statements.select_ids)?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<ItemId>>>()?;
            Ok(ids)
        })
    }

    fn check_item_exists(&self, id: ItemId) -> CoreResult<bool> {
        self.with_conn(|conn| self.exists_on(conn, id))
    }

    fn add_items(&mut self, items: Vec<Record>) -> CoreResult<Vec<ItemId>> {
        self.batch(|conn| items.into_iter().map(|item| self.add_on(conn, item)).collect())
    }

    fn insert_items(&mut self, items: Vec<Record>) -> CoreResult<()> {
        self.batch(|conn| items.iter().try_for_each(|item| self.insert_checked(conn, item)))
    }

    fn set_items(&mut self, items: Vec<Record>) -> CoreResult<()> {
        self.batch(|conn| items.iter().try_for_each(|item| self.set_on(conn, item)))
    }

    fn remove_items(&mut self, ids: &[ItemId]) -> CoreResult<()> {
        self.batch(|conn| ids.iter().try_for_each(|id| self.remove_on(conn, *id)))
    }

    fn all_items(&self) -> CoreResult<Vec<Record>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&self.statements.select_all)?;
            let rows = stmt
                .query_map([], |row| self.read_row(row))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(|columns| self.to_record(columns)).collect()
    }

    fn item_count(&self) -> CoreResult<usize> {
        let count: i64 = self.with_conn(|conn| {
            Ok(conn
                .prepare_cached(&self.statements.count)?
                .query_row([], |row| row.get(0))?)
        })?;
        usize::try_from(count).map_err(|_| CoreError::Sql(rusqlite::Error::IntegralValueOutOfRange(0, count)))
    }

    fn clear(&mut self) -> CoreResult<()> {
        self.batch(|conn| {
            conn.prepare_cached(&self.statements.clear)?.execute([])?;
            if self.track_meta {
                let now = to_sql(&Value::DateTime(self.clock.now()))?;
                conn.prepare_cached(&self.statements.tombstone_live)?
                    .execute(params![now])?;
            }
            Ok(())
        })
    }

    fn meta_items(&self) -> CoreResult<Vec<MetaItem>> {
        if !self.track_meta {
            return Err(untracked());
        }
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&self.statements.select_meta_all)?;
            let rows = stmt
                .query_map([], Self::read_meta)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(Self::to_meta).collect()
    }

    fn meta_item(&self, id: ItemId) -> CoreResult<MetaItem> {
        if !self.track_meta {
            return Err(untracked());
        }
        let row = self.with_conn(|conn| {
            Ok(conn
                .prepare_cached(&self.statements.select_meta)?
                .query_row(params![id], Self::read_meta)
                .optional()?)
        })?;
        row.map(Self::to_meta)
            .unwrap_or_else(|| Err(CoreError::invalid_operation(format!("no metadata for item {id}"))))
    }
}
