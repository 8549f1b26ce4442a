//! Database facade.

use crate::config::DatabaseConfig;
use crate::container::ContainerHandle;
use crate::engine::{ContainerEngine, ContainerSpec, DatabaseEngine, MemoryDatabase};
use crate::error::{CoreError, CoreResult};
use crate::event::{Event, Listener, ListenerId, Listeners};
use crate::record::Record;
use crate::schema::Schema;
use crate::types::{ContainerId, ItemId, UNASSIGNED_ID};
use crate::value::{Reference, Value};
use chrono::NaiveDateTime;
use std::fmt;
use std::sync::Arc;

/// A registered record type and the engine holding its items.
pub(crate) struct ContainerSlot {
    pub(crate) id: ContainerId,
    pub(crate) schema: Arc<Schema>,
    pub(crate) engine: Box<dyn ContainerEngine>,
    /// Reference attributes: canonical index and target container.
    pub(crate) references: Vec<(usize, ContainerId)>,
    pub(crate) listeners: Listeners,
}

/// The main database handle.
///
/// A `Database` owns one [`DatabaseEngine`] and one container per
/// registered record type. Record types are registered while the database
/// is closed; registration order fixes each container's [`ContainerId`],
/// which the file layout and the sync protocol both rely on.
///
/// # Example
///
/// ```
/// use itemdb_core::{Attribute, Database, Record, Schema};
///
/// let participant = Schema::builder("Participant")
///     .attribute(Attribute::string("name", "Participant name"))
///     .build()
///     .unwrap();
///
/// let mut db = Database::in_memory();
/// let participants = db.register(participant.clone()).unwrap();
/// assert!(db.open().unwrap());
///
/// let peter = Record::build(&participant, [("name", "Peter")]).unwrap();
/// let id = db.container(participants).unwrap().add_item(peter).unwrap();
/// assert_eq!(id, 0);
///
/// db.close().unwrap();
/// ```
pub struct Database {
    engine: Box<dyn DatabaseEngine>,
    containers: Vec<ContainerSlot>,
    listeners: Listeners,
    config: DatabaseConfig,
    open: bool,
}

impl Database {
    /// Creates a closed database over `engine`.
    pub fn new(engine: impl DatabaseEngine + 'static, config: DatabaseConfig) -> Self {
        Self::with_boxed_engine(Box::new(engine), config)
    }

    /// Creates a closed database over an already boxed engine.
    #[must_use]
    pub fn with_boxed_engine(engine: Box<dyn DatabaseEngine>, config: DatabaseConfig) -> Self {
        Self {
            engine,
            containers: Vec::new(),
            listeners: Listeners::default(),
            config,
            open: false,
        }
    }

    /// Creates a closed database over a [`MemoryDatabase`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryDatabase::new(), DatabaseConfig::default())
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Registers a record type and returns its container id.
    ///
    /// Every type a reference attribute points at must be registered first,
    /// except the type itself.
    ///
    /// # Errors
    ///
    /// Fails while the database is open, when the table name is taken, when
    /// a reference target is unknown, or when the engine cannot store the
    /// type.
    pub fn register(&mut self, schema: Arc<Schema>) -> CoreResult<ContainerId> {
        if self.open {
            return Err(CoreError::invalid_operation(format!(
                "cannot register {} while the database is open",
                schema.name()
            )));
        }
        if self.container_id(schema.table()).is_some() {
            return Err(CoreError::schema(format!(
                "table {} is already registered",
                schema.table()
            )));
        }
        let raw = u8::try_from(self.containers.len())
            .ok()
            .filter(|raw| *raw <= ContainerId::MAX.as_u8())
            .ok_or_else(|| CoreError::invalid_operation("too many containers"))?;
        let id = ContainerId::new(raw);

        let mut references = Vec::new();
        for (index, table) in schema.references() {
            let target = if table == schema.table() {
                id
            } else {
                self.container_id(table).ok_or_else(|| {
                    CoreError::schema(format!(
                        "{} references unregistered table {table}",
                        schema.name()
                    ))
                })?
            };
            references.push((index, target));
        }

        let engine = self.engine.create_container_engine(&ContainerSpec {
            id,
            schema: Arc::clone(&schema),
            clock: Arc::clone(&self.config.clock),
        })?;
        tracing::debug!(container = %id, table = schema.table(), "container registered");

        let table = schema.table().to_owned();
        self.containers.push(ContainerSlot {
            id,
            schema,
            engine,
            references,
            listeners: Listeners::default(),
        });
        self.listeners.post(&Event::ContainerAdded { container: id, table });
        Ok(id)
    }

    /// Id of the container whose type name or table name is `name`.
    #[must_use]
    pub fn container_id(&self, name: &str) -> Option<ContainerId> {
        self.containers
            .iter()
            .find(|slot| slot.schema.table() == name || slot.schema.name() == name)
            .map(|slot| slot.id)
    }

    /// Record type of a container.
    #[must_use]
    pub fn schema(&self, id: ContainerId) -> Option<&Arc<Schema>> {
        self.containers.get(id.index()).map(|slot| &slot.schema)
    }

    /// Registered containers in registration order.
    pub fn containers(&self) -> impl Iterator<Item = (ContainerId, &Arc<Schema>)> + '_ {
        self.containers.iter().map(|slot| (slot.id, &slot.schema))
    }

    /// Number of registered containers.
    #[must_use]
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Opens the store. Returns true if it did not exist before.
    pub fn open(&mut self) -> CoreResult<bool> {
        if self.open {
            return Err(CoreError::invalid_operation("database is already open"));
        }
        let newly_created = self.engine.open()?;
        self.open = true;
        tracing::info!(
            containers = self.containers.len(),
            newly_created,
            "database opened"
        );
        self.listeners.post(&Event::Opened { newly_created });
        Ok(newly_created)
    }

    /// Closes the store.
    pub fn close(&mut self) -> CoreResult<()> {
        self.check_access()?;
        self.engine.close()?;
        self.open = false;
        tracing::info!("database closed");
        self.listeners.post(&Event::Closed);
        Ok(())
    }

    /// Commits pending work.
    pub fn commit(&mut self) -> CoreResult<()> {
        self.check_access()?;
        self.engine.commit()
    }

    /// Runs `work` and commits if it succeeds.
    ///
    /// Changes made before a failure stay applied; there is no rollback
    /// beyond what the engine's own commit provides.
    pub fn transact<F, T>(&mut self, work: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Self) -> CoreResult<T>,
    {
        self.check_access()?;
        let result = work(self)?;
        self.commit()?;
        Ok(result)
    }

    /// Checks if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Ensures the database is open.
    pub fn check_access(&self) -> CoreResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(CoreError::access("database is not open"))
        }
    }

    /// Pulls remote changes into every container.
    pub fn update_all(&mut self) -> CoreResult<()> {
        self.check_access()?;
        for index in 0..self.containers.len() {
            self.update_at(index)?;
        }
        Ok(())
    }

    /// Current time of the configured clock.
    #[must_use]
    pub fn current_date_time(&self) -> NaiveDateTime {
        self.config.clock.now()
    }

    /// Returns database configuration.
    #[must_use]
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    // ========================================================================
    // Containers and listeners
    // ========================================================================

    /// Handle to a container.
    pub fn container(&mut self, id: ContainerId) -> CoreResult<ContainerHandle<'_>> {
        if id.index() >= self.containers.len() {
            return Err(CoreError::ContainerNotFound {
                name: id.to_string(),
            });
        }
        Ok(ContainerHandle::new(self, id))
    }

    /// Handle to the container whose type name or table name is `name`.
    pub fn container_by_name(&mut self, name: &str) -> CoreResult<ContainerHandle<'_>> {
        let id = self
            .container_id(name)
            .ok_or_else(|| CoreError::ContainerNotFound {
                name: name.to_owned(),
            })?;
        Ok(ContainerHandle::new(self, id))
    }

    /// Subscribes to database-level events.
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.listeners.add(Box::new(listener) as Listener)
    }

    /// Removes a database-level listener. Returns false if it was unknown.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    // ========================================================================
    // Crate internals used by container handles
    // ========================================================================

    pub(crate) fn slot(&self, id: ContainerId) -> &ContainerSlot {
        &self.containers[id.index()]
    }

    pub(crate) fn slot_mut(&mut self, id: ContainerId) -> &mut ContainerSlot {
        &mut self.containers[id.index()]
    }

    fn update_at(&mut self, index: usize) -> CoreResult<()> {
        let slot = &mut self.containers[index];
        slot.engine.update()?;
        let event = Event::Updated { container: slot.id };
        slot.listeners.post(&event);
        Ok(())
    }

    /// Ensures `item` belongs to container `id`.
    pub(crate) fn check_type(&self, id: ContainerId, item: &Record) -> CoreResult<()> {
        let expected = &self.slot(id).schema;
        if item.schema().table() == expected.table() {
            Ok(())
        } else {
            Err(CoreError::validation(format!(
                "{} expects {} records, got {}",
                expected.table(),
                expected.name(),
                item.schema().name()
            )))
        }
    }

    /// Replaces nested references by ids, adding unsaved targets to their
    /// own containers first.
    pub(crate) fn flatten(&mut self, id: ContainerId, item: &mut Record, depth: usize) -> CoreResult<()> {
        let references = self.slot(id).references.clone();
        for (index, target) in references {
            let taken = match item.value_mut(index) {
                Some(Value::Reference(reference)) => std::mem::replace(reference, Reference::Unset),
                _ => continue,
            };
            let target_id = match taken {
                Reference::Record(nested) if nested.id() == UNASSIGNED_ID => {
                    if depth >= self.config.max_reference_depth {
                        return Err(CoreError::invalid_operation(format!(
                            "unsaved references nest deeper than {} levels",
                            self.config.max_reference_depth
                        )));
                    }
                    self.add_nested(target, *nested, depth + 1)?
                }
                other => other.id(),
            };
            if let Some(Value::Reference(reference)) = item.value_mut(index) {
                *reference = Reference::from_id(target_id);
            }
        }
        Ok(())
    }

    fn add_nested(&mut self, id: ContainerId, mut item: Record, depth: usize) -> CoreResult<ItemId> {
        self.check_type(id, &item)?;
        self.flatten(id, &mut item, depth)?;
        let slot = self.slot_mut(id);
        let item_id = slot.engine.add_item(item)?;
        slot.listeners.post(&Event::ItemAdded {
            container: id,
            id: item_id,
        });
        Ok(item_id)
    }

    /// Replaces stored reference ids by the records they point at, up to
    /// the configured depth. Nested reads post no events.
    pub(crate) fn resolve(&self, id: ContainerId, item: &mut Record, depth: usize) -> CoreResult<()> {
        if depth >= self.config.max_reference_depth {
            return Ok(());
        }
        for &(index, target) in &self.slot(id).references {
            let target_id = match item.value(index) {
                Some(Value::Reference(reference)) => reference.id(),
                _ => continue,
            };
            let resolved = if target_id == UNASSIGNED_ID {
                Reference::Unset
            } else {
                let mut nested = self.slot(target).engine.get_item(target_id)?;
                self.resolve(target, &mut nested, depth + 1)?;
                Reference::Record(Box::new(nested))
            };
            if let Some(value) = item.value_mut(index) {
                *value = Value::Reference(resolved);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("containers", &self.containers.iter().map(|s| s.schema.table()).collect::<Vec<_>>())
            .field("open", &self.open)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
