//! Group-based access control.
//!
//! A [`UserDatabase`] registers five record types ahead of any user type:
//!
//! | container | type | attributes |
//! |---|---|---|
//! | 0 | `User` | `name`, `password` |
//! | 1 | `Group` | `name` |
//! | 2 | `Permission` | `containerId`, `type` |
//! | 3 | `Membership` | `userId`, `groupId` |
//! | 4 | `PermissionAssignment` | `groupId`, `permissionId` |
//!
//! A user may run an operation on a container if one of their groups is
//! assigned a permission of the matching kind for that container.
//!
//! Passwords are stored and compared as plain text.

use crate::config::DatabaseConfig;
use crate::container::ContainerHandle;
use crate::database::Database;
use crate::engine::{DatabaseEngine, MemoryDatabase};
use crate::error::{CoreError, CoreResult};
use crate::meta::MetaItem;
use crate::record::Record;
use crate::schema::{Attribute, Schema};
use crate::types::{ContainerId, ItemId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Container of [`User`](AclSchemas::user) records.
pub const USERS: ContainerId = ContainerId(0);
/// Container of group records.
pub const GROUPS: ContainerId = ContainerId(1);
/// Container of permission records.
pub const PERMISSIONS: ContainerId = ContainerId(2);
/// Container of membership records.
pub const MEMBERSHIPS: ContainerId = ContainerId(3);
/// Container of permission assignment records.
pub const PERMISSION_ASSIGNMENTS: ContainerId = ContainerId(4);

/// Identifies a logged-in user session.
pub type ConnectionId = i32;

/// The operation a permission allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum PermissionKind {
    /// Add and insert.
    Add = 0,
    /// Every read.
    Get = 1,
    /// Overwrite.
    Set = 2,
    /// Remove and clear.
    Remove = 3,
}

impl PermissionKind {
    /// Every kind, in wire order.
    pub const ALL: [Self; 4] = [Self::Add, Self::Get, Self::Set, Self::Remove];

    /// Stored representation.
    #[must_use]
    pub fn as_i8(self) -> i8 {
        self as i8
    }

    /// Parses the stored representation.
    #[must_use]
    pub fn from_i8(value: i8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_i8() == value)
    }
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Add => "add",
            Self::Get => "get",
            Self::Set => "set",
            Self::Remove => "remove",
        };
        f.write_str(name)
    }
}

/// The five access-control record types.
#[derive(Debug, Clone)]
pub struct AclSchemas {
    /// `User(name, password)`.
    pub user: Arc<Schema>,
    /// `Group(name)`.
    pub group: Arc<Schema>,
    /// `Permission(containerId, type)`.
    pub permission: Arc<Schema>,
    /// `Membership(userId, groupId)`.
    pub membership: Arc<Schema>,
    /// `PermissionAssignment(groupId, permissionId)`.
    pub assignment: Arc<Schema>,
}

impl AclSchemas {
    /// Builds the schemas.
    pub fn new() -> CoreResult<Self> {
        Ok(Self {
            user: Schema::builder("User")
                .attribute(Attribute::string("name", ""))
                .attribute(Attribute::string("password", ""))
                .build()?,
            group: Schema::builder("Group")
                .attribute(Attribute::string("name", ""))
                .build()?,
            permission: Schema::builder("Permission")
                .attribute(Attribute::int16("containerId", -1))
                .attribute(Attribute::int8("type", -1))
                .build()?,
            membership: Schema::builder("Membership")
                .attribute(Attribute::int32("userId", -1))
                .attribute(Attribute::int32("groupId", -1))
                .build()?,
            assignment: Schema::builder("PermissionAssignment")
                .attribute(Attribute::int32("groupId", -1))
                .attribute(Attribute::int32("permissionId", -1))
                .build()?,
        })
    }

    fn in_order(&self) -> [&Arc<Schema>; 5] {
        [
            &self.user,
            &self.group,
            &self.permission,
            &self.membership,
            &self.assignment,
        ]
    }
}

/// A [`Database`] with users, groups and per-container permissions.
///
/// Methods on the `UserDatabase` itself are the ungated bootstrap path;
/// [`container`](Self::container) hands out a view that checks the acting
/// user's permissions before every operation.
pub struct UserDatabase {
    db: Database,
    acl: AclSchemas,
    connections: BTreeMap<ConnectionId, ItemId>,
    next_connection: ConnectionId,
}

impl UserDatabase {
    /// Creates a closed database and registers the access-control types.
    pub fn new(engine: impl DatabaseEngine + 'static, config: DatabaseConfig) -> CoreResult<Self> {
        Self::wrap(Database::new(engine, config))
    }

    /// Registers the access-control types in a fresh `Database`.
    ///
    /// # Errors
    ///
    /// Fails if `db` already has containers or is open.
    pub fn wrap(mut db: Database) -> CoreResult<Self> {
        if db.container_count() != 0 {
            return Err(CoreError::invalid_operation(
                "access control types must be registered first",
            ));
        }
        let acl = AclSchemas::new()?;
        for schema in acl.in_order() {
            db.register(Arc::clone(schema))?;
        }
        Ok(Self {
            db,
            acl,
            connections: BTreeMap::new(),
            next_connection: 0,
        })
    }

    /// In-memory database with default configuration.
    pub fn in_memory() -> CoreResult<Self> {
        Self::new(MemoryDatabase::new(), DatabaseConfig::default())
    }

    /// The access-control record types.
    #[must_use]
    pub fn acl_schemas(&self) -> &AclSchemas {
        &self.acl
    }

    /// The wrapped database.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// The wrapped database, ungated.
    pub fn database_mut(&mut self) -> &mut Database {
        &mut self.db
    }

    /// Registers a user record type.
    pub fn register(&mut self, schema: Arc<Schema>) -> CoreResult<ContainerId> {
        self.db.register(schema)
    }

    /// Opens the store. Returns true if it did not exist before.
    pub fn open(&mut self) -> CoreResult<bool> {
        self.db.open()
    }

    /// Closes the store and drops every connection.
    pub fn close(&mut self) -> CoreResult<()> {
        self.connections.clear();
        self.db.close()
    }

    /// Commits pending work.
    pub fn commit(&mut self) -> CoreResult<()> {
        self.db.commit()
    }

    /// Checks if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.db.is_open()
    }

    // ========================================================================
    // Seeding (ungated, posts no item events)
    // ========================================================================

    fn acl_container(&mut self, id: ContainerId) -> CoreResult<ContainerHandle<'_>> {
        self.db.container(id)
    }

    /// Adds a user.
    pub fn add_user(&mut self, name: &str, password: &str) -> CoreResult<ItemId> {
        let user = Record::build(&self.acl.user, [("name", name), ("password", password)])?;
        self.acl_container(USERS)?.add_item_quietly(user)
    }

    /// Adds a group.
    pub fn add_group(&mut self, name: &str) -> CoreResult<ItemId> {
        let group = Record::build(&self.acl.group, [("name", name)])?;
        self.acl_container(GROUPS)?.add_item_quietly(group)
    }

    /// Adds a user to a group.
    pub fn add_membership(&mut self, user: ItemId, group: ItemId) -> CoreResult<ItemId> {
        let membership = Record::build(&self.acl.membership, [("userId", user), ("groupId", group)])?;
        self.acl_container(MEMBERSHIPS)?.add_item_quietly(membership)
    }

    /// Creates a permission of `kind` on `container`.
    pub fn add_permission(&mut self, container: ContainerId, kind: PermissionKind) -> CoreResult<ItemId> {
        let mut permission = Record::new(&self.acl.permission)?;
        permission.set("containerId", i16::from(container.as_u8()))?;
        permission.set("type", kind.as_i8())?;
        self.acl_container(PERMISSIONS)?.add_item_quietly(permission)
    }

    /// Assigns a permission to a group.
    pub fn assign_permission(&mut self, group: ItemId, permission: ItemId) -> CoreResult<ItemId> {
        let assignment = Record::build(
            &self.acl.assignment,
            [("groupId", group), ("permissionId", permission)],
        )?;
        self.acl_container(PERMISSION_ASSIGNMENTS)?.add_item_quietly(assignment)
    }

    /// Creates a permission and assigns it to `group`.
    pub fn grant(&mut self, group: ItemId, container: ContainerId, kind: PermissionKind) -> CoreResult<ItemId> {
        let permission = self.add_permission(container, kind)?;
        self.assign_permission(group, permission)?;
        Ok(permission)
    }

    /// Seeds one user in one group holding every permission on every
    /// container. Returns the user and group ids.
    pub fn init_admin_group(&mut self, user: &str, password: &str, group: &str) -> CoreResult<(ItemId, ItemId)> {
        let user_id = self.add_user(user, password)?;
        let group_id = self.add_group(group)?;
        self.add_membership(user_id, group_id)?;
        let containers: Vec<ContainerId> = self.db.containers().map(|(id, _)| id).collect();
        for container in containers {
            for kind in PermissionKind::ALL {
                self.grant(group_id, container, kind)?;
            }
        }
        tracing::info!(user, group, "admin group initialised");
        Ok((user_id, group_id))
    }

    // ========================================================================
    // Checks
    // ========================================================================

    /// Authenticates a user and returns their id.
    ///
    /// # Errors
    ///
    /// Returns an authentication error if no user has this name or the
    /// password differs.
    pub fn check_user(&mut self, name: &str, password: &str) -> CoreResult<ItemId> {
        let users = self.acl_container(USERS)?.all_items()?;
        let user = users
            .into_iter()
            .find(|user| user.get_str("name") == Some(name))
            .filter(|user| user.get_str("password") == Some(password));
        match user {
            Some(user) => Ok(user.id()),
            None => Err(CoreError::Authentication {
                user: name.to_owned(),
            }),
        }
    }

    fn ids_where(&mut self, container: ContainerId, key: &str, value: ItemId, field: &str) -> CoreResult<Vec<ItemId>> {
        let rows = self.acl_container(container)?.all_items()?;
        Ok(rows
            .iter()
            .filter(|row| row.get_i64(key) == Some(i64::from(value)))
            .filter_map(|row| row.get_i64(field))
            .filter_map(|id| ItemId::try_from(id).ok())
            .collect())
    }

    /// Groups `user` belongs to.
    pub fn user_group_ids(&mut self, user: ItemId) -> CoreResult<Vec<ItemId>> {
        self.ids_where(MEMBERSHIPS, "userId", user, "groupId")
    }

    /// Permissions assigned to `group`.
    pub fn group_permission_ids(&mut self, group: ItemId) -> CoreResult<Vec<ItemId>> {
        self.ids_where(PERMISSION_ASSIGNMENTS, "groupId", group, "permissionId")
    }

    /// Ensures `user` holds a permission of `kind` on `container`.
    pub fn check_user_permissions(&mut self, user: ItemId, container: ContainerId, kind: PermissionKind) -> CoreResult<()> {
        let permissions = self.acl_container(PERMISSIONS)?.all_items()?;
        let mut granted = Vec::new();
        for group in self.user_group_ids(user)? {
            granted.extend(self.group_permission_ids(group)?);
        }
        let allowed = permissions.iter().any(|permission| {
            granted.contains(&permission.id())
                && permission.get_i64("containerId") == Some(i64::from(container.as_u8()))
                && permission.get_i64("type") == Some(i64::from(kind.as_i8()))
        });
        if allowed {
            Ok(())
        } else {
            Err(CoreError::permission(format!(
                "user {user} may not {kind} on {container}"
            )))
        }
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Authenticates a user and opens a connection for them.
    pub fn add_connection(&mut self, name: &str, password: &str) -> CoreResult<ConnectionId> {
        self.db.check_access()?;
        let user = self.check_user(name, password)?;
        let id = self.next_connection;
        self.next_connection = id
            .checked_add(1)
            .ok_or_else(|| CoreError::invalid_operation("connection ids exhausted"))?;
        self.connections.insert(id, user);
        tracing::debug!(connection = id, user = name, "connection added");
        Ok(id)
    }

    /// Closes a connection.
    pub fn close_connection(&mut self, id: ConnectionId) -> CoreResult<()> {
        self.connections
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| CoreError::access(format!("connection {id} is not open")))
    }

    /// The user behind a connection.
    pub fn connection_user(&self, id: ConnectionId) -> CoreResult<ItemId> {
        self.connections
            .get(&id)
            .copied()
            .ok_or_else(|| CoreError::access(format!("connection {id} is not open")))
    }

    /// Permission-checked view of a container for `user`.
    pub fn container(&mut self, user: ItemId, container: ContainerId) -> CoreResult<GuardedContainer<'_>> {
        self.db.container(container)?;
        Ok(GuardedContainer {
            db: self,
            user,
            container,
        })
    }
}

impl fmt::Debug for UserDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserDatabase")
            .field("db", &self.db)
            .field("connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}

/// A container view that checks the acting user's permissions first.
pub struct GuardedContainer<'a> {
    db: &'a mut UserDatabase,
    user: ItemId,
    container: ContainerId,
}

impl GuardedContainer<'_> {
    fn allow(&mut self, kind: PermissionKind) -> CoreResult<ContainerHandle<'_>> {
        self.db.db.check_access()?;
        self.db.check_user_permissions(self.user, self.container, kind)?;
        self.db.db.container(self.container)
    }

    /// Container id.
    #[must_use]
    pub fn id(&self) -> ContainerId {
        self.container
    }

    /// Adds an item. Requires [`PermissionKind::Add`].
    pub fn add_item(&mut self, item: Record) -> CoreResult<ItemId> {
        self.allow(PermissionKind::Add)?.add_item(item)
    }

    /// Inserts an item. Requires [`PermissionKind::Add`].
    pub fn insert_item(&mut self, item: Record) -> CoreResult<()> {
        self.allow(PermissionKind::Add)?.insert_item(item)
    }

    /// Reads an item. Requires [`PermissionKind::Get`].
    pub fn get_item(&mut self, id: ItemId) -> CoreResult<Record> {
        self.allow(PermissionKind::Get)?.get_item(id)
    }

    /// Every item. Requires [`PermissionKind::Get`].
    pub fn all_items(&mut self) -> CoreResult<Vec<Record>> {
        self.allow(PermissionKind::Get)?.all_items()
    }

    /// Every id. Requires [`PermissionKind::Get`].
    pub fn item_ids(&mut self) -> CoreResult<Vec<ItemId>> {
        self.allow(PermissionKind::Get)?.item_ids()
    }

    /// Item count. Requires [`PermissionKind::Get`].
    pub fn item_count(&mut self) -> CoreResult<usize> {
        self.allow(PermissionKind::Get)?.item_count()
    }

    /// Existence check. Requires [`PermissionKind::Get`].
    pub fn check_item_exists(&mut self, id: ItemId) -> CoreResult<bool> {
        self.allow(PermissionKind::Get)?.check_item_exists(id)
    }

    /// Filtered items. Requires [`PermissionKind::Get`].
    pub fn filter_items<F>(&mut self, predicate: F) -> CoreResult<Vec<Record>>
    where
        F: FnMut(&Record) -> bool,
    {
        self.allow(PermissionKind::Get)?.filter_items(predicate)
    }

    /// Overwrites an item. Requires [`PermissionKind::Set`].
    pub fn set_item(&mut self, item: Record) -> CoreResult<()> {
        self.allow(PermissionKind::Set)?.set_item(item)
    }

    /// Removes an item. Requires [`PermissionKind::Remove`].
    pub fn remove_item(&mut self, id: ItemId) -> CoreResult<()> {
        self.allow(PermissionKind::Remove)?.remove_item(id)
    }

    /// Removes every item. Requires [`PermissionKind::Remove`].
    pub fn clear(&mut self) -> CoreResult<()> {
        self.allow(PermissionKind::Remove)?.clear()
    }

    /// Metadata for pulling changes. Requires [`PermissionKind::Get`].
    pub fn meta_items(&mut self) -> CoreResult<Vec<MetaItem>> {
        self.allow(PermissionKind::Get)?.meta_items()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use parking_lot::Mutex;

    fn note() -> Arc<Schema> {
        Schema::builder("Note")
            .attribute(Attribute::string("text", ""))
            .build()
            .unwrap()
    }

    fn setup() -> (UserDatabase, ContainerId, Arc<Schema>) {
        let schema = note();
        let mut db = UserDatabase::in_memory().unwrap();
        let notes = db.register(schema.clone()).unwrap();
        db.open().unwrap();
        (db, notes, schema)
    }

    #[test]
    fn acl_types_come_first() {
        let (db, notes, _) = setup();
        let tables: Vec<_> = db
            .database()
            .containers()
            .map(|(_, s)| s.table().to_owned())
            .collect();
        assert_eq!(
            tables,
            ["users", "groups", "permissions", "memberships", "permissionassignments", "notes"]
        );
        assert_eq!(notes, ContainerId(5));
    }

    #[test]
    fn seeding_posts_no_item_events() {
        let (mut db, notes, schema) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for container in [USERS, GROUPS, PERMISSIONS, MEMBERSHIPS, PERMISSION_ASSIGNMENTS, notes] {
            let sink = Arc::clone(&seen);
            db.database_mut()
                .container(container)
                .unwrap()
                .subscribe(move |event| sink.lock().push(event.clone()));
        }

        db.init_admin_group("admin", "secret", "admins").unwrap();
        let reader = db.add_user("reader", "pw").unwrap();
        let readers = db.add_group("readers").unwrap();
        db.add_membership(reader, readers).unwrap();
        db.grant(readers, notes, PermissionKind::Get).unwrap();
        assert!(seen.lock().is_empty());
        assert_eq!(db.database_mut().container(USERS).unwrap().item_count().unwrap(), 2);

        let id = db
            .database_mut()
            .container(notes)
            .unwrap()
            .add_item(Record::build(&schema, [("text", "hi")]).unwrap())
            .unwrap();
        assert_eq!(*seen.lock(), [Event::ItemAdded { container: notes, id }]);
    }

    #[test]
    fn wrap_refuses_populated_database() {
        let mut db = Database::in_memory();
        db.register(note()).unwrap();
        assert!(UserDatabase::wrap(db).is_err());
    }

    #[test]
    fn check_user_requires_exact_password() {
        let (mut db, _, _) = setup();
        let id = db.add_user("admin", "secret").unwrap();
        assert_eq!(db.check_user("admin", "secret").unwrap(), id);
        assert!(matches!(
            db.check_user("admin", "Secret"),
            Err(CoreError::Authentication { .. })
        ));
        assert!(matches!(
            db.check_user("nobody", "secret"),
            Err(CoreError::Authentication { .. })
        ));
    }

    #[test]
    fn admin_group_holds_every_permission() {
        let (mut db, notes, _) = setup();
        let (admin, _) = db.init_admin_group("admin", "pw", "admins").unwrap();
        for container in [USERS, PERMISSIONS, notes] {
            for kind in PermissionKind::ALL {
                db.check_user_permissions(admin, container, kind).unwrap();
            }
        }
        // 6 containers, 4 kinds
        assert_eq!(db.database_mut().container(PERMISSIONS).unwrap().item_count().unwrap(), 24);
    }

    #[test]
    fn grant_through_group_opens_gate() {
        let (mut db, notes, schema) = setup();
        let user = db.add_user("reader", "pw").unwrap();
        let group = db.add_group("readers").unwrap();
        let id = db
            .database_mut()
            .container(notes)
            .unwrap()
            .add_item(Record::build(&schema, [("text", "hello")]).unwrap())
            .unwrap();

        let err = db.container(user, notes).unwrap().get_item(id).unwrap_err();
        assert!(matches!(err, CoreError::Permission { .. }));

        db.add_membership(user, group).unwrap();
        db.grant(group, notes, PermissionKind::Get).unwrap();
        let note = db.container(user, notes).unwrap().get_item(id).unwrap();
        assert_eq!(note.get_str("text"), Some("hello"));

        let err = db.container(user, notes).unwrap().remove_item(id).unwrap_err();
        assert!(matches!(err, CoreError::Permission { .. }));
    }

    #[test]
    fn permission_is_per_container() {
        let (mut db, notes, _) = setup();
        let user = db.add_user("u", "pw").unwrap();
        let group = db.add_group("g").unwrap();
        db.add_membership(user, group).unwrap();
        db.grant(group, GROUPS, PermissionKind::Add).unwrap();
        assert!(db.check_user_permissions(user, GROUPS, PermissionKind::Add).is_ok());
        assert!(db.check_user_permissions(user, notes, PermissionKind::Add).is_err());
        assert!(db.check_user_permissions(user, GROUPS, PermissionKind::Get).is_err());
    }

    #[test]
    fn connections_track_users() {
        let (mut db, _, _) = setup();
        let user = db.add_user("u", "pw").unwrap();
        let conn = db.add_connection("u", "pw").unwrap();
        assert_eq!(db.connection_user(conn).unwrap(), user);
        assert!(db.add_connection("u", "nope").is_err());

        db.close_connection(conn).unwrap();
        assert!(db.connection_user(conn).is_err());
        assert!(db.close_connection(conn).is_err());
    }

    #[test]
    fn permission_kind_wire_values() {
        assert_eq!(PermissionKind::Remove.as_i8(), 3);
        assert_eq!(PermissionKind::from_i8(1), Some(PermissionKind::Get));
        assert_eq!(PermissionKind::from_i8(4), None);
    }
}
