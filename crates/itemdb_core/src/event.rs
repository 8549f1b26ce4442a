//! Change notifications posted to listeners.
//!
//! Events are posted synchronously, after the engine has accepted the
//! mutation. Listeners run on the caller's thread and cannot fail.
//!
//! ```
//! use itemdb_core::{Database, Event};
//! use std::sync::{Arc, Mutex};
//!
//! let mut db = Database::in_memory();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! db.subscribe(move |event: &Event| sink.lock().unwrap().push(event.clone()));
//!
//! db.open().unwrap();
//! assert_eq!(seen.lock().unwrap()[0], Event::Opened { newly_created: true });
//! ```

use crate::types::{ContainerId, ItemId};

/// A completed mutation or lifecycle change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The database was opened.
    Opened {
        /// True if the backing store did not exist before.
        newly_created: bool,
    },
    /// The database was closed.
    Closed,
    /// A record type was registered.
    ContainerAdded {
        /// New container.
        container: ContainerId,
        /// Its table name.
        table: String,
    },
    /// An item was added with a fresh id.
    ItemAdded {
        /// Container.
        container: ContainerId,
        /// Assigned id.
        id: ItemId,
    },
    /// An item was inserted at its own id.
    ItemInserted {
        /// Container.
        container: ContainerId,
        /// Item id.
        id: ItemId,
    },
    /// An item was read.
    ItemRead {
        /// Container.
        container: ContainerId,
        /// Item id.
        id: ItemId,
    },
    /// An item was overwritten.
    ItemSet {
        /// Container.
        container: ContainerId,
        /// Item id.
        id: ItemId,
    },
    /// An item was removed.
    ItemRemoved {
        /// Container.
        container: ContainerId,
        /// Item id.
        id: ItemId,
    },
    /// Several items were added.
    ItemsAdded {
        /// Container.
        container: ContainerId,
        /// Assigned ids, in input order.
        ids: Vec<ItemId>,
    },
    /// Several items were inserted.
    ItemsInserted {
        /// Container.
        container: ContainerId,
        /// Item ids.
        ids: Vec<ItemId>,
    },
    /// Several items were read.
    ItemsRead {
        /// Container.
        container: ContainerId,
        /// Item ids.
        ids: Vec<ItemId>,
    },
    /// Several items were overwritten.
    ItemsSet {
        /// Container.
        container: ContainerId,
        /// Item ids.
        ids: Vec<ItemId>,
    },
    /// Several items were removed.
    ItemsRemoved {
        /// Container.
        container: ContainerId,
        /// Item ids.
        ids: Vec<ItemId>,
    },
    /// A filter ran.
    ItemsFiltered {
        /// Container.
        container: ContainerId,
        /// Ids that matched.
        ids: Vec<ItemId>,
    },
    /// Every item was removed.
    Cleared {
        /// Container.
        container: ContainerId,
    },
    /// The container pulled remote changes.
    Updated {
        /// Container.
        container: ContainerId,
    },
}

impl Event {
    /// The container the event concerns, if any.
    #[must_use]
    pub fn container(&self) -> Option<ContainerId> {
        match self {
            Self::Opened { .. } | Self::Closed => None,
            Self::ContainerAdded { container, .. }
            | Self::ItemAdded { container, .. }
            | Self::ItemInserted { container, .. }
            | Self::ItemRead { container, .. }
            | Self::ItemSet { container, .. }
            | Self::ItemRemoved { container, .. }
            | Self::ItemsAdded { container, .. }
            | Self::ItemsInserted { container, .. }
            | Self::ItemsRead { container, .. }
            | Self::ItemsSet { container, .. }
            | Self::ItemsRemoved { container, .. }
            | Self::ItemsFiltered { container, .. }
            | Self::Cleared { container }
            | Self::Updated { container } => Some(*container),
        }
    }

    /// Ids of the items the event concerns.
    #[must_use]
    pub fn item_ids(&self) -> &[ItemId] {
        match self {
            Self::ItemAdded { id, .. }
            | Self::ItemInserted { id, .. }
            | Self::ItemRead { id, .. }
            | Self::ItemSet { id, .. }
            | Self::ItemRemoved { id, .. } => std::slice::from_ref(id),
            Self::ItemsAdded { ids, .. }
            | Self::ItemsInserted { ids, .. }
            | Self::ItemsRead { ids, .. }
            | Self::ItemsSet { ids, .. }
            | Self::ItemsRemoved { ids, .. }
            | Self::ItemsFiltered { ids, .. } => ids,
            _ => &[],
        }
    }
}

/// A callback receiving events.
pub type Listener = Box<dyn FnMut(&Event) + Send>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct Listeners {
    next: u64,
    entries: Vec<(ListenerId, Listener)>,
}

impl Listeners {
    pub(crate) fn add(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next);
        self.next += 1;
        self.entries.push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn post(&mut self, event: &Event) {
        for (_, listener) in &mut self.entries {
            listener(event);
        }
    }
}
