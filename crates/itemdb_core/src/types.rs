//! Core type definitions for ItemDB.

use std::fmt;

/// Identifier of a stored item within its container.
pub type ItemId = i32;

/// Identifier carried by an item that has not been persisted yet.
///
/// A stored item never carries this id.
pub const UNASSIGNED_ID: ItemId = -1;

/// Identifier for a container (one per registered record type).
///
/// Container IDs are assigned in registration order and double as the
/// container selector byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContainerId(pub u8);

impl ContainerId {
    /// Highest usable id; `0xFF` is reserved for database-level requests.
    pub const MAX: ContainerId = ContainerId(0xFE);

    /// Creates a new container ID.
    #[must_use]
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Returns the id as an index into registration order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_id_display() {
        let c = ContainerId::new(7);
        assert_eq!(format!("{c}"), "container:7");
        assert_eq!(c.index(), 7);
    }

    #[test]
    fn container_id_ordering() {
        assert!(ContainerId::new(1) < ContainerId::new(2));
        assert!(ContainerId::new(0xFE) == ContainerId::MAX);
    }
}
