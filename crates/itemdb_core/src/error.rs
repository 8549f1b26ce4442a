//! Error types for ItemDB core.

use crate::types::ItemId;
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Failure modes of the sync transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkErrorKind {
    /// No live connection to the server.
    NotConnected,
    /// A request was used outside the state it was issued for.
    RequestWrongState,
    /// The stream ended part way through a frame.
    IncompleteRead,
    /// No matching response arrived in time.
    Timeout,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotConnected => "not connected",
            Self::RequestWrongState => "request in wrong state",
            Self::IncompleteRead => "incomplete read",
            Self::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in ItemDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Snapshot storage error.
    #[error("storage error: {0}")]
    Storage(#[from] itemdb_storage::StorageError),

    /// Wire codec error.
    #[error("codec error: {0}")]
    Codec(#[from] itemdb_codec::CodecError),

    /// I/O error, including truncated or corrupt snapshots.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// SQL backend error.
    #[error("sql error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// The store is not open.
    #[error("access error: {message}")]
    Access {
        /// What was attempted.
        message: String,
    },

    /// No item with this id exists.
    #[error("item {id} does not exist in {container}")]
    ItemNotFound {
        /// Table name of the container.
        container: String,
        /// The missing id.
        id: ItemId,
    },

    /// An item with this id already exists.
    #[error("item {id} already exists in {container}")]
    ItemExists {
        /// Table name of the container.
        container: String,
        /// The occupied id.
        id: ItemId,
    },

    /// Unknown user or wrong password.
    #[error("authentication failed for user {user:?}")]
    Authentication {
        /// The user name presented.
        user: String,
    },

    /// The acting user lacks the required permission.
    #[error("permission denied: {message}")]
    Permission {
        /// Which permission was missing.
        message: String,
    },

    /// Sync transport failure.
    #[error("network error ({kind}): {message}")]
    Network {
        /// Failure mode.
        kind: NetworkErrorKind,
        /// Additional context.
        message: String,
    },

    /// Invalid schema definition.
    #[error("schema error: {message}")]
    Schema {
        /// Description of the problem.
        message: String,
    },

    /// A record failed construction or validation.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the failure.
        message: String,
    },

    /// Container not registered.
    #[error("container not found: {name}")]
    ContainerNotFound {
        /// Name or id of the container.
        name: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an access error.
    pub fn access(message: impl Into<String>) -> Self {
        Self::Access {
            message: message.into(),
        }
    }

    /// Creates an item-not-found error.
    pub fn item_not_found(container: impl Into<String>, id: ItemId) -> Self {
        Self::ItemNotFound {
            container: container.into(),
            id,
        }
    }

    /// Creates an item-already-exists error.
    pub fn item_exists(container: impl Into<String>, id: ItemId) -> Self {
        Self::ItemExists {
            container: container.into(),
            id,
        }
    }

    /// Creates a permission error.
    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission {
            message: message.into(),
        }
    }

    /// Creates a network error.
    pub fn network(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self::Network {
            kind,
            message: message.into(),
        }
    }

    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an I/O error for a snapshot that cannot be decoded.
    pub fn corrupt_snapshot(message: impl Into<String>) -> Self {
        Self::Io(io::Error::new(io::ErrorKind::InvalidData, message.into()))
    }

    /// Returns true for item-not-found and item-already-exists errors.
    #[must_use]
    pub fn is_item_error(&self) -> bool {
        matches!(self, Self::ItemNotFound { .. } | Self::ItemExists { .. })
    }

    /// Returns true if this is an item-not-found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ItemNotFound { .. })
    }

    /// Returns true if this is an item-already-exists error.
    #[must_use]
    pub fn is_exists(&self) -> bool {
        matches!(self, Self::ItemExists { .. })
    }

    /// Returns true for transport failures.
    #[must_use]
    pub fn is_network_error(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Returns the network failure mode, if this is a network error.
    #[must_use]
    pub fn network_kind(&self) -> Option<NetworkErrorKind> {
        match self {
            Self::Network { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
