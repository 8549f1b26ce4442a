//! Error types for the sync engine.

use itemdb_core::{CoreError, NetworkErrorKind};
use itemdb_sync_protocol::{ProtocolError, RemoteError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Socket failure.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Malformed frame or message.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Local database error during sync.
    #[error("database error: {0}")]
    Database(#[from] CoreError),

    /// The server answered with an error.
    #[error("server error: {0}")]
    Remote(RemoteError),

    /// No response arrived in time.
    #[error("request {correlation} timed out")]
    Timeout {
        /// Correlation id of the abandoned request.
        correlation: u16,
    },

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,

    /// The server closed the socket part way through a frame.
    #[error("connection closed mid-frame")]
    IncompleteRead,

    /// Every correlation id is in flight.
    #[error("no free request id")]
    RequestIdsExhausted,

    /// The server sent a reply of the wrong kind.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Converts to a core error; `container` names the addressed table for
    /// item errors reported by the server.
    pub fn into_core_error(self, container: &str) -> CoreError {
        match self {
            SyncError::Database(err) => err,
            SyncError::Remote(remote) => remote.into_core_error(container),
            SyncError::Timeout { correlation } => {
                CoreError::network(NetworkErrorKind::Timeout, format!("request {correlation}"))
            }
            SyncError::IncompleteRead => {
                CoreError::network(NetworkErrorKind::IncompleteRead, "connection closed mid-frame")
            }
            SyncError::RequestIdsExhausted => {
                CoreError::network(NetworkErrorKind::RequestWrongState, "no free request id")
            }
            SyncError::NotConnected => {
                CoreError::network(NetworkErrorKind::NotConnected, "not connected to server")
            }
            SyncError::Transport { message, .. } => {
                CoreError::network(NetworkErrorKind::NotConnected, message)
            }
            SyncError::Protocol(err) => CoreError::invalid_operation(err.to_string()),
            SyncError::UnexpectedReply(reply) => {
                CoreError::network(NetworkErrorKind::RequestWrongState, reply)
            }
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let retryable = matches!(
            err.kind(),
            ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::TimedOut
                | ErrorKind::Interrupted
        );
        Self::Transport {
            message: err.to_string(),
            retryable,
        }
    }
}

impl From<SyncError> for CoreError {
    fn from(err: SyncError) -> Self {
        err.into_core_error("remote")
    }
}
