//! Error types for the sync server.

use itemdb_core::CoreError;
use itemdb_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Malformed frame or message from a client.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Failure in the authoritative database.
    #[error("database error: {0}")]
    Database(#[from] CoreError),

    /// The dispatcher is gone.
    #[error("server is shutting down")]
    Shutdown,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if the client sent something the server cannot accept.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ServerError::Protocol(_))
    }

    /// Returns true for failures on the server side.
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        let protocol = ServerError::from(ProtocolError::UnknownStatus(9));
        assert!(protocol.is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(ServerError::Shutdown.is_server_error());
    }

    #[test]
    fn error_display() {
        let err = ServerError::from(CoreError::access("closed"));
        assert!(err.to_string().contains("closed"));
    }
}
