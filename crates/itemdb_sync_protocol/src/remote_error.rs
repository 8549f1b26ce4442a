//! Errors carried inside error responses.

use crate::error::{ProtocolError, ProtocolResult};
use itemdb_codec::DataStream;
use itemdb_core::{CoreError, ItemId, UNASSIGNED_ID};
use std::fmt;

/// Discriminator of a remote error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    /// Unknown user or wrong password.
    Authentication = 1,
    /// Missing permission.
    Permission = 2,
    /// Item id not present.
    ItemNotFound = 3,
    /// Item id already taken.
    ItemExists = 4,
    /// Store closed, session not opened or unknown connection.
    Access = 5,
    /// Any other server-side failure.
    Internal = 6,
}

impl ErrorCode {
    /// Decodes a discriminator byte.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownErrorCode`] for undefined values.
    pub fn from_u8(code: u8) -> ProtocolResult<Self> {
        Ok(match code {
            1 => Self::Authentication,
            2 => Self::Permission,
            3 => Self::ItemNotFound,
            4 => Self::ItemExists,
            5 => Self::Access,
            6 => Self::Internal,
            other => return Err(ProtocolError::UnknownErrorCode(other)),
        })
    }
}

/// An error reported by the server for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// Kind of failure.
    pub code: ErrorCode,
    /// Human readable detail.
    pub detail: String,
    /// Offending item id for item errors, the sentinel otherwise.
    pub item_id: ItemId,
}

impl RemoteError {
    /// Creates an error without an item id.
    pub fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
            item_id: UNASSIGNED_ID,
        }
    }

    /// Writes code, detail and item id.
    pub fn encode(&self, stream: &mut DataStream) -> ProtocolResult<()> {
        stream.write_u8(self.code as u8);
        stream.write_string(&self.detail)?;
        stream.write_i32(self.item_id);
        Ok(())
    }

    /// Reads an error written by [`encode`](Self::encode).
    pub fn decode(stream: &mut DataStream) -> ProtocolResult<Self> {
        let code = ErrorCode::from_u8(stream.read_u8()?)?;
        let detail = stream.read_string()?;
        let item_id = stream.read_i32()?;
        Ok(Self {
            code,
            detail,
            item_id,
        })
    }

    /// Rebuilds the local error; `container` names the addressed table.
    #[must_use]
    pub fn into_core_error(self, container: &str) -> CoreError {
        match self.code {
            ErrorCode::Authentication => CoreError::Authentication { user: self.detail },
            ErrorCode::Permission => CoreError::permission(self.detail),
            ErrorCode::ItemNotFound => CoreError::item_not_found(container, self.item_id),
            ErrorCode::ItemExists => CoreError::item_exists(container, self.item_id),
            ErrorCode::Access => CoreError::access(self.detail),
            ErrorCode::Internal => {
                CoreError::invalid_operation(format!("server error: {}", self.detail))
            }
        }
    }
}

impl From<&CoreError> for RemoteError {
    fn from(err: &CoreError) -> Self {
        match err {
            CoreError::Authentication { user } => Self::new(ErrorCode::Authentication, user),
            CoreError::Permission { message } => Self::new(ErrorCode::Permission, message),
            CoreError::ItemNotFound { id, .. } => Self {
                code: ErrorCode::ItemNotFound,
                detail: err.to_string(),
                item_id: *id,
            },
            CoreError::ItemExists { id, .. } => Self {
                code: ErrorCode::ItemExists,
                detail: err.to_string(),
                item_id: *id,
            },
            CoreError::Access { message } => Self::new(ErrorCode::Access, message),
            other => Self::new(ErrorCode::Internal, other.to_string()),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.detail)
    }
}
