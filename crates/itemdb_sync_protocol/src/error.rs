//! Error types for the sync protocol.

use itemdb_codec::CodecError;
use itemdb_core::CoreError;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while framing, encoding or decoding sync messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Primitive codec failure.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Record or metadata decoding failure.
    #[error("record error: {0}")]
    Core(#[from] CoreError),

    /// Payload longer than the frame limit.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Payload length.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// Opcode not defined for the addressed selector.
    #[error("unknown opcode {opcode:#04x} for selector {selector:#04x}")]
    UnknownOpcode {
        /// Container selector, `0xFF` for database level.
        selector: u8,
        /// Received opcode.
        opcode: u8,
    },

    /// Selector names no registered container.
    #[error("unknown container selector {0}")]
    UnknownContainer(u8),

    /// An update reply was decoded without the container's record type.
    #[error("update reply requires a record schema")]
    MissingSchema,

    /// Response status byte was neither ok nor error.
    #[error("unknown response status {0}")]
    UnknownStatus(u8),

    /// Error discriminator not defined.
    #[error("unknown error code {0}")]
    UnknownErrorCode(u8),

    /// Bytes left over after a complete message.
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    /// Batch has more entries than the count field can carry.
    #[error("batch of {0} entries exceeds u16 count")]
    BatchTooLarge(usize),
}

impl ProtocolError {
    /// Returns true if more bytes could complete the input.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        match self {
            Self::Codec(err) => err.is_incomplete(),
            Self::Core(CoreError::Codec(err)) => err.is_incomplete(),
            _ => false,
        }
    }
}
