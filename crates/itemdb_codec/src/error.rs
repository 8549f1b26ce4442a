//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Not enough bytes buffered to decode the requested value.
    #[error("unexpected end of input: needed {needed} bytes, {available} available")]
    UnexpectedEof {
        /// Bytes required by the read.
        needed: usize,
        /// Bytes remaining in the stream.
        available: usize,
    },

    /// A blob or string does not fit the 16-bit length prefix.
    #[error("blob of {len} bytes exceeds the 65535 byte limit")]
    BlobTooLong {
        /// Length of the rejected blob.
        len: usize,
    },

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// A date-time field combination that does not name a real instant.
    #[error("invalid date-time: {message}")]
    InvalidDateTime {
        /// Description of the rejected value.
        message: String,
    },

    /// A boolean byte other than 0 or 1.
    #[error("invalid boolean byte: {0:#04x}")]
    InvalidBool(u8),
}

impl CodecError {
    /// Create an invalid date-time error.
    pub fn invalid_date_time(message: impl Into<String>) -> Self {
        Self::InvalidDateTime {
            message: message.into(),
        }
    }

    /// Returns true if more input could make the failed read succeed.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::UnexpectedEof { .. })
    }
}
