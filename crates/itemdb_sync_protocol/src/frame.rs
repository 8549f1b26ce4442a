//! Length-prefixed framing.
//!
//! Every message travels as a big-endian `u16` payload length followed by
//! the payload. The decoder buffers partial input and yields complete
//! payloads only.

use crate::error::{ProtocolError, ProtocolResult};
use bytes::Bytes;
use itemdb_codec::DataStream;

/// Largest payload a frame can carry.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Bytes taken by the length prefix.
pub const FRAME_HEADER_LEN: usize = 2;

/// Prefixes `payload` with its length.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] if the payload does not fit.
pub fn encode_frame(payload: &[u8]) -> ProtocolResult<Vec<u8>> {
    let len = u16::try_from(payload.len()).map_err(|_| ProtocolError::FrameTooLarge {
        len: payload.len(),
        max: MAX_FRAME_LEN,
    })?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Incremental frame reassembly over an arbitrary byte stream.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: DataStream,
    max_len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(MAX_FRAME_LEN)
    }
}

impl FrameDecoder {
    /// Creates a decoder rejecting payloads longer than `max_len`.
    #[must_use]
    pub fn new(max_len: usize) -> Self {
        Self {
            buffer: DataStream::new(),
            max_len: max_len.min(MAX_FRAME_LEN),
        }
    }

    /// Appends received bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.write_bytes(data);
    }

    /// Takes the next complete payload, or `None` if more input is needed.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FrameTooLarge`] when the announced length
    /// exceeds the limit. The decoder cannot resynchronise after that.
    pub fn next_frame(&mut self) -> ProtocolResult<Option<Bytes>> {
        let Some(len) = self.buffer.peek_u16() else {
            return Ok(None);
        };
        let len = usize::from(len);
        if len > self.max_len {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: self.max_len,
            });
        }
        if self.buffer.len() < FRAME_HEADER_LEN + len {
            return Ok(None);
        }
        self.buffer.read_u16()?;
        Ok(Some(self.buffer.read_bytes(len)?))
    }

    /// Returns true while part of a frame is buffered.
    #[must_use]
    pub fn is_mid_frame(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Bytes buffered but not yet returned.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
