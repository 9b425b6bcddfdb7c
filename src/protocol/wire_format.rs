//! Wire format for the stream host.
//!
//! Every message is one frame: a length header followed by a MsgPack body.
//! ```text
//! ┌──────────┬──────────────────────┐
//! │ Length   │ MsgPack body         │
//! │ 4 bytes  │ `Length` bytes       │
//! │ uint32 BE│                      │
//! └──────────┴──────────────────────┘
//! ```

use crate::error::{ReplywireError, Result};

/// Header size in bytes (fixed, exactly 4).
pub const HEADER_SIZE: usize = 4;

/// Default maximum frame body size (16 MB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Absolute maximum frame body size (~2 GB, max i32).
pub const ABSOLUTE_MAX_FRAME_SIZE: u32 = 2_147_483_647;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Body length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(payload_length: u32) -> Self {
        Self { payload_length }
    }

    /// Header for a body of `len` bytes.
    ///
    /// Fails if `len` exceeds [`ABSOLUTE_MAX_FRAME_SIZE`].
    pub fn for_body(len: usize) -> Result<Self> {
        match u32::try_from(len) {
            Ok(n) if n <= ABSOLUTE_MAX_FRAME_SIZE => Ok(Self::new(n)),
            _ => Err(ReplywireError::Protocol(format!(
                "Frame size {} exceeds maximum {}",
                len, ABSOLUTE_MAX_FRAME_SIZE
            ))),
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use replywire::protocol::Header;
    ///
    /// let bytes = Header::new(258).encode();
    /// assert_eq!(bytes, [0, 0, 1, 2]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        self.payload_length.to_be_bytes()
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let bytes: [u8; HEADER_SIZE] = buf.get(..HEADER_SIZE)?.try_into().ok()?;
        Some(Self::new(u32::from_be_bytes(bytes)))
    }

    /// Check the body length against `max_frame_size`.
    ///
    /// Empty bodies are rejected: every frame carries one MsgPack value.
    pub fn validate(&self, max_frame_size: u32) -> Result<()> {
        if self.payload_length == 0 {
            return Err(ReplywireError::Protocol("Empty frame".to_string()));
        }

        if self.payload_length > max_frame_size {
            return Err(ReplywireError::Protocol(format!(
                "Frame size {} exceeds maximum {}",
                self.payload_length, max_frame_size
            )));
        }

        Ok(())
    }
}
