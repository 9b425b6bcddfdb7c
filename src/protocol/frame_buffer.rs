//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need at least 4 bytes
//! - `WaitingForPayload`: Header parsed, need N more body bytes
//!
//! # Example
//!
//! ```ignore
//! use replywire::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! // Data arrives in chunks from the stream
//! let frames = buffer.push(&chunk)?;
//!
//! for frame in frames {
//!     let message = frame.decode_message()?;
//! }
//! ```

use bytes::BytesMut;

use super::wire_format::{Header, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE};
use super::Frame;
use crate::error::Result;

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for complete header (need 4 bytes).
    WaitingForHeader,
    /// Header parsed, waiting for body bytes.
    WaitingForPayload { header: Header },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// All data is stored in a single `BytesMut` buffer to minimize allocations.
#[derive(Debug)]
pub struct FrameBuffer {
    /// Accumulated bytes from stream reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed body size.
    max_frame_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 64KB, max frame: 16MB.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new frame buffer with custom max frame size.
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            max_frame_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data is buffered internally for the next push.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty or oversized frame. The stream cannot
    /// be resynchronized after that. Frames completed before the bad header
    /// are still returned; the bad header stays buffered, so the error
    /// surfaces from the next [`push`](Self::push) or
    /// [`next_frame`](Self::next_frame).
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.extend(data);

        let mut frames = Vec::new();
        loop {
            match self.next_frame() {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => return Ok(frames),
                Err(e) if frames.is_empty() => return Err(e),
                Err(_) => return Ok(frames),
            }
        }
    }

    /// Append data without extracting frames.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract the next complete frame, if any.
    ///
    /// Fails without consuming anything when the next header is invalid.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.try_extract_one()
    }

    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        loop {
            match &self.state {
                State::WaitingForHeader => {
                    let Some(header) = Header::decode(&self.buffer) else {
                        return Ok(None);
                    };
                    header.validate(self.max_frame_size)?;

                    let _ = self.buffer.split_to(HEADER_SIZE);
                    self.state = State::WaitingForPayload { header };
                }

                State::WaitingForPayload { header } => {
                    let header = *header;
                    let remaining = header.payload_length as usize;
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }

                    // Zero-copy freeze
                    let payload = self.buffer.split_to(remaining).freeze();
                    self.state = State::WaitingForHeader;
                    return Ok(Some(Frame::new(header, payload)));
                }
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether a frame is partially received.
    pub fn has_partial_frame(&self) -> bool {
        !self.buffer.is_empty() || matches!(self.state, State::WaitingForPayload { .. })
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::build_frame;
    use serde_json::json;

    fn frame_bytes(message: serde_json::Value) -> Vec<u8> {
        build_frame(&message).unwrap()
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&frame_bytes(json!("hello"))).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].decode_message().unwrap(), json!("hello"));
        assert!(buffer.is_empty());
        assert!(!buffer.has_partial_frame());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();

        let mut combined = Vec::new();
        for i in 0..3 {
            combined.extend(frame_bytes(json!({ "n": i })));
        }

        let frames = buffer.push(&combined).unwrap();
        assert_eq!(frames.len(), 3);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.decode_message().unwrap()["n"], json!(i));
        }
    }

    #[test]
    fn test_fragmented_header() {
        let mut buffer = FrameBuffer::new();
        let bytes = frame_bytes(json!("test"));

        assert!(buffer.push(&bytes[..2]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");

        let frames = buffer.push(&bytes[2..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_payload() {
        let mut buffer = FrameBuffer::new();
        let bytes = frame_bytes(json!("this is a longer payload that will be fragmented"));

        let partial_len = HEADER_SIZE + 10;
        assert!(buffer.push(&bytes[..partial_len]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForPayload");
        assert!(buffer.has_partial_frame());

        let frames = buffer.push(&bytes[partial_len..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(buffer.state_name(), "WaitingForHeader");
    }

    #[test]
    fn test_empty_frame_rejected() {
        let mut buffer = FrameBuffer::new();
        let result = buffer.push(&[0, 0, 0, 0]);
        assert!(result.unwrap_err().to_string().contains("Empty frame"));
    }

    #[test]
    fn test_max_frame_size_validation() {
        let mut buffer = FrameBuffer::with_max_frame_size(100);
        let result = buffer.push(&Header::new(1000).encode());
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_frames_before_bad_header_are_kept() {
        let mut buffer = FrameBuffer::with_max_frame_size(64);
        let mut chunk = frame_bytes(json!({ "responseId": "r1" }));
        chunk.extend_from_slice(&Header::new(1024).encode());

        let frames = buffer.push(&chunk).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].decode_message().unwrap()["responseId"], "r1");

        let err = buffer.next_frame().unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
        assert!(buffer.push(&[]).is_err());
    }

    #[test]
    fn test_next_frame_walks_buffered_frames() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(&frame_bytes(json!(1)));
        buffer.extend(&frame_bytes(json!(2)));
        buffer.extend(&[0, 0, 0, 0]);

        assert_eq!(buffer.next_frame().unwrap().unwrap().decode_message().unwrap(), json!(1));
        assert_eq!(buffer.next_frame().unwrap().unwrap().decode_message().unwrap(), json!(2));
        assert!(buffer.next_frame().unwrap_err().to_string().contains("Empty frame"));
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = FrameBuffer::new();
        let bytes = frame_bytes(json!("test"));

        buffer.push(&bytes[..HEADER_SIZE + 1]).unwrap();
        assert_eq!(buffer.state_name(), "WaitingForPayload");
        assert_eq!(buffer.len(), 1);

        buffer.clear();
        assert_eq!(buffer.state_name(), "WaitingForHeader");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let bytes = frame_bytes(json!({ "plugin": "primus-callbacks", "requestId": "r1" }));

        let mut all_frames = Vec::new();
        for byte in &bytes {
            all_frames.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all_frames.len(), 1);
        assert_eq!(all_frames[0].decode_message().unwrap()["requestId"], "r1");
    }
}
