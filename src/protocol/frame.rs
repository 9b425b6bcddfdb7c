//! Frame struct and builders.
//!
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use replywire::protocol::{build_frame_parts, Frame};
//! use serde_json::json;
//!
//! let (header, body) = build_frame_parts(&json!({ "hello": "world" })).unwrap();
//! let frame = Frame::new(header, body);
//!
//! assert_eq!(frame.decode_message().unwrap()["hello"], "world");
//! ```

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use super::wire_format::{Header, HEADER_SIZE};
use crate::codec::MsgPackCodec;
use crate::error::Result;

/// A complete frame read from the stream.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// MsgPack body (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Decode the body into a message.
    pub fn decode_message(&self) -> Result<Value> {
        MsgPackCodec::decode_message(&self.payload)
    }
}

/// Encode `message` and return its header and body separately.
///
/// Use for scatter/gather I/O (writev), where header and body are written
/// from separate buffers.
pub fn build_frame_parts<T: Serialize + ?Sized>(message: &T) -> Result<(Header, Bytes)> {
    let body = MsgPackCodec::encode(message)?;
    let header = Header::for_body(body.len())?;
    Ok((header, Bytes::from(body)))
}

/// Encode `message` as one contiguous frame.
pub fn build_frame<T: Serialize + ?Sized>(message: &T) -> Result<Vec<u8>> {
    let (header, body) = build_frame_parts(message)?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(&body);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use serde_json::json;

    #[test]
    fn test_build_frame_layout() {
        let bytes = build_frame(&json!("hi")).unwrap();
        // fixstr "hi" is 3 bytes
        assert_eq!(&bytes[..HEADER_SIZE], &[0, 0, 0, 3]);
        assert_eq!(bytes.len(), HEADER_SIZE + 3);
    }

    #[test]
    fn test_envelope_frame_decodes_to_message() {
        let envelope = Envelope::request("r1", json!({ "n": 1 }));
        let (header, body) = build_frame_parts(&envelope).unwrap();
        assert_eq!(header.payload_length as usize, body.len());

        let frame = Frame::new(header, body);
        let message = frame.decode_message().unwrap();
        assert_eq!(message, envelope.into_value());
    }

    #[test]
    fn test_garbage_body_fails_to_decode() {
        let frame = Frame::new(Header::new(1), Bytes::from_static(&[0xc1]));
        assert!(frame.decode_message().is_err());
        assert_eq!(frame.payload_len(), 1);
    }
}
