//! Protocol module - framing for the stream host.
//!
//! This module implements the byte-level format used when a correlator runs
//! over a raw stream:
//! - 4-byte length header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Frame struct and MsgPack frame builders

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, build_frame_parts, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{Header, ABSOLUTE_MAX_FRAME_SIZE, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE};
