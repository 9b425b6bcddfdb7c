//! Codec module - error and message encoding.
//!
//! - [`remote_error`] - transport-safe error shape (`__isError` sentinel)
//! - [`MsgPackCodec`] - MessagePack body encoding used by the stream host
//!
//! # Example
//!
//! ```
//! use replywire::codec::{decode, encode, RemoteError};
//!
//! let wire = encode(&RemoteError::new("boom"));
//! assert_eq!(decode(wire).into_error().unwrap().message(), "boom");
//! ```

mod msgpack;
pub mod remote_error;

pub use msgpack::MsgPackCodec;
pub use remote_error::{
    contains_encoded_error, decode, encode, RemoteError, Revived,
    DEFAULT_ERROR_NAME, ERROR_SENTINEL,
};
