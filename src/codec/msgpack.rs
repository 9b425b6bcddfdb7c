//! MsgPack body codec using `rmp-serde`.
//!
//! Stream frames carry one message each, encoded as MessagePack.
//! Always use `to_vec_named`: envelopes are structs, and peers written in
//! JavaScript expect them as maps keyed by field name, not positional arrays.
//!
//! # Example
//!
//! ```
//! use replywire::codec::MsgPackCodec;
//! use serde_json::json;
//!
//! let message = json!({ "plugin": "chat", "text": "hi" });
//! let bytes = MsgPackCodec::encode(&message).unwrap();
//! let back: serde_json::Value = MsgPackCodec::decode(&bytes).unwrap();
//! assert_eq!(back, message);
//! ```

use serde_json::Value;

use crate::error::Result;

/// MessagePack codec for channel messages.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map format).
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Decode a frame body into a generic message.
    ///
    /// Every frame on the stream is decoded this way first; only then does
    /// the correlator decide whether it belongs to this layer.
    #[inline]
    pub fn decode_message(bytes: &[u8]) -> Result<Value> {
        Self::decode(bytes)
    }
}
