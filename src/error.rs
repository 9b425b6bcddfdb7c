//! Error types for replywire.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::codec::RemoteError;

/// Main error type for all replywire operations.
///
/// Errors are delivered through per-request completions, and a single
/// teardown error is fanned out to every pending request, so the type is
/// `Clone`. Non-clonable sources are kept behind an `Arc` or flattened to
/// their message.
#[derive(Debug, Clone, Error)]
pub enum ReplywireError {
    /// No response arrived before the request deadline.
    #[error("timedout after {timeout_ms}ms")]
    Timeout {
        /// The timeout that was in effect for the request.
        timeout_ms: u64,
    },

    /// The responder answered with an application error.
    #[error("remote error: {error}")]
    Remote {
        /// Error reconstructed from the response envelope.
        error: RemoteError,
        /// Payload that accompanied the error (usually `null`).
        payload: Value,
    },

    /// The connection was torn down before a response arrived.
    #[error("Connection closed")]
    ConnectionClosed,

    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(String),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(String),

    /// Protocol error (oversized frame, invalid header, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Backpressure timeout - write buffer full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,
}

impl ReplywireError {
    /// Returns `true` for [`ReplywireError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns the remote error if the responder failed the request.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ReplywireError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for ReplywireError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for ReplywireError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Self::MsgPackEncode(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for ReplywireError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Self::MsgPackDecode(e.to_string())
    }
}

/// Result type alias using ReplywireError.
pub type Result<T> = std::result::Result<T, ReplywireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_mentions_value() {
        let err = ReplywireError::Timeout { timeout_ms: 200 };
        assert!(err.to_string().contains("timedout"));
        assert!(err.to_string().contains("200"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_io_error_is_clonable() {
        let err: ReplywireError =
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        let copy = err.clone();
        assert!(matches!(copy, ReplywireError::Io(_)));
        assert!(copy.to_string().contains("gone"));
    }

    #[test]
    fn test_remote_accessor() {
        let err = ReplywireError::Remote {
            error: RemoteError::new("boom"),
            payload: Value::Null,
        };
        assert_eq!(err.remote().map(|e| e.message()), Some("boom"));
        assert!(ReplywireError::ConnectionClosed.remote().is_none());
    }
}
