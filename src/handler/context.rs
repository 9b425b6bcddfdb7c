//! Request context for the responding side.
//!
//! Every inbound request envelope becomes an [`IncomingRequest`]. Answering
//! it consumes the value, so at most one response envelope can be written
//! per request:
//! - `respond` - serialize a payload and answer successfully
//! - `respond_value` - answer with a ready `serde_json::Value`
//! - `fail` - answer with an error and a `null` payload
//! - `respond_with` - answer with an optional error and a payload
//!
//! Requests that are dropped unanswered are not reported to the peer; the
//! requester's own timeout covers them.
//!
//! # Example
//!
//! ```ignore
//! while let Some(request) = requests.recv().await {
//!     match request.payload().as_str() {
//!         Some("ping") => request.respond(&"pong")?,
//!         _ => request.fail("unsupported")?,
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::channel::Channel;
use crate::codec::RemoteError;
use crate::envelope::Envelope;
use crate::error::Result;

/// A request received from the peer.
pub struct IncomingRequest {
    payload: Value,
    error: Option<RemoteError>,
    responder: Responder,
}

impl IncomingRequest {
    pub(crate) fn new(
        id: String,
        payload: Value,
        error: Option<RemoteError>,
        channel: Arc<dyn Channel>,
    ) -> Self {
        Self {
            payload,
            error,
            responder: Responder {
                id,
                channel,
                answered: false,
            },
        }
    }

    /// Correlation id chosen by the requester.
    #[inline]
    pub fn id(&self) -> &str {
        &self.responder.id
    }

    /// Request payload.
    #[inline]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Deserialize the payload into `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.payload)?)
    }

    /// Error attached to the request by the requester, if any.
    #[inline]
    pub fn error(&self) -> Option<&RemoteError> {
        self.error.as_ref()
    }

    /// Split into payload, inbound error and the one-shot responder.
    pub fn into_parts(self) -> (Value, Option<RemoteError>, Responder) {
        (self.payload, self.error, self.responder)
    }

    /// Answer with a serializable payload.
    pub fn respond<T: Serialize>(self, payload: &T) -> Result<()> {
        self.responder.respond(payload)
    }

    /// Answer with a ready JSON value.
    pub fn respond_value(self, payload: Value) -> Result<()> {
        self.responder.respond_value(payload)
    }

    /// Answer with an error and a `null` payload.
    pub fn fail(self, error: impl Into<RemoteError>) -> Result<()> {
        self.responder.fail(error)
    }

    /// Answer with an optional error and a payload.
    pub fn respond_with(self, error: Option<RemoteError>, payload: Value) -> Result<()> {
        self.responder.respond_with(error, payload)
    }
}

impl fmt::Debug for IncomingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingRequest")
            .field("id", &self.responder.id)
            .field("payload", &self.payload)
            .field("error", &self.error)
            .finish()
    }
}

/// One-shot handle that writes the response envelope for a request.
pub struct Responder {
    id: String,
    channel: Arc<dyn Channel>,
    answered: bool,
}

impl Responder {
    /// Id of the request being answered.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Answer with a serializable payload.
    pub fn respond<T: Serialize>(self, payload: &T) -> Result<()> {
        let payload = serde_json::to_value(payload)?;
        self.respond_with(None, payload)
    }

    /// Answer with a ready JSON value.
    pub fn respond_value(self, payload: Value) -> Result<()> {
        self.respond_with(None, payload)
    }

    /// Answer with an error and a `null` payload.
    pub fn fail(self, error: impl Into<RemoteError>) -> Result<()> {
        self.respond_with(Some(error.into()), Value::Null)
    }

    /// Answer with an optional error and a payload.
    pub fn respond_with(mut self, error: Option<RemoteError>, payload: Value) -> Result<()> {
        self.answered = true;
        tracing::debug!("Responding to request {}", self.id);
        let envelope = Envelope::response(self.id.as_str(), payload, error.as_ref());
        self.channel.write(envelope)
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if !self.answered {
            tracing::warn!("Request {} dropped without a response", self.id);
        }
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("id", &self.id)
            .field("answered", &self.answered)
            .finish()
    }
}
