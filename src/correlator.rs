//! Correlator builder and dispatch.
//!
//! The [`CorrelatorBuilder`] configures the request timeout and binds a
//! [`Channel`]. The resulting [`Correlator`] plays both roles on one
//! connection:
//! 1. `send*` issues a request envelope and tracks it until it settles
//! 2. `handle_incoming` routes arriving messages: responses settle pending
//!    requests, requests go to [`IncomingRequests`], anything untagged is
//!    handed back
//! 3. `close` fails whatever is still pending
//!
//! # Example
//!
//! ```ignore
//! use replywire::Correlator;
//! use std::time::Duration;
//!
//! let (correlator, mut requests) = Correlator::builder()
//!     .timeout(Duration::from_millis(200))
//!     .build(channel);
//!
//! // host read loop
//! while let Some(message) = incoming.recv().await {
//!     if let Dispatch::Passthrough(message) = correlator.handle_incoming(message) {
//!         app_messages.send(message)?;
//!     }
//! }
//! correlator.close();
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::channel::Channel;
use crate::codec::RemoteError;
use crate::config::CorrelatorConfig;
use crate::envelope::{self, Envelope, Inbound};
use crate::error::{ReplywireError, Result};
use crate::handler::{IncomingRequest, IncomingRequests};
use crate::pending::{Completion, PendingRequests, RequestId};

/// Builder for a [`Correlator`].
#[derive(Debug, Clone, Default)]
pub struct CorrelatorBuilder {
    config: CorrelatorConfig,
}

impl CorrelatorBuilder {
    /// Create a builder with the default 10 second timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: CorrelatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the request timeout.
    ///
    /// Default: 10 seconds
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the request timeout in milliseconds. `0` selects the default.
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.timeout_ms = timeout_ms;
        self
    }

    /// Bind the correlator to `channel`.
    ///
    /// Returns the correlator and the stream of requests the peer sends.
    pub fn build<C: Channel>(self, channel: C) -> (Correlator, IncomingRequests) {
        self.build_shared(Arc::new(channel))
    }

    /// Bind the correlator to an already shared channel.
    pub fn build_shared(self, channel: Arc<dyn Channel>) -> (Correlator, IncomingRequests) {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let correlator = Correlator {
            inner: Arc::new(Inner {
                channel,
                pending: PendingRequests::new(),
                config: self.config,
                requests: requests_tx,
            }),
        };
        (correlator, IncomingRequests::new(requests_rx))
    }
}

/// What [`Correlator::handle_incoming`] did with a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// The message belonged to the correlation protocol.
    Consumed,
    /// Not a protocol message; returned untouched.
    Passthrough(Value),
}

impl Dispatch {
    /// Whether the correlator kept the message.
    pub fn is_consumed(&self) -> bool {
        matches!(self, Dispatch::Consumed)
    }
}

struct Inner {
    channel: Arc<dyn Channel>,
    pending: Arc<PendingRequests>,
    config: CorrelatorConfig,
    requests: mpsc::UnboundedSender<IncomingRequest>,
}

/// Request/response correlation for one connection.
///
/// Cheap to clone. When the last clone is dropped every outstanding request
/// fails with [`ReplywireError::ConnectionClosed`].
#[derive(Clone)]
pub struct Correlator {
    inner: Arc<Inner>,
}

impl Correlator {
    /// Create a new correlator builder.
    pub fn builder() -> CorrelatorBuilder {
        CorrelatorBuilder::new()
    }

    /// Shortcut for `Correlator::builder().config(config).build(channel)`.
    pub fn new<C: Channel>(channel: C, config: CorrelatorConfig) -> (Self, IncomingRequests) {
        CorrelatorBuilder::new().config(config).build(channel)
    }

    /// Effective configuration.
    pub fn config(&self) -> &CorrelatorConfig {
        &self.inner.config
    }

    /// Effective request timeout.
    pub fn timeout(&self) -> Duration {
        self.inner.config.timeout()
    }

    /// Send a request and return a future for its outcome.
    ///
    /// The envelope is written before this returns. Dropping the future does
    /// not cancel the request; its slot is released on response, timeout or
    /// close.
    pub fn send(&self, payload: Value) -> ResponseFuture {
        self.send_with_timeout(payload, self.timeout())
    }

    /// Like [`send`](Self::send) with a per-call timeout.
    ///
    /// A zero timeout selects the configured one, matching `timeout_ms = 0`
    /// in [`CorrelatorConfig`].
    pub fn send_with_timeout(&self, payload: Value, timeout: Duration) -> ResponseFuture {
        let timeout = if timeout.is_zero() {
            self.timeout()
        } else {
            timeout
        };
        let (tx, rx) = oneshot::channel();
        let id = self.issue(
            payload,
            timeout,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        ResponseFuture { id, rx }
    }

    /// Send a request and wait for the response payload.
    pub async fn send_and_wait(&self, payload: Value) -> Result<Value> {
        self.send(payload).await
    }

    /// Send a serializable request and deserialize the response payload.
    pub async fn request<T, R>(&self, payload: &T) -> Result<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_value(payload)?;
        let response = self.send(payload).await?;
        Ok(R::deserialize(response)?)
    }

    /// Send a request and invoke `callback` exactly once with its outcome.
    ///
    /// The callback may run on the calling thread (closed connection, write
    /// failure), on the dispatching thread, or on a timer task.
    pub fn write_and_wait<F>(&self, payload: Value, callback: F) -> RequestId
    where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        self.issue(payload, self.timeout(), Box::new(callback))
    }

    fn issue(&self, payload: Value, timeout: Duration, completion: Completion) -> RequestId {
        let id = RequestId::generate();
        if !self.inner.pending.register(id.clone(), completion, timeout) {
            tracing::debug!("Connection closed, request {} not sent", id);
            return id;
        }

        tracing::debug!("Sending request {}", id);
        if let Err(e) = self.inner.channel.write(Envelope::request(id.as_str(), payload)) {
            tracing::warn!("Failed to write request {}: {}", id, e);
            self.inner.pending.cancel(id.as_str(), e);
        }
        id
    }

    /// Route one arriving message.
    ///
    /// Tagged messages are always consumed, including malformed ones, which
    /// are dropped. Anything else comes back as [`Dispatch::Passthrough`].
    pub fn handle_incoming(&self, message: Value) -> Dispatch {
        match envelope::classify(message) {
            Inbound::Foreign(message) => Dispatch::Passthrough(message),
            Inbound::Malformed => {
                tracing::trace!("Dropping tagged message without a usable id");
                Dispatch::Consumed
            }
            Inbound::Request { id, payload, error } => {
                self.dispatch_request(id, payload, error);
                Dispatch::Consumed
            }
            Inbound::Response { id, payload, error } => {
                self.dispatch_response(id, payload, error);
                Dispatch::Consumed
            }
        }
    }

    fn dispatch_request(&self, id: String, payload: Value, error: Option<Value>) {
        tracing::debug!("Received request {}", id);
        let error = error.map(RemoteError::from_wire);
        let request = IncomingRequest::new(id, payload, error, self.inner.channel.clone());
        if let Err(rejected) = self.inner.requests.send(request) {
            tracing::warn!(
                "No listener for incoming requests, dropping request {}",
                rejected.0.id()
            );
        }
    }

    fn dispatch_response(&self, id: String, payload: Value, error: Option<Value>) {
        let result = match error {
            Some(error) => Err(ReplywireError::Remote {
                error: RemoteError::from_wire(error),
                payload,
            }),
            None => Ok(payload),
        };
        if self.inner.pending.resolve(&id, result) {
            tracing::debug!("Resolved request {}", id);
        } else {
            tracing::trace!("Ignoring response for unknown request {}", id);
        }
    }

    /// Fail every pending request with [`ReplywireError::ConnectionClosed`].
    ///
    /// Later sends complete immediately with the same error. Returns the
    /// number of requests failed.
    pub fn close(&self) -> usize {
        let drained = self.inner.pending.drain_all(ReplywireError::ConnectionClosed);
        if drained > 0 {
            tracing::debug!("Connection closed with {} pending requests", drained);
        }
        drained
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.inner.pending.is_closed()
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }
}

impl fmt::Debug for Correlator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correlator")
            .field("config", &self.inner.config)
            .field("pending", &self.inner.pending.len())
            .field("closed", &self.inner.pending.is_closed())
            .finish()
    }
}

/// Outcome of a request sent with [`Correlator::send`].
#[derive(Debug)]
pub struct ResponseFuture {
    id: RequestId,
    rx: oneshot::Receiver<Result<Value>>,
}

impl ResponseFuture {
    /// Id of the request on the wire.
    pub fn id(&self) -> &RequestId {
        &self.id
    }
}

impl Future for ResponseFuture {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ReplywireError::ConnectionClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}
