//! Channel seam.
//!
//! The correlator never owns a transport. It is handed something that can
//! write envelopes, and the host feeds arriving messages into
//! [`Correlator::handle_incoming`](crate::Correlator::handle_incoming).
//!
//! [`MemoryChannel::pair`] connects two endpoints inside one process, which
//! is what the tests use and is handy when both sides live in the same
//! binary.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::correlator::{Correlator, CorrelatorBuilder, Dispatch};
use crate::envelope::Envelope;
use crate::error::{ReplywireError, Result};
use crate::handler::IncomingRequests;

/// Outgoing side of a message channel.
pub trait Channel: Send + Sync + 'static {
    /// Submit one envelope for delivery.
    ///
    /// Delivery guarantees are whatever the underlying channel provides.
    fn write(&self, envelope: Envelope) -> Result<()>;
}

impl<F> Channel for F
where
    F: Fn(Envelope) -> Result<()> + Send + Sync + 'static,
{
    fn write(&self, envelope: Envelope) -> Result<()> {
        self(envelope)
    }
}

/// Writes messages into an in-process queue read by the peer endpoint.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    tx: mpsc::UnboundedSender<Value>,
}

impl MemoryChannel {
    /// Create two connected endpoints.
    pub fn pair() -> (MemoryEndpoint, MemoryEndpoint) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            MemoryEndpoint {
                channel: MemoryChannel { tx: b_tx },
                incoming: a_rx,
            },
            MemoryEndpoint {
                channel: MemoryChannel { tx: a_tx },
                incoming: b_rx,
            },
        )
    }

    /// Send a message that is not part of the correlation protocol.
    pub fn send_raw(&self, message: Value) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| ReplywireError::ConnectionClosed)
    }
}

impl Channel for MemoryChannel {
    fn write(&self, envelope: Envelope) -> Result<()> {
        self.send_raw(envelope.into_value())
    }
}

/// One side of an in-process connection.
#[derive(Debug)]
pub struct MemoryEndpoint {
    /// Writes to the peer.
    pub channel: MemoryChannel,
    /// Messages written by the peer.
    pub incoming: mpsc::UnboundedReceiver<Value>,
}

/// A correlator attached to a [`MemoryEndpoint`].
pub struct MemoryConnection {
    /// Correlator for this endpoint.
    pub correlator: Correlator,
    /// Requests sent by the peer.
    pub requests: IncomingRequests,
    /// Messages that do not belong to the correlation protocol.
    pub passthrough: mpsc::UnboundedReceiver<Value>,
    /// Raw sender for non-correlated traffic.
    pub raw: MemoryChannel,
    /// Dispatch loop; ends when the peer goes away.
    pub task: JoinHandle<()>,
}

impl MemoryEndpoint {
    /// Build a correlator on this endpoint and spawn its dispatch loop.
    ///
    /// When the peer endpoint is dropped the loop closes the correlator,
    /// failing every pending request with `ConnectionClosed`.
    pub fn attach(self, builder: CorrelatorBuilder) -> MemoryConnection {
        let raw = self.channel.clone();
        let (correlator, requests) = builder.build(self.channel);
        let (passthrough_tx, passthrough) = mpsc::unbounded_channel();

        let mut incoming = self.incoming;
        let dispatcher = correlator.clone();
        let task = tokio::spawn(async move {
            while let Some(message) = incoming.recv().await {
                if let Dispatch::Passthrough(message) = dispatcher.handle_incoming(message) {
                    let _ = passthrough_tx.send(message);
                }
            }
            dispatcher.close();
        });

        MemoryConnection {
            correlator,
            requests,
            passthrough,
            raw,
            task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_pair_delivers_to_peer() {
        let (a, mut b) = MemoryChannel::pair();

        a.channel
            .write(Envelope::request("r1", json!("ping")))
            .unwrap();

        let message = b.incoming.recv().await.unwrap();
        assert_eq!(message["requestId"], json!("r1"));
        assert_eq!(message["data"], json!("ping"));
    }

    #[tokio::test]
    async fn test_write_after_peer_dropped_fails() {
        let (a, b) = MemoryChannel::pair();
        drop(b);

        let result = a.channel.write(Envelope::request("r1", Value::Null));
        assert!(matches!(result, Err(ReplywireError::ConnectionClosed)));
    }

    #[test]
    fn test_closure_is_a_channel() {
        let channel = |envelope: Envelope| -> Result<()> {
            assert_eq!(envelope.id(), Some("x"));
            Ok(())
        };
        channel.write(Envelope::request("x", Value::Null)).unwrap();
    }
}
