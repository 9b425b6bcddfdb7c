//! Stream host and read loop.
//!
//! [`StreamConnection::spawn`] wires a correlator onto a duplex byte stream:
//! 1. Split the stream into read and write halves
//! 2. Spawn the writer task on the write half
//! 3. Build the correlator on a channel that frames envelopes for the writer
//! 4. Spawn the read loop, which decodes frames and feeds
//!    [`Correlator::handle_incoming`]
//!
//! When the stream ends (EOF or read error) the correlator is closed, so
//! every pending request fails with `ConnectionClosed`.
//!
//! # Example
//!
//! ```ignore
//! use replywire::transport::{StreamConfig, StreamConnection};
//!
//! let socket = tokio::net::TcpStream::connect("127.0.0.1:4000").await?;
//! let (conn, requests, mut passthrough) = StreamConnection::spawn(socket, StreamConfig::default());
//!
//! let answer = conn.correlator().send_and_wait(serde_json::json!("ping")).await?;
//! conn.send_raw(&serde_json::json!({ "chat": "hi" })).await?;
//! ```

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channel::Channel;
use crate::config::CorrelatorConfig;
use crate::correlator::{Correlator, Dispatch};
use crate::envelope::Envelope;
use crate::error::{ReplywireError, Result};
use crate::handler::IncomingRequests;
use crate::protocol::{FrameBuffer, DEFAULT_MAX_FRAME_SIZE};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterConfig, WriterHandle};

/// Read buffer size per `read` call.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Messages from the peer that are not part of the correlation protocol.
pub type Passthrough = mpsc::UnboundedReceiver<Value>;

/// Configuration for a [`StreamConnection`].
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Request timeout settings.
    pub correlator: CorrelatorConfig,
    /// Writer task settings.
    pub writer: WriterConfig,
    /// Largest frame body accepted from the peer.
    pub max_frame_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            correlator: CorrelatorConfig::default(),
            writer: WriterConfig::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Channel that frames envelopes and queues them for the writer task.
struct StreamChannel {
    writer: WriterHandle,
}

impl Channel for StreamChannel {
    fn write(&self, envelope: Envelope) -> Result<()> {
        let frame = OutboundFrame::message(&envelope)?;
        self.writer.try_send(frame)
    }
}

/// A correlator running on a byte stream.
pub struct StreamConnection {
    correlator: Correlator,
    writer: WriterHandle,
    reader_task: JoinHandle<Result<()>>,
    writer_task: JoinHandle<Result<()>>,
}

impl StreamConnection {
    /// Start hosting a correlator on `io`.
    ///
    /// Returns the connection, the requests sent by the peer, and every
    /// message that is not part of the correlation protocol.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn spawn<S>(io: S, config: StreamConfig) -> (Self, IncomingRequests, Passthrough)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, write_half) = tokio::io::split(io);
        let (writer, writer_task) = spawn_writer_task(write_half, config.writer);

        let (correlator, requests) = Correlator::builder()
            .config(config.correlator)
            .build(StreamChannel {
                writer: writer.clone(),
            });

        let (passthrough_tx, passthrough) = mpsc::unbounded_channel();
        let dispatcher = correlator.clone();
        let max_frame_size = config.max_frame_size;

        let reader_task = tokio::spawn(async move {
            let result = read_loop(reader, &dispatcher, &passthrough_tx, max_frame_size).await;
            if let Err(e) = &result {
                tracing::error!("Read loop error: {}", e);
            }
            dispatcher.close();
            result
        });

        let connection = StreamConnection {
            correlator,
            writer,
            reader_task,
            writer_task,
        };
        (connection, requests, passthrough)
    }

    /// The correlator for this stream.
    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    /// Write a message outside the correlation protocol.
    ///
    /// Waits while the writer is under backpressure.
    pub async fn send_raw<T: Serialize + ?Sized>(&self, message: &T) -> Result<()> {
        let frame = OutboundFrame::message(message)?;
        self.writer.send(frame).await
    }

    /// Get the current backpressure status.
    pub fn is_backpressure_active(&self) -> bool {
        self.writer.is_backpressure_active()
    }

    /// Get the current pending frame count.
    pub fn pending_frames(&self) -> usize {
        self.writer.pending_count()
    }

    /// Wait until the peer closes the stream.
    ///
    /// Returns the read loop's error if the stream failed rather than ended.
    pub async fn wait_for_shutdown(self) -> Result<()> {
        let StreamConnection {
            correlator,
            writer,
            reader_task,
            writer_task,
        } = self;

        let result = reader_task
            .await
            .map_err(|e| ReplywireError::Protocol(format!("Read loop aborted: {}", e)))?;

        // The writer stops once the last handle is gone; responders still
        // holding the channel keep it alive.
        drop(correlator);
        drop(writer);
        if writer_task.is_finished() {
            if let Ok(Err(e)) = writer_task.await {
                tracing::debug!("Writer task ended with error: {}", e);
            }
        }
        result
    }
}

impl std::fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnection")
            .field("correlator", &self.correlator)
            .field("pending_frames", &self.writer.pending_count())
            .finish()
    }
}

/// Reads frames and dispatches each decoded message.
async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    correlator: &Correlator,
    passthrough: &mpsc::UnboundedSender<Value>,
    max_frame_size: u32,
) -> Result<()> {
    let mut frame_buffer = FrameBuffer::with_max_frame_size(max_frame_size);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => return Err(e.into()),
        };

        // Frames ahead of a bad header are dispatched before the error ends
        // the loop.
        frame_buffer.extend(&buf[..n]);
        while let Some(frame) = frame_buffer.next_frame()? {
            let message = match frame.decode_message() {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!("Dropping undecodable frame: {}", e);
                    continue;
                }
            };

            if let Dispatch::Passthrough(message) = correlator.handle_incoming(message) {
                if passthrough.send(message).is_err() {
                    tracing::trace!("No passthrough listener, dropping message");
                }
            }
        }
    }

    if frame_buffer.has_partial_frame() {
        tracing::debug!(
            "Stream ended inside a frame, {} bytes discarded",
            frame_buffer.len()
        );
    }
    Ok(())
}
