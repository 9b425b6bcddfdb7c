//! # replywire
//!
//! Request/response correlation on top of a fire-and-forget duplex message
//! channel.
//!
//! Either peer may send a request and later receive exactly one outcome for
//! it: the peer's response, a timeout, or a connection-closed error. The wire
//! shape is compatible with the `primus-callbacks` JavaScript plugin.
//!
//! ## Architecture
//!
//! - **Envelope protocol**: tagged `requestId` / `responseId` messages;
//!   everything else passes through untouched
//! - **Pending registry**: one state machine per outstanding request
//! - **Error codec**: structured errors survive the JSON wire
//! - **Stream host** (optional): length-prefixed MsgPack frames on any
//!   `AsyncRead + AsyncWrite`
//!
//! ## Example
//!
//! ```ignore
//! use replywire::channel::MemoryChannel;
//! use replywire::Correlator;
//!
//! #[tokio::main]
//! async fn main() -> replywire::Result<()> {
//!     let (a, b) = MemoryChannel::pair();
//!     let client = a.attach(Correlator::builder());
//!     let server = b.attach(Correlator::builder());
//!
//!     server.requests.serve(16, |request| async move {
//!         let name: String = request.payload_as()?;
//!         request.respond(&format!("hello {}", name))
//!     });
//!
//!     let greeting = client.correlator.send_and_wait("world".into()).await?;
//!     assert_eq!(greeting, "hello world");
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod codec;
pub mod config;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod pending;
pub mod protocol;
pub mod transport;
pub mod writer;

mod correlator;

pub use codec::RemoteError;
pub use config::CorrelatorConfig;
pub use correlator::{Correlator, CorrelatorBuilder, Dispatch, ResponseFuture};
pub use error::{ReplywireError, Result};
pub use handler::{IncomingRequest, IncomingRequests, Responder};
