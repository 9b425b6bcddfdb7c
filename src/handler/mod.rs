//! Handler module - the responding side of a connection.
//!
//! Provides:
//! - [`IncomingRequest`] - one request from the peer, answered at most once
//! - [`IncomingRequests`] - the stream of such requests for one connection
//!
//! # Example
//!
//! ```ignore
//! use replywire::Correlator;
//!
//! let (correlator, requests) = Correlator::builder().build(channel);
//!
//! requests.serve(64, |request| async move {
//!     let name: String = request.payload_as()?;
//!     request.respond(&format!("hello {}", name))
//! });
//! ```

mod context;
mod stream;

pub use context::{IncomingRequest, Responder};
pub use stream::{IncomingRequests, DEFAULT_MAX_CONCURRENT_HANDLERS};
