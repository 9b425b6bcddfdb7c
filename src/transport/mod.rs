//! Transport module - hosting a correlator on a byte stream.
//!
//! Provides [`StreamConnection`], which frames envelopes and application
//! messages onto any `AsyncRead + AsyncWrite` stream (TCP, Unix sockets,
//! pipes, `tokio::io::duplex`).

mod stream;

pub use stream::{Passthrough, StreamConfig, StreamConnection};
