//! Echo over TCP - request/response on a framed socket.
//!
//! This example demonstrates:
//! - Hosting a correlator on a TCP stream with `StreamConnection`
//! - Answering requests with typed payloads
//! - Sending typed requests from the other side
//!
//! Run with `RUST_LOG=replywire=debug cargo run --example echo` to see the
//! correlation traffic.

use replywire::transport::{StreamConfig, StreamConnection};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::EnvFilter;

/// Input structure for the echo request.
#[derive(Serialize, Deserialize, Debug)]
struct EchoInput {
    message: String,
}

/// Output structure for the echo response.
#[derive(Serialize, Deserialize, Debug)]
struct EchoOutput {
    echo: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    // Runs until the process exits.
    let _server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await?;
        let (conn, requests, _passthrough) =
            StreamConnection::spawn(socket, StreamConfig::default());

        requests.serve(64, |request| async move {
            let input: EchoInput = request.payload_as()?;
            request.respond(&EchoOutput {
                echo: input.message,
            })
        });

        conn.wait_for_shutdown().await
    });

    let socket = TcpStream::connect(addr).await?;
    let (client, _requests, _passthrough) = StreamConnection::spawn(socket, StreamConfig::default());

    for message in ["hello", "world"] {
        let output: EchoOutput = client
            .correlator()
            .request(&EchoInput {
                message: message.to_string(),
            })
            .await?;
        println!("{} -> {:?}", message, output);
    }

    Ok(())
}
