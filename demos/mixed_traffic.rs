//! Mixed traffic - correlated requests sharing a channel with chat messages.
//!
//! This example demonstrates:
//! - Attaching correlators to an in-process channel pair
//! - Untagged messages flowing past the correlator untouched
//! - Timeouts, remote errors and successful answers side by side
//!
//! Run with `RUST_LOG=debug cargo run --example mixed_traffic`.

use std::time::Duration;

use replywire::channel::MemoryChannel;
use replywire::{Correlator, RemoteError, ReplywireError};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (a, b) = MemoryChannel::pair();
    let mut browser = a.attach(Correlator::builder().timeout(Duration::from_millis(200)));
    let mut server = b.attach(Correlator::builder());

    server.requests.serve(16, |request| async move {
        match request.payload()["op"].as_str() {
            Some("add") => {
                let args = &request.payload()["args"];
                let sum = args[0].as_i64().unwrap_or(0) + args[1].as_i64().unwrap_or(0);
                request.respond(&sum)
            }
            Some("slow") => {
                tokio::time::sleep(Duration::from_secs(1)).await;
                request.respond(&"too late")
            }
            _ => request.fail(RemoteError::new("unknown op").with_name("TypeError")),
        }
    });

    // Chat messages are not part of the correlation protocol.
    browser.raw.send_raw(json!({ "chat": "hello from the browser" }))?;
    server.raw.send_raw(json!({ "chat": "hello from the server" }))?;
    println!("server saw: {}", server.passthrough.recv().await.unwrap_or_default());
    println!("browser saw: {}", browser.passthrough.recv().await.unwrap_or_default());

    let sum = browser
        .correlator
        .send_and_wait(json!({ "op": "add", "args": [2, 3] }))
        .await?;
    println!("add -> {}", sum);

    match browser.correlator.send_and_wait(json!({ "op": "nope" })).await {
        Err(ReplywireError::Remote { error, .. }) => println!("nope -> {}", error),
        other => println!("nope -> unexpected {:?}", other),
    }

    match browser.correlator.send_and_wait(json!({ "op": "slow" })).await {
        Err(e) if e.is_timeout() => println!("slow -> {}", e),
        other => println!("slow -> unexpected {:?}", other),
    }

    // Callback style.
    let (tx, rx) = tokio::sync::oneshot::channel();
    browser
        .correlator
        .write_and_wait(json!({ "op": "add", "args": [40, 2] }), move |result| {
            let _ = tx.send(result);
        });
    println!("callback add -> {:?}", rx.await?);

    println!("closing with {} pending", browser.correlator.close());
    Ok(())
}
