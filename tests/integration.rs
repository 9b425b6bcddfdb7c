//! Integration tests for replywire.
//!
//! Two correlators talk to each other, first over in-process channels and
//! then over a framed byte stream.

use std::time::Duration;

use replywire::channel::{MemoryChannel, MemoryConnection};
use replywire::codec::{decode, encode};
use replywire::envelope::Envelope;
use replywire::transport::{StreamConfig, StreamConnection};
use replywire::{Correlator, CorrelatorConfig, RemoteError, ReplywireError};
use serde_json::{json, Value};
use tokio::time::Instant;

fn memory_pair(timeout_ms: u64) -> (MemoryConnection, MemoryConnection) {
    let (a, b) = MemoryChannel::pair();
    (
        a.attach(Correlator::builder().timeout_ms(timeout_ms)),
        b.attach(Correlator::builder().timeout_ms(timeout_ms)),
    )
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_request_times_out() {
    let (client, mut server) = memory_pair(200);

    let start = Instant::now();
    let pending = client.correlator.send(json!("ping"));

    // The responder receives the request but sits on it.
    let request = server.requests.recv().await.unwrap();
    assert_eq!(request.payload(), &json!("ping"));

    let err = pending.await.unwrap_err();
    assert!(start.elapsed() >= Duration::from_millis(200));
    assert!(matches!(err, ReplywireError::Timeout { timeout_ms: 200 }));
    assert_eq!(client.correlator.pending_count(), 0);

    // A late answer is ignored, and the connection keeps working.
    request.respond(&"pong").unwrap();
    let follow_up = client.correlator.send(json!("again"));
    let request = server.requests.recv().await.unwrap();
    request.respond(&"second").unwrap();
    assert_eq!(follow_up.await.unwrap(), json!("second"));
}

#[tokio::test]
async fn test_remote_error_reaches_caller() {
    let (client, server) = memory_pair(10_000);

    server.requests.serve(4, |request| async move {
        request.respond_with(Some(RemoteError::new("boom")), Value::Null)
    });

    match client.correlator.send_and_wait(Value::Null).await {
        Err(ReplywireError::Remote { error, payload }) => {
            assert_eq!(error.message(), "boom");
            assert_eq!(error.name(), "Error");
            assert_eq!(payload, Value::Null);
        }
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_custom_error_fields_round_trip() {
    let (client, server) = memory_pair(10_000);

    server.requests.serve(4, |request| async move {
        let error = RemoteError::new("quota exceeded")
            .with_name("QuotaError")
            .with_field("limit", 100)
            .with_error_field("cause", &RemoteError::new("disk full"));
        request.fail(error)
    });

    let err = client.correlator.send_and_wait(json!("write")).await.unwrap_err();
    let remote = err.remote().unwrap();
    assert_eq!(remote.name(), "QuotaError");
    assert_eq!(remote.field("limit"), Some(&json!(100)));
    assert_eq!(remote.cause().unwrap().message(), "disk full");
}

#[tokio::test]
async fn test_both_sides_request_each_other() {
    let (left, right) = memory_pair(10_000);

    left.requests.serve(4, |request| async move {
        let n = request.payload().as_i64().unwrap_or(0);
        request.respond(&(n + 1))
    });
    right.requests.serve(4, |request| async move {
        let n = request.payload().as_i64().unwrap_or(0);
        request.respond(&(n * 10))
    });

    let (from_right, from_left) = tokio::join!(
        left.correlator.send_and_wait(json!(4)),
        right.correlator.send_and_wait(json!(4)),
    );
    assert_eq!(from_right.unwrap(), json!(40));
    assert_eq!(from_left.unwrap(), json!(5));
}

#[tokio::test]
async fn test_concurrent_requests_are_matched_by_id() {
    let (client, server) = memory_pair(10_000);

    server.requests.serve(8, |request| async move {
        // Answer in a scrambled order.
        let n = request.payload()["n"].as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis((50 - n) % 7)).await;
        request.respond(&json!({ "echo": n }))
    });

    let futures: Vec<_> = (0..50)
        .map(|n| client.correlator.send(json!({ "n": n })))
        .collect();

    for (n, future) in futures.into_iter().enumerate() {
        assert_eq!(future.await.unwrap(), json!({ "echo": n }));
    }
    assert_eq!(client.correlator.pending_count(), 0);
}

#[tokio::test]
async fn test_foreign_messages_pass_through_both_ways() {
    let (mut client, mut server) = memory_pair(10_000);

    client.raw.send_raw(json!({ "chat": "hi" })).unwrap();
    server.raw.send_raw(json!("plain text")).unwrap();

    assert_eq!(server.passthrough.recv().await.unwrap(), json!({ "chat": "hi" }));
    assert_eq!(client.passthrough.recv().await.unwrap(), json!("plain text"));
}

#[tokio::test]
async fn test_malformed_envelope_does_not_disturb_traffic() {
    let (mut client, server) = memory_pair(10_000);

    server.requests.serve(4, |request| async move {
        let payload = request.payload().clone();
        request.respond_value(payload)
    });

    let pending = client.correlator.send(json!("kept"));
    server
        .raw
        .send_raw(json!({ "plugin": "primus-callbacks", "data": "no id" }))
        .unwrap();

    assert_eq!(pending.await.unwrap(), json!("kept"));
    assert!(client.passthrough.try_recv().is_err());
}

#[tokio::test]
async fn test_javascript_peer_wire_format() {
    let (a, mut b) = MemoryChannel::pair();
    let client = a.attach(Correlator::builder());

    let pending = client.correlator.send(json!({ "q": 1 }));
    let request = b.incoming.recv().await.unwrap();
    assert_eq!(request["plugin"], "primus-callbacks");
    assert_eq!(request["data"], json!({ "q": 1 }));
    assert!(request.get("responseId").is_none());
    let id = request["requestId"].as_str().unwrap().to_string();

    // What the JavaScript plugin sends for `respond(new TypeError('bad'), null)`.
    b.channel
        .send_raw(json!({
            "plugin": "primus-callbacks",
            "responseId": id,
            "data": null,
            "error": {
                "__isError": true,
                "name": "TypeError",
                "message": "bad",
                "stack": "TypeError: bad\n    at handler (server.js:10:5)",
                "code": "E_BAD",
            },
        }))
        .unwrap();

    let err = pending.await.unwrap_err();
    let remote = err.remote().unwrap();
    assert_eq!(remote.name(), "TypeError");
    assert_eq!(remote.message(), "bad");
    assert!(remote.stack().unwrap().contains("server.js"));
    assert_eq!(remote.field("code"), Some(&json!("E_BAD")));
}

#[tokio::test]
async fn test_peer_going_away_fails_pending_requests() {
    let (a, b) = MemoryChannel::pair();
    let client = a.attach(Correlator::builder());

    let futures: Vec<_> = (0..3).map(|n| client.correlator.send(json!(n))).collect();
    assert_eq!(client.correlator.pending_count(), 3);
    drop(b);

    for future in futures {
        assert!(matches!(future.await, Err(ReplywireError::ConnectionClosed)));
    }
    client.task.await.unwrap();
    assert!(client.correlator.is_closed());

    let err = client.correlator.send_and_wait(json!("late")).await.unwrap_err();
    assert!(matches!(err, ReplywireError::ConnectionClosed));
}

#[tokio::test]
async fn test_nested_errors_in_payload_survive() {
    let (client, server) = memory_pair(10_000);

    server.requests.serve(4, |request| async move {
        request.respond_value(json!({
            "ok": [1, 2],
            "failed": [encode(&RemoteError::new("item 3 failed"))],
        }))
    });

    let payload = client.correlator.send_and_wait(Value::Null).await.unwrap();
    let revived = decode(payload);
    let errors = revived.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message(), "item 3 failed");
}

fn stream_pair(timeout_ms: u64) -> (StreamConnection, StreamConnection, replywire::IncomingRequests) {
    let (left_io, right_io) = tokio::io::duplex(64 * 1024);
    let config = StreamConfig {
        correlator: CorrelatorConfig::with_timeout_ms(timeout_ms),
        ..StreamConfig::default()
    };
    let (left, _left_requests, _left_passthrough) = StreamConnection::spawn(left_io, config.clone());
    let (right, right_requests, _right_passthrough) = StreamConnection::spawn(right_io, config);
    (left, right, right_requests)
}

#[tokio::test]
async fn test_stream_request_response() {
    let (left, _right, requests) = stream_pair(10_000);

    requests.serve(4, |request| async move {
        let name: String = request.payload_as()?;
        request.respond(&format!("hello {}", name))
    });

    let greeting: String = left.correlator().request("stream").await.unwrap();
    assert_eq!(greeting, "hello stream");
}

#[tokio::test(start_paused = true)]
async fn test_stream_timeout_and_error() {
    let (left, _right, requests) = stream_pair(200);

    requests.serve(4, |request| async move {
        match request.payload().as_str() {
            Some("boom") => request.fail("boom"),
            // "ping" is never answered
            _ => Ok(()),
        }
    });

    let timed_out = left.correlator().send(json!("ping"));
    let failed = left.correlator().send(json!("boom"));

    let err = failed.await.unwrap_err();
    assert_eq!(err.remote().unwrap().message(), "boom");

    let err = timed_out.await.unwrap_err();
    assert!(matches!(err, ReplywireError::Timeout { timeout_ms: 200 }));
}

#[tokio::test]
async fn test_stream_envelope_matches_memory_envelope() {
    let (left_io, mut right_io) = tokio::io::duplex(64 * 1024);
    let (left, _requests, _passthrough) = StreamConnection::spawn(left_io, StreamConfig::default());

    let pending = left.correlator().send(json!({ "q": true }));

    use tokio::io::AsyncReadExt;
    let mut header = [0u8; 4];
    right_io.read_exact(&mut header).await.unwrap();
    let mut body = vec![0u8; u32::from_be_bytes(header) as usize];
    right_io.read_exact(&mut body).await.unwrap();

    let message: Value = replywire::codec::MsgPackCodec::decode(&body).unwrap();
    let expected = Envelope::request(pending.id().as_str(), json!({ "q": true })).into_value();
    assert_eq!(message, expected);
}
