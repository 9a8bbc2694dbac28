//! Cancellation semantics.
//!
//! Remote cancellation of an inbound request suppresses its response;
//! local cancellation (timeout or dropped awaiter) sends a best-effort
//! `notifications/cancelled` to the peer.

use std::time::Duration;

use mcplex::prelude::*;
use mcplex_core::codec;
use serde_json::{json, Value};

async fn recv_frame(transport: &MemoryTransport) -> Frame {
    tokio::time::timeout(Duration::from_secs(2), transport.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("transport error")
        .expect("stream ended")
        .frame
}

fn frame_from_json(raw: &str) -> Frame {
    codec::classify(serde_json::from_str(raw).expect("invalid JSON")).expect("invalid frame")
}

/// Handshake driven from the raw (client) end against a server session.
async fn handshake_as_client(raw: &MemoryTransport) {
    raw.send(
        frame_from_json(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-11-25","capabilities":{},"clientInfo":{"name":"raw","version":"0"}}}"#,
        ),
        None,
    )
    .await
    .unwrap();
    let _ = recv_frame(raw).await;
    raw.send(
        frame_from_json(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#),
        None,
    )
    .await
    .unwrap();
}

/// Handshake driven from the raw (server) end against a client session.
async fn handshake_as_server(raw: &MemoryTransport) {
    let frame = recv_frame(raw).await;
    let Frame::Single(Message::Request(request)) = frame else {
        panic!("expected initialize request");
    };
    raw.send(
        Response::success(
            request.id.clone(),
            json!({
                "protocolVersion": "2025-11-25",
                "capabilities": {},
                "serverInfo": {"name": "raw", "version": "0"},
            }),
        )
        .into(),
        None,
    )
    .await
    .unwrap();
    let frame = recv_frame(raw).await;
    assert!(matches!(frame, Frame::Single(Message::Notification(_))));
}

#[tokio::test]
async fn remote_cancellation_suppresses_response() {
    let (raw, server_side) = MemoryTransport::pair();
    let server = Session::new(SessionOptions::server(ServerInfo::new("srv", "1.0")));
    server.on_request(
        "slow/op",
        request_handler(|_ctx, _params| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(json!({"done": true}))
        }),
    );

    let (connected, ()) = tokio::join!(server.connect(server_side), handshake_as_client(&raw));
    connected.unwrap();

    raw.send(
        frame_from_json(r#"{"jsonrpc":"2.0","id":7,"method":"slow/op"}"#),
        None,
    )
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    raw.send(
        frame_from_json(
            r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":7}}"#,
        ),
        None,
    )
    .await
    .unwrap();

    // No frame with id 7 (or any other frame) may leave the server.
    let result = tokio::time::timeout(Duration::from_millis(400), raw.recv()).await;
    assert!(result.is_err(), "server emitted a frame for a cancelled request");
}

#[tokio::test]
async fn cancellation_for_unknown_id_is_ignored() {
    let (raw, server_side) = MemoryTransport::pair();
    let server = Session::new(SessionOptions::server(ServerInfo::new("srv", "1.0")));

    let (connected, ()) = tokio::join!(server.connect(server_side), handshake_as_client(&raw));
    connected.unwrap();

    raw.send(
        frame_from_json(
            r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":999}}"#,
        ),
        None,
    )
    .await
    .unwrap();

    // The session stays healthy; ping still answers.
    raw.send(
        frame_from_json(r#"{"jsonrpc":"2.0","id":8,"method":"ping"}"#),
        None,
    )
    .await
    .unwrap();
    let frame = recv_frame(&raw).await;
    let Frame::Single(Message::Response(response)) = frame else {
        panic!("expected ping response");
    };
    assert_eq!(response.id, RequestId::Number(8));
}

#[tokio::test]
async fn timeout_sends_cancelled_notification_with_reason() {
    let (client_side, raw) = MemoryTransport::pair();
    let client = Session::new(SessionOptions::client(ClientInfo::new("cli", "0")));

    let (connected, ()) = tokio::join!(client.connect(client_side), handshake_as_server(&raw));
    connected.unwrap();

    let request_task = {
        let peer = client.peer_handle();
        tokio::spawn(async move {
            peer.request(
                "slow/op",
                None,
                RequestOptions::default().with_timeout(Duration::from_millis(100)),
            )
            .await
        })
    };

    // The request arrives but is never answered.
    let frame = recv_frame(&raw).await;
    let Frame::Single(Message::Request(request)) = frame else {
        panic!("expected request");
    };
    assert_eq!(request.method(), "slow/op");

    // After the timeout, a cancellation notification names the request.
    let frame = recv_frame(&raw).await;
    let Frame::Single(Message::Notification(notification)) = frame else {
        panic!("expected cancelled notification, got {frame:?}");
    };
    assert_eq!(notification.method(), "notifications/cancelled");
    let params = notification.params.unwrap();
    assert_eq!(params["requestId"], serde_json::to_value(&request.id).unwrap());
    let reason = params["reason"].as_str().unwrap();
    assert!(reason.contains("timed out"), "unexpected reason: {reason}");

    let outcome = request_task.await.unwrap();
    assert!(matches!(outcome, Err(McplexError::RequestTimeout { .. })));
}

#[tokio::test]
async fn dropped_awaiter_sends_cancelled_notification() {
    let (client_side, raw) = MemoryTransport::pair();
    let client = Session::new(SessionOptions::client(ClientInfo::new("cli", "0")));

    let (connected, ()) = tokio::join!(client.connect(client_side), handshake_as_server(&raw));
    connected.unwrap();

    let request_task = {
        let peer = client.peer_handle();
        tokio::spawn(async move {
            peer.request("slow/op", None, RequestOptions::default().without_timeout())
                .await
        })
    };

    let frame = recv_frame(&raw).await;
    let Frame::Single(Message::Request(request)) = frame else {
        panic!("expected request");
    };

    // Abort the awaiter: the runtime cancels the pending slot and tells
    // the peer.
    request_task.abort();

    let frame = recv_frame(&raw).await;
    let Frame::Single(Message::Notification(notification)) = frame else {
        panic!("expected cancelled notification, got {frame:?}");
    };
    assert_eq!(notification.method(), "notifications/cancelled");
    let params: Value = notification.params.unwrap();
    assert_eq!(params["requestId"], serde_json::to_value(&request.id).unwrap());
}

#[tokio::test]
async fn disconnect_cancels_inbound_workers() {
    let (raw, server_side) = MemoryTransport::pair();
    let server = Session::new(SessionOptions::server(ServerInfo::new("srv", "1.0")));
    server.on_request(
        "hang/op",
        request_handler(|_ctx, _params| async {
            futures::future::pending::<()>().await;
            Ok(Value::Null)
        }),
    );

    let (connected, ()) = tokio::join!(server.connect(server_side), handshake_as_client(&raw));
    connected.unwrap();

    raw.send(
        frame_from_json(r#"{"jsonrpc":"2.0","id":5,"method":"hang/op"}"#),
        None,
    )
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    server.disconnect().await.unwrap();
    assert_eq!(server.state(), SessionState::Disconnected);
}
