//! Reconnection and progress-token lifetime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mcplex::prelude::*;
use serde_json::json;

async fn recv_frame(transport: &MemoryTransport) -> Frame {
    tokio::time::timeout(Duration::from_secs(2), transport.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("transport error")
        .expect("stream ended")
        .frame
}

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
    let _ = recv_frame(raw).await; // initialized
}

#[tokio::test]
async fn pending_requests_survive_reconnection() {
    let (client_side, raw_old) = MemoryTransport::pair();
    let client = Session::new(SessionOptions::client(ClientInfo::new("cli", "0")));
    let (connected, ()) = tokio::join!(client.connect(client_side), handshake_as_server(&raw_old));
    connected.unwrap();

    // A request goes out over the first transport and is never answered
    // there.
    let request_task = {
        let peer = client.peer_handle();
        tokio::spawn(async move {
            peer.request("slow/op", None, RequestOptions::default().without_timeout())
                .await
        })
    };
    let frame = recv_frame(&raw_old).await;
    let Frame::Single(Message::Request(request)) = frame else {
        panic!("expected request");
    };
    let pending_id = request.id.clone();

    // Rebind to a fresh transport; the handshake runs again.
    let (client_side2, raw_new) = MemoryTransport::pair();
    let (reconnected, ()) =
        tokio::join!(client.reconnect(client_side2), handshake_as_server(&raw_new));
    reconnected.unwrap();
    assert_eq!(client.state(), SessionState::Ready);

    // The response arrives over the new transport with the original id
    // and still completes the original awaiter.
    raw_new
        .send(
            Response::success(pending_id, json!({"late": true})).into(),
            None,
        )
        .await
        .unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(2), request_task)
        .await
        .expect("awaiter never completed")
        .unwrap()
        .unwrap();
    assert_eq!(outcome["late"], json!(true));
}

#[tokio::test]
async fn progress_token_migrates_to_task_scope() {
    let (client_side, raw) = MemoryTransport::pair();
    let client = Session::new(SessionOptions::client(ClientInfo::new("cli", "0")));
    let (connected, ()) = tokio::join!(client.connect(client_side), handshake_as_server(&raw));
    connected.unwrap();

    let progress_seen = Arc::new(AtomicUsize::new(0));
    let request_task = {
        let peer = client.peer_handle();
        let progress_seen = Arc::clone(&progress_seen);
        tokio::spawn(async move {
            peer.request(
                "tools/call",
                Some(json!({"name": "long"})),
                RequestOptions::default()
                    .without_timeout()
                    .as_task(TaskMetadata { ttl: Some(60_000) })
                    .with_progress_token(ProgressToken::String("p".into()))
                    .with_progress(Arc::new(move |_params| {
                        progress_seen.fetch_add(1, Ordering::SeqCst);
                    })),
            )
            .await
        })
    };

    let frame = recv_frame(&raw).await;
    let Frame::Single(Message::Request(request)) = frame else {
        panic!("expected request");
    };
    let params = request.params.as_ref().unwrap();
    assert_eq!(params["_meta"]["progressToken"], json!("p"));
    assert_eq!(params["_meta"]["task"]["ttl"], json!(60_000));

    // Answer with a CreateTaskResult: the token must move to task scope
    // instead of being dropped with the completed request.
    raw.send(
        Response::success(
            request.id.clone(),
            json!({"task": {"taskId": "t-9", "status": "working"}}),
        )
        .into(),
        None,
    )
    .await
    .unwrap();
    let created = request_task.await.unwrap().unwrap();
    assert_eq!(created["task"]["taskId"], json!("t-9"));

    // Progress referencing the token is still delivered after the
    // response.
    raw.send(
        Notification::with_params(
            "notifications/progress",
            json!({"progressToken": "p", "progress": 0.5}),
        )
        .into(),
        None,
    )
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(progress_seen.load(Ordering::SeqCst), 1);

    // A terminal task status drops the token.
    raw.send(
        Notification::with_params(
            "notifications/tasks/status",
            json!({
                "taskId": "t-9",
                "status": "completed",
                "createdAt": "2026-01-01T00:00:00Z",
                "lastUpdatedAt": "2026-01-01T00:00:05Z",
            }),
        )
        .into(),
        None,
    )
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    raw.send(
        Notification::with_params(
            "notifications/progress",
            json!({"progressToken": "p", "progress": 0.9}),
        )
        .into(),
        None,
    )
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(progress_seen.load(Ordering::SeqCst), 1, "token must be dropped after terminal status");
}
