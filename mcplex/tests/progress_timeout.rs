//! Progress-driven timeout semantics (paused-clock scenarios).
//!
//! With reset-on-progress, each progress notification carrying the
//! request's token advances the deadline to `now + base`; `max_total`
//! bounds the total wait regardless of progress.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mcplex::prelude::*;
use serde_json::json;

async fn recv_frame(transport: &MemoryTransport) -> Frame {
    tokio::time::timeout(Duration::from_secs(60), transport.recv())
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

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

fn progress_frame(token: &str, progress: f64) -> Frame {
    Notification::with_params(
        "notifications/progress",
        json!({"progressToken": token, "progress": progress}),
    )
    .into()
}

#[tokio::test(start_paused = true)]
async fn progress_resets_the_clock() {
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
                RequestOptions::default()
                    .with_timeout(Duration::from_secs(1))
                    .reset_on_progress(Some(Duration::from_secs(10)))
                    .with_progress_token(ProgressToken::String("p".into())),
            )
            .await
        })
    };

    let frame = recv_frame(&raw).await;
    let Frame::Single(Message::Request(request)) = frame else {
        panic!("expected request");
    };
    // The progress token rides in _meta.
    assert_eq!(
        request.params.as_ref().unwrap()["_meta"]["progressToken"],
        json!("p")
    );

    // Progress at t=0.8s pushes the deadline to t=1.8s.
    tokio::time::advance(Duration::from_millis(800)).await;
    raw.send(progress_frame("p", 0.5), None).await.unwrap();
    settle().await;

    // The response lands at t=1.5s: had the deadline not moved, the
    // request would already have timed out at t=1.0s.
    tokio::time::advance(Duration::from_millis(700)).await;
    raw.send(
        Response::success(request.id.clone(), json!({"done": true})).into(),
        None,
    )
    .await
    .unwrap();

    let outcome = request_task.await.unwrap().unwrap();
    assert_eq!(outcome["done"], json!(true));
}

#[tokio::test(start_paused = true)]
async fn progress_callback_receives_each_notification() {
    let (client_side, raw) = MemoryTransport::pair();
    let client = Session::new(SessionOptions::client(ClientInfo::new("cli", "0")));
    let (connected, ()) = tokio::join!(client.connect(client_side), handshake_as_server(&raw));
    connected.unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    let request_task = {
        let peer = client.peer_handle();
        let seen = Arc::clone(&seen);
        tokio::spawn(async move {
            peer.request(
                "slow/op",
                None,
                RequestOptions::default()
                    .without_timeout()
                    .with_progress_token(ProgressToken::String("p".into()))
                    .with_progress(Arc::new(move |params| {
                        assert_eq!(params.progress_token, ProgressToken::String("p".into()));
                        seen.fetch_add(1, Ordering::SeqCst);
                    })),
            )
            .await
        })
    };

    let frame = recv_frame(&raw).await;
    let Frame::Single(Message::Request(request)) = frame else {
        panic!("expected request");
    };

    raw.send(progress_frame("p", 0.25), None).await.unwrap();
    raw.send(progress_frame("p", 0.75), None).await.unwrap();
    settle().await;
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    raw.send(
        Response::success(request.id.clone(), json!({})).into(),
        None,
    )
    .await
    .unwrap();
    request_task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn timeout_fires_without_progress() {
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
                RequestOptions::default()
                    .with_timeout(Duration::from_secs(1))
                    .reset_on_progress(Some(Duration::from_secs(10)))
                    .with_progress_token(ProgressToken::String("p".into())),
            )
            .await
        })
    };

    let _request = recv_frame(&raw).await;

    // No progress arrives; the paused clock auto-advances to the deadline
    // and the runtime reports the timeout to the peer.
    let frame = recv_frame(&raw).await;
    let Frame::Single(Message::Notification(notification)) = frame else {
        panic!("expected cancelled notification, got {frame:?}");
    };
    assert_eq!(notification.method(), "notifications/cancelled");

    let outcome = request_task.await.unwrap();
    match outcome {
        Err(McplexError::RequestTimeout { method, .. }) => assert_eq!(method, "slow/op"),
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn max_total_bounds_repeated_progress() {
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
                RequestOptions::default()
                    .with_timeout(Duration::from_secs(1))
                    .reset_on_progress(Some(Duration::from_secs(3)))
                    .with_progress_token(ProgressToken::String("p".into())),
            )
            .await
        })
    };

    let _request = recv_frame(&raw).await;

    // Keep progress flowing every 0.8s; the total bound of 3s still wins.
    for i in 0..3 {
        tokio::time::advance(Duration::from_millis(800)).await;
        raw.send(progress_frame("p", f64::from(i)), None).await.unwrap();
        settle().await;
    }

    // Cancellation notification confirms the bounded timeout fired.
    let frame = recv_frame(&raw).await;
    let Frame::Single(Message::Notification(notification)) = frame else {
        panic!("expected cancelled notification, got {frame:?}");
    };
    assert_eq!(notification.method(), "notifications/cancelled");

    let outcome = request_task.await.unwrap();
    assert!(matches!(outcome, Err(McplexError::RequestTimeout { .. })));
}
