//! Direct peer interactions: nested requests from inside handlers, and
//! the polling task client.

use std::sync::Arc;
use std::time::Duration;

use mcplex::prelude::*;
use serde_json::{json, Value};

async fn connect(client: &Session, server: &Session) {
    let (client_side, server_side) = MemoryTransport::pair();
    let (c, s) = tokio::join!(client.connect(client_side), server.connect(server_side));
    c.unwrap();
    s.unwrap();
}

#[tokio::test]
async fn handler_can_nest_a_request_back_to_the_caller() {
    let server = Session::new(SessionOptions::server(ServerInfo::new("srv", "1.0")));
    // The handler elicits from the requesting client before answering, so
    // its worker must observe a response while its own request is open.
    server.on_request(
        "ask/user",
        request_handler(|ctx, _params| async move {
            let answer = ctx
                .peer()
                .elicit(ElicitParams::form("Favourite colour?", json!({"type": "object"})))
                .await?;
            let colour = answer
                .content
                .as_ref()
                .and_then(|c| c.get("colour"))
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            Ok(json!({"colour": colour}))
        }),
    );

    let client = Session::new(SessionOptions::client(ClientInfo::new("cli", "0")));
    client.on_request(
        "elicitation/create",
        request_handler(|_ctx, _params| async {
            Ok(json!({"action": "accept", "content": {"colour": "teal"}}))
        }),
    );
    connect(&client, &server).await;

    let result = client
        .request("ask/user", None, RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(result["colour"], json!("teal"));
}

#[tokio::test]
async fn elicit_without_capability_is_rejected() {
    let server = Session::new(SessionOptions::server(ServerInfo::new("srv", "1.0")));
    server.on_request(
        "ask/user",
        request_handler(|ctx, _params| async move {
            ctx.peer()
                .elicit(ElicitParams::form("?", json!({})))
                .await?;
            Ok(Value::Null)
        }),
    );

    // The client registers no elicitation handler and advertises nothing.
    let client = Session::new(SessionOptions::client(ClientInfo::new("cli", "0")));
    connect(&client, &server).await;

    let err = client
        .request("ask/user", None, RequestOptions::default())
        .await
        .unwrap_err();
    match err {
        McplexError::ErrorResponse(e) => {
            assert_eq!(e.code, -32600);
            assert!(e.message.contains("elicitation"), "message: {}", e.message);
        }
        other => panic!("expected capability error, got {other:?}"),
    }
}

#[tokio::test]
async fn task_client_polls_to_the_result() {
    let server = Session::new(SessionOptions::server(ServerInfo::new("srv", "1.0")));
    let host = TaskHost::in_memory();
    host.attach(&server);

    let handler_host = Arc::clone(&host);
    server.on_request(
        "tools/call",
        request_handler(move |ctx, _params| {
            let host = Arc::clone(&handler_host);
            async move {
                let metadata = ctx.task.clone().unwrap_or_default();
                let created = host
                    .run_task(ctx.peer().clone(), metadata, None, |_task_ctx| async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(json!({"content": [{"type": "text", "text": "slow done"}]}))
                    })
                    .await?;
                Ok(serde_json::to_value(created)?)
            }
        }),
    );

    let client = Session::new(SessionOptions::client(ClientInfo::new("cli", "0")));
    connect(&client, &server).await;

    let tasks = TaskClient::new(client.peer_handle());
    let created = tasks
        .call_as_task(
            "tools/call",
            Some(json!({"name": "slow"})),
            TaskMetadata { ttl: Some(60_000) },
        )
        .await
        .unwrap();
    assert_eq!(created.task.status, TaskStatus::Working);

    let result = tasks.wait_for_result(&created).await.unwrap();
    assert_eq!(result["content"][0]["text"], json!("slow done"));

    // After the result, the snapshot is terminal and listed.
    let snapshot = tasks.get(&created.task.task_id).await.unwrap();
    assert_eq!(snapshot.status, TaskStatus::Completed);
    let listed = tasks.list(None).await.unwrap();
    assert_eq!(listed.tasks.len(), 1);
}

#[tokio::test]
async fn ping_round_trips_through_the_peer_handle() {
    let server = Session::new(SessionOptions::server(ServerInfo::new("srv", "1.0")));
    let client = Session::new(SessionOptions::client(ClientInfo::new("cli", "0")));
    connect(&client, &server).await;

    client.peer_handle().ping().await.unwrap();
    server.peer_handle().ping().await.unwrap();
}
