//! Task-augmented request scenarios over two full sessions.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mcplex::prelude::*;
use mcplex_core::meta;
use serde_json::{json, Value};

/// A server whose `tools/call` runs the given work as a task.
fn task_server<W, F>(work: W) -> (mcplex::Session, Arc<TaskHost>)
where
    W: Fn(TaskContext) -> F + Send + Sync + Clone + 'static,
    F: std::future::Future<Output = Result<Value, McplexError>> + Send + 'static,
{
    let server = Session::new(SessionOptions::server(ServerInfo::new("task-srv", "1.0")));
    let host = TaskHost::in_memory();
    host.attach(&server);

    let handler_host = Arc::clone(&host);
    server.on_request(
        "tools/call",
        request_handler(move |ctx, _params| {
            let host = Arc::clone(&handler_host);
            let work = work.clone();
            async move {
                let metadata = ctx.task.clone().unwrap_or_default();
                let created = host
                    .run_task(ctx.peer().clone(), metadata, None, work)
                    .await?;
                Ok(serde_json::to_value(created)?)
            }
        }),
    );
    (server, host)
}

async fn connect(client: &Session, server: &Session) {
    let (client_side, server_side) = MemoryTransport::pair();
    let (c, s) = tokio::join!(client.connect(client_side), server.connect(server_side));
    c.unwrap();
    s.unwrap();
}

#[tokio::test]
async fn task_augmented_call_polls_to_completion() {
    let (server, _host) = task_server(|_ctx| async {
        Ok(json!({"content": [{"type": "text", "text": "hi"}], "isError": false}))
    });
    let client = Session::new(SessionOptions::client(ClientInfo::new("cli", "0")));
    connect(&client, &server).await;

    let created = client
        .request(
            "tools/call",
            Some(json!({"name": "demo"})),
            RequestOptions::default().as_task(TaskMetadata { ttl: Some(60_000) }),
        )
        .await
        .unwrap();
    let created: CreateTaskResult = serde_json::from_value(created).unwrap();
    assert_eq!(created.task.status, TaskStatus::Working);
    let task_id = created.task.task_id.clone();

    // The long-poll blocks until the task completes, then returns the
    // stored payload flattened in with the related-task meta.
    let result = client
        .request(
            "tasks/result",
            Some(json!({"taskId": task_id})),
            RequestOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(result["isError"], json!(false));
    assert_eq!(result["content"][0]["text"], json!("hi"));
    assert_eq!(
        result["_meta"][meta::RELATED_TASK]["taskId"],
        serde_json::to_value(&task_id).unwrap()
    );

    // The record is now terminal.
    let snapshot = client
        .request(
            "tasks/get",
            Some(json!({"taskId": task_id})),
            RequestOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(snapshot["status"], json!("completed"));
}

#[tokio::test]
async fn mid_task_elicitation_round_trip() {
    let statuses: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let (server, _host) = task_server(|ctx| async move {
        let answer = ctx
            .elicit("Your name?", json!({"type": "object"}))
            .await?;
        let name = answer
            .content
            .as_ref()
            .and_then(|c| c.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("stranger")
            .to_string();
        Ok(json!({"content": [{"type": "text", "text": format!("hello {name}")}]}))
    });

    let client = Session::new(SessionOptions::client(ClientInfo::new("cli", "0")));
    client.on_request(
        "elicitation/create",
        request_handler(|_ctx, params| async move {
            // The elicit request is tied to the server's task.
            let params = params.unwrap();
            assert!(params["_meta"][meta::RELATED_TASK]["taskId"].is_string());
            assert_eq!(params["message"], json!("Your name?"));
            Ok(json!({"action": "accept", "content": {"name": "Ada"}}))
        }),
    );
    {
        let statuses = Arc::clone(&statuses);
        client.on_notification(
            "notifications/tasks/status",
            notification_handler(move |_peer, params| {
                let statuses = Arc::clone(&statuses);
                async move {
                    if let Some(status) = params
                        .as_ref()
                        .and_then(|p| p.get("status"))
                        .and_then(Value::as_str)
                    {
                        statuses.lock().unwrap().push(status.to_string());
                    }
                }
            }),
        );
    }
    connect(&client, &server).await;

    let created = client
        .request(
            "tools/call",
            Some(json!({"name": "greet"})),
            RequestOptions::default().as_task(TaskMetadata::default()),
        )
        .await
        .unwrap();
    let task_id = created["task"]["taskId"].as_str().unwrap().to_string();

    // The poll relays the queued elicit request, waits for our answer,
    // and finally returns the completed payload.
    let result = client
        .request(
            "tasks/result",
            Some(json!({"taskId": task_id})),
            RequestOptions::default().with_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();
    assert_eq!(result["content"][0]["text"], json!("hello Ada"));

    // Status notifications race the response frame; give them a moment.
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Status walked working -> input_required -> working -> completed.
    let seen = statuses.lock().unwrap().clone();
    let input_at = seen.iter().position(|s| s == "input_required");
    let completed_at = seen.iter().position(|s| s == "completed");
    assert!(input_at.is_some(), "no input_required observed: {seen:?}");
    assert!(
        input_at < completed_at,
        "input_required must precede completed: {seen:?}"
    );
}

#[tokio::test]
async fn tasks_cancel_aborts_the_worker() {
    let (server, host) = task_server(|_ctx| async {
        futures::future::pending::<()>().await;
        Ok(Value::Null)
    });
    let client = Session::new(SessionOptions::client(ClientInfo::new("cli", "0")));
    connect(&client, &server).await;

    let created = client
        .request(
            "tools/call",
            Some(json!({"name": "forever"})),
            RequestOptions::default().as_task(TaskMetadata::default()),
        )
        .await
        .unwrap();
    let task_id = created["task"]["taskId"].as_str().unwrap().to_string();

    let cancelled = client
        .request(
            "tasks/cancel",
            Some(json!({"taskId": task_id})),
            RequestOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(cancelled["status"], json!("cancelled"));

    // Terminal status is immutable: a second cancel is refused.
    let err = client
        .request(
            "tasks/cancel",
            Some(json!({"taskId": task_id})),
            RequestOptions::default(),
        )
        .await
        .unwrap_err();
    match err {
        McplexError::ErrorResponse(e) => assert_eq!(e.code, -32600),
        other => panic!("expected error response, got {other:?}"),
    }

    // The store agrees.
    let task = host
        .store()
        .get(&TaskId::from(task_id.as_str()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn tasks_list_pages_deterministically() {
    let (server, host) = task_server(|_ctx| async { Ok(json!({})) });
    let client = Session::new(SessionOptions::client(ClientInfo::new("cli", "0")));
    connect(&client, &server).await;

    for i in 0..3 {
        host.store()
            .create(
                &TaskMetadata::default(),
                Some(TaskId::from(format!("t-{i}"))),
            )
            .await
            .unwrap();
    }

    let listed = client
        .request("tasks/list", None, RequestOptions::default())
        .await
        .unwrap();
    let ids: Vec<&str> = listed["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["taskId"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["t-0", "t-1", "t-2"]);
}

#[tokio::test]
async fn unknown_task_result_is_invalid_params() {
    let (server, _host) = task_server(|_ctx| async { Ok(json!({})) });
    let client = Session::new(SessionOptions::client(ClientInfo::new("cli", "0")));
    connect(&client, &server).await;

    let err = client
        .request(
            "tasks/result",
            Some(json!({"taskId": "missing"})),
            RequestOptions::default(),
        )
        .await
        .unwrap_err();
    match err {
        McplexError::ErrorResponse(e) => {
            assert_eq!(e.code, -32602);
            assert!(e.message.contains("Task not found"), "message: {}", e.message);
        }
        other => panic!("expected error response, got {other:?}"),
    }
}
