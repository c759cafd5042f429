//! Client calls against a stand-in monitoring API served by axum.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};

use taskscope_client::{ClientError, TaskscopeClient};
use taskscope_core::config::ApiConfig;
use taskscope_core::{
    ListError, MutationBus, MutationKind, MutationScope, TaskCollection, TaskLister, TaskState,
};

/// Requests seen by the server, as `METHOD path?query`.
type Log = Arc<Mutex<Vec<String>>>;

const RETRY_TASKS: usize = 5;

fn retry_task(i: usize) -> Value {
    json!({
        "id": format!("t{i}"),
        "queue": "default",
        "type": "email:send",
        "payload": format!("{{\"id\":{i}}}"),
        "retried": i,
        "max_retry": 25,
        "error_message": if i % 2 == 0 { "smtp timeout" } else { "" },
        "next_process_at": "2024-03-01T10:00:00Z",
        "last_failed_at": "",
    })
}

fn query_param(uri: &Uri, key: &str) -> Option<usize> {
    uri.query()?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .and_then(|(_, v)| v.parse().ok())
}

async fn api(State(log): State<Log>, method: Method, uri: Uri, body: String) -> Response {
    log.lock().unwrap().push(match uri.query() {
        Some(q) => format!("{method} {}?{q}", uri.path()),
        None => format!("{method} {}", uri.path()),
    });

    let route = format!("{method} {}", uri.path());
    match route.as_str() {
        "GET /api/queues/default/retry_tasks" => {
            let page = query_param(&uri, "page").unwrap_or(1);
            let size = query_param(&uri, "size").unwrap_or(20);
            let tasks: Vec<Value> = ((page - 1) * size..(page * size).min(RETRY_TASKS))
                .map(retry_task)
                .collect();
            Json(json!({
                "tasks": tasks,
                "stats": {"queue": "default", "size": RETRY_TASKS, "retry": RETRY_TASKS},
            }))
            .into_response()
        }
        "GET /api/queues/default/archived_tasks" => {
            (StatusCode::INTERNAL_SERVER_ERROR, "redis: connection refused\n").into_response()
        }
        "GET /api/queues/default/pending_tasks" => {
            Json(json!({"tasks": null, "stats": null})).into_response()
        }
        "GET /api/queues/default/tasks/t3" => {
            let mut task = retry_task(3);
            task["state"] = json!("retry");
            Json(task).into_response()
        }
        "DELETE /api/queues/default/retry_tasks/t1" => StatusCode::NO_CONTENT.into_response(),
        "POST /api/queues/default/retry_tasks/t2:run" => StatusCode::NO_CONTENT.into_response(),
        "POST /api/queues/default/retry_tasks:batch_delete" => {
            let request: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
            let ids: Vec<String> = request["task_ids"]
                .as_array()
                .map(|ids| ids.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            let (failed, deleted): (Vec<String>, Vec<String>) =
                ids.into_iter().partition(|id| id == "locked");
            Json(json!({"deleted_ids": deleted, "failed_ids": failed})).into_response()
        }
        "POST /api/queues/default/retry_tasks:archive_all" => StatusCode::NO_CONTENT.into_response(),
        _ => (StatusCode::NOT_FOUND, "no such route").into_response(),
    }
}

async fn serve() -> (String, Log) {
    let log: Log = Arc::default();
    let app = Router::new().fallback(api).with_state(log.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/api"), log)
}

fn client(base_url: String, bus: MutationBus) -> TaskscopeClient {
    let api = ApiConfig {
        base_url,
        ..ApiConfig::default()
    };
    TaskscopeClient::new(&api, bus).unwrap()
}

fn retry() -> TaskCollection {
    TaskCollection::new("default", TaskState::Retry)
}

#[tokio::test]
async fn lists_pages_with_stats() {
    let (base, log) = serve().await;
    let c = client(base, MutationBus::default());

    let first = c.list_page(&retry(), 1, 2).await.unwrap();
    let last = c.list_page(&retry(), 3, 2).await.unwrap();

    assert_eq!(first.tasks.len(), 2);
    assert_eq!(first.tasks[0].id, "t0");
    assert_eq!(first.tasks[0].payload, json!({"id": 0}));
    assert_eq!(first.tasks[0].state, TaskState::Retry);
    assert_eq!(first.tasks[0].error_message, "smtp timeout");
    assert!(first.tasks[0].last_failed_at.is_none());
    assert!(first.tasks[0].next_process_at.is_some());
    assert_eq!(first.stats.unwrap().count_for(TaskState::Retry), 5);

    assert_eq!(last.tasks.len(), 1);
    assert_eq!(last.tasks[0].id, "t4");

    assert_eq!(
        log.lock().unwrap().as_slice(),
        [
            "GET /api/queues/default/retry_tasks?page=1&size=2",
            "GET /api/queues/default/retry_tasks?page=3&size=2",
        ]
    );
}

#[tokio::test]
async fn null_task_list_is_an_empty_page() {
    let (base, _) = serve().await;
    let c = client(base, MutationBus::default());
    let page = c
        .list_page(&TaskCollection::new("default", TaskState::Pending), 1, 10)
        .await
        .unwrap();
    assert!(page.tasks.is_empty());
    assert!(page.stats.is_none());
}

#[tokio::test]
async fn server_errors_surface_status_and_body() {
    let (base, _) = serve().await;
    let c = client(base, MutationBus::default());
    let archived = TaskCollection::new("default", TaskState::Archived);

    let err = c.list_page(&archived, 1, 10).await.unwrap_err();
    match err {
        ClientError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "redis: connection refused");
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = c.list_tasks(&archived, 1, 10).await.unwrap_err();
    assert!(matches!(err, ListError::Status { status: 500, .. }));
}

#[tokio::test]
async fn fetches_a_single_task() {
    let (base, _) = serve().await;
    let c = client(base, MutationBus::default());
    let task = c.get_task("default", "t3").await.unwrap();
    assert_eq!(task.id, "t3");
    assert_eq!(task.retried, 3);
    assert_eq!(task.state, TaskState::Retry);
}

#[tokio::test]
async fn single_mutations_are_published() {
    let (base, log) = serve().await;
    let bus = MutationBus::new(8);
    let mut rx = bus.subscribe();
    let c = client(base, bus);

    c.delete_task(&retry(), "t1").await.unwrap();
    c.run_task(&retry(), "t2").await.unwrap();

    let deleted = rx.recv().await.unwrap();
    assert_eq!(deleted.kind, MutationKind::Delete);
    assert_eq!(deleted.scope, MutationScope::Task("t1".into()));
    let ran = rx.recv().await.unwrap();
    assert_eq!(ran.kind, MutationKind::Run);
    assert_eq!(ran.collection, retry());

    assert_eq!(
        log.lock().unwrap().as_slice(),
        [
            "DELETE /api/queues/default/retry_tasks/t1",
            "POST /api/queues/default/retry_tasks/t2:run",
        ]
    );
}

#[tokio::test]
async fn batch_publishes_only_succeeded_ids() {
    let (base, _) = serve().await;
    let bus = MutationBus::new(8);
    let mut rx = bus.subscribe();
    let c = client(base, bus);

    let ids = vec!["t0".to_string(), "locked".to_string(), "t4".to_string()];
    let outcome = c
        .batch_mutate(&retry(), MutationKind::Delete, &ids)
        .await
        .unwrap();

    assert_eq!(outcome.succeeded, vec!["t0", "t4"]);
    assert_eq!(outcome.failed, vec!["locked"]);
    let event = rx.recv().await.unwrap();
    assert_eq!(
        event.scope,
        MutationScope::Batch(vec!["t0".into(), "t4".into()])
    );
}

#[tokio::test]
async fn whole_collection_mutation_is_published() {
    let (base, _) = serve().await;
    let bus = MutationBus::new(8);
    let mut rx = bus.subscribe();
    let c = client(base, bus);

    c.mutate_all(&retry(), MutationKind::Archive).await.unwrap();
    let event = rx.recv().await.unwrap();
    assert_eq!(event.scope, MutationScope::All);
    assert_eq!(event.kind, MutationKind::Archive);
}

#[tokio::test]
async fn unsupported_mutation_never_reaches_the_server() {
    let (base, log) = serve().await;
    let bus = MutationBus::new(8);
    let mut rx = bus.subscribe();
    let c = client(base, bus);

    let pending = TaskCollection::new("default", TaskState::Pending);
    let err = c.run_task(&pending, "t0").await.unwrap_err();

    assert!(matches!(err, ClientError::Invalid(_)));
    assert!(log.lock().unwrap().is_empty());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn failed_mutation_is_not_published() {
    let (base, _) = serve().await;
    let bus = MutationBus::new(8);
    let mut rx = bus.subscribe();
    let c = client(base, bus);

    let err = c.archive_task(&retry(), "missing").await.unwrap_err();
    assert!(matches!(err, ClientError::Status { status: 404, .. }));
    assert!(rx.try_recv().is_err());
}
