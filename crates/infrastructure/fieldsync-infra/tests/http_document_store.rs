use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use fieldsync_infra::{
    probe_once, ConnectivityMonitor, ConnectivityProvider, HttpDocumentStore, RemoteError,
    RemoteReader, RemoteWriter,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
struct Backend {
    docs: Arc<Mutex<HashMap<String, Vec<Value>>>>,
    auth: Arc<Mutex<Vec<Option<String>>>>,
}

async fn append(
    State(backend): State<Backend>,
    Path(collection): Path<String>,
    headers: HeaderMap,
    Json(doc): Json<Value>,
) -> impl IntoResponse {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    backend.auth.lock().unwrap().push(auth);
    match collection.as_str() {
        "locked" => (StatusCode::FORBIDDEN, "missing permission").into_response(),
        "flaky" => (StatusCode::SERVICE_UNAVAILABLE, "try later").into_response(),
        _ => {
            backend
                .docs
                .lock()
                .unwrap()
                .entry(collection)
                .or_default()
                .push(doc);
            StatusCode::CREATED.into_response()
        }
    }
}

async fn list(State(backend): State<Backend>, Path(collection): Path<String>) -> impl IntoResponse {
    match collection.as_str() {
        "wrapped" => Json(json!({ "documents": [{ "name": "SE Norte" }] })).into_response(),
        "broken" => "not json".into_response(),
        _ => {
            let docs = backend
                .docs
                .lock()
                .unwrap()
                .get(&collection)
                .cloned()
                .unwrap_or_default();
            Json(Value::Array(docs)).into_response()
        }
    }
}

async fn start_backend() -> (std::net::SocketAddr, Backend, tokio::task::JoinHandle<()>) {
    let backend = Backend::default();
    let app = Router::new()
        .route("/api/:collection", get(list).post(append))
        .route("/health", get(|| async { "ok" }))
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, backend, handle)
}

async fn unused_addr() -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test]
async fn written_documents_are_listed_back() {
    let (addr, backend, _server) = start_backend().await;
    let store = HttpDocumentStore::new(reqwest::Client::new(), &format!("http://{addr}/api"))
        .unwrap()
        .with_token(Some("secret".into()));

    store
        .write("inspections", &json!({ "equipment": "TR-01", "status": "ok" }))
        .await
        .unwrap();
    store
        .write("inspections", &json!({ "equipment": "TR-02", "status": "fault" }))
        .await
        .unwrap();

    let docs = store.list_all("inspections").await.unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["equipment"], "TR-01");
    assert_eq!(docs[1]["equipment"], "TR-02");

    let auth = backend.auth.lock().unwrap().clone();
    assert!(auth.iter().all(|a| a.as_deref() == Some("Bearer secret")));
}

#[tokio::test]
async fn listing_accepts_wrapped_documents() {
    let (addr, _backend, _server) = start_backend().await;
    let store =
        HttpDocumentStore::new(reqwest::Client::new(), &format!("http://{addr}/api/")).unwrap();

    let docs = store.list_all("wrapped").await.unwrap();
    assert_eq!(docs, vec![json!({ "name": "SE Norte" })]);

    let err = store.list_all("broken").await.unwrap_err();
    assert!(matches!(err, RemoteError::Decode(_)));
}

#[tokio::test]
async fn permission_rejection_is_terminal() {
    let (addr, _backend, _server) = start_backend().await;
    let store =
        HttpDocumentStore::new(reqwest::Client::new(), &format!("http://{addr}/api")).unwrap();

    let err = store.write("locked", &json!({})).await.unwrap_err();
    match &err {
        RemoteError::Rejected { status, message } => {
            assert_eq!(*status, 403);
            assert_eq!(message, "missing permission");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!err.is_retryable());

    let err = store.write("flaky", &json!({})).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn unreachable_backend_is_retryable() {
    let addr = unused_addr().await;
    let store =
        HttpDocumentStore::new(reqwest::Client::new(), &format!("http://{addr}/api")).unwrap();

    let err = store.write("inspections", &json!({})).await.unwrap_err();
    assert!(matches!(err, RemoteError::Network(_)), "{err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn probe_reports_reachability() {
    let (addr, _backend, _server) = start_backend().await;
    let client = reqwest::Client::new();

    let up = reqwest::Url::parse(&format!("http://{addr}/health")).unwrap();
    assert!(probe_once(&client, &up).await);

    // Any HTTP answer, even a 404, means the network path works.
    let missing = reqwest::Url::parse(&format!("http://{addr}/nowhere")).unwrap();
    assert!(probe_once(&client, &missing).await);

    let down = reqwest::Url::parse(&format!("http://{}/health", unused_addr().await)).unwrap();
    assert!(!probe_once(&client, &down).await);
}

#[tokio::test]
async fn probe_task_flips_monitor_and_stops_on_cancel() {
    let (addr, _backend, _server) = start_backend().await;
    let monitor = ConnectivityMonitor::new(false);
    let mut rx = monitor.subscribe();
    let cancel = CancellationToken::new();

    let url = reqwest::Url::parse(&format!("http://{addr}/health")).unwrap();
    let probe = monitor.spawn_probe(
        reqwest::Client::new(),
        url,
        Duration::from_millis(20),
        cancel.clone(),
    );

    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .expect("probe never reported")
        .unwrap();
    assert!(*rx.borrow_and_update());
    assert!(monitor.is_connected());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), probe)
        .await
        .expect("probe did not stop")
        .unwrap();
}
