#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use common::{KeySerializer, MirrorResult, StringKeySerializer};
use mirror_client::{DefaultPartitionFinder, MirrorClientConfig, MirrorQueryClient, PartitionFinder};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// In-process replica speaking the mirror wire contract.
#[derive(Clone, Default)]
pub struct StubReplica {
    values: Arc<RwLock<BTreeMap<String, Value>>>,
    partitions: Arc<RwLock<BTreeMap<u32, String>>>,
    stale: Arc<AtomicBool>,
    empty_ok: Arc<AtomicBool>,
    fail_status: Arc<RwLock<Option<u16>>>,
    partition_requests: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubReplica {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, value: Value) {
        self.values.write().unwrap().insert(key.to_string(), value);
    }

    pub fn set_partitions(&self, entries: &[(u32, SocketAddr)]) {
        let snapshot = entries
            .iter()
            .map(|(partition, addr)| (*partition, addr.to_string()))
            .collect();
        *self.partitions.write().unwrap() = snapshot;
    }

    pub fn set_stale(&self, stale: bool) {
        self.stale.store(stale, Ordering::SeqCst);
    }

    pub fn set_empty_ok(&self, empty: bool) {
        self.empty_ok.store(empty, Ordering::SeqCst);
    }

    pub fn fail_with(&self, status: u16) {
        *self.fail_status.write().unwrap() = Some(status);
    }

    pub fn partition_requests(&self) -> usize {
        self.partition_requests.load(Ordering::SeqCst)
    }

    /// Path and query of every mirror request received, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub async fn spawn(&self) -> SocketAddr {
        let app = Router::new()
            .route("/mirror", get(all_values))
            .route("/mirror/keys", get(key_values))
            .route("/mirror/range/:key", get(range_values))
            .route("/mirror/:key", get(point_value))
            .route("/streams/partitions", get(partitions))
            .with_state(self.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        addr
    }

    fn record(&self, uri: &Uri) {
        let target = uri
            .path_and_query()
            .map(|p| p.to_string())
            .unwrap_or_else(|| uri.path().to_string());
        self.requests.lock().unwrap().push(target);
    }

    fn forced(&self) -> Option<Response> {
        if let Some(status) = *self.fail_status.read().unwrap() {
            let status = StatusCode::from_u16(status).unwrap();
            return Some(self.reply(
                status,
                json!({
                    "type": "errors/serverError",
                    "title": status.canonical_reason().unwrap_or("error"),
                    "code": status.as_u16(),
                    "detail": "stub failure"
                }),
            ));
        }
        if self.empty_ok.load(Ordering::SeqCst) {
            return Some(self.with_header((StatusCode::OK, "").into_response()));
        }
        None
    }

    fn reply(&self, status: StatusCode, body: Value) -> Response {
        self.with_header((status, Json(body)).into_response())
    }

    fn with_header(&self, mut response: Response) -> Response {
        if self.stale.load(Ordering::SeqCst) {
            response
                .headers_mut()
                .insert("X-Cache-Update", HeaderValue::from_static("?1"));
        }
        response
    }
}

async fn point_value(
    State(stub): State<StubReplica>,
    Path(key): Path<String>,
    uri: Uri,
) -> Response {
    stub.record(&uri);
    if let Some(response) = stub.forced() {
        return response;
    }
    let value = stub.values.read().unwrap().get(&key).cloned();
    match value {
        Some(value) => stub.reply(StatusCode::OK, json!({ "value": value })),
        None => stub.reply(
            StatusCode::NOT_FOUND,
            json!({
                "type": "errors/clientError",
                "title": "Not Found",
                "code": 404,
                "detail": format!("Key {key} does not exist")
            }),
        ),
    }
}

#[derive(Deserialize)]
struct Ids {
    ids: String,
}

async fn key_values(
    State(stub): State<StubReplica>,
    Query(ids): Query<Ids>,
    uri: Uri,
) -> Response {
    stub.record(&uri);
    if let Some(response) = stub.forced() {
        return response;
    }
    let values = stub.values.read().unwrap();
    let found: Vec<Value> = ids
        .ids
        .split(',')
        .filter_map(|id| values.get(id).cloned())
        .collect();
    stub.reply(StatusCode::OK, json!({ "value": found }))
}

async fn all_values(State(stub): State<StubReplica>, uri: Uri) -> Response {
    stub.record(&uri);
    if let Some(response) = stub.forced() {
        return response;
    }
    let values: Vec<Value> = stub.values.read().unwrap().values().cloned().collect();
    stub.reply(StatusCode::OK, json!({ "value": values }))
}

#[derive(Deserialize)]
struct Bounds {
    from: String,
    to: String,
}

async fn range_values(
    State(stub): State<StubReplica>,
    Path(key): Path<String>,
    Query(bounds): Query<Bounds>,
    uri: Uri,
) -> Response {
    stub.record(&uri);
    if let Some(response) = stub.forced() {
        return response;
    }
    stub.reply(
        StatusCode::OK,
        json!({ "value": [format!("{key}:{}-{}", bounds.from, bounds.to)] }),
    )
}

async fn partitions(State(stub): State<StubReplica>) -> Response {
    stub.partition_requests.fetch_add(1, Ordering::SeqCst);
    let snapshot = stub.partitions.read().unwrap().clone();
    (StatusCode::OK, Json(snapshot)).into_response()
}

/// Address nothing listens on.
pub fn dead_address() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("local addr")
}

/// First generated string key that lands on `partition` out of `count`.
pub fn key_for_partition(partition: u32, count: u32) -> String {
    (0..10_000)
        .map(|i| format!("key-{i}"))
        .find(|key| {
            DefaultPartitionFinder
                .partition_for(key.as_bytes(), count)
                .unwrap()
                == partition
        })
        .expect("some key maps to every partition")
}

pub fn client_config(service: SocketAddr) -> MirrorClientConfig {
    MirrorClientConfig::new(service.to_string())
        .with_connect_timeout(Duration::from_millis(500))
        .with_request_timeout(Duration::from_secs(2))
}

pub async fn connect(service: SocketAddr) -> MirrorResult<MirrorQueryClient<str, Value>> {
    let serializer: Arc<dyn KeySerializer<str>> = Arc::new(StringKeySerializer);
    MirrorQueryClient::connect(&client_config(service), serializer).await
}
