//! In-process mock cluster node for the integration tests.
//!
//! Each `MockNode` is a real HTTP server on an ephemeral localhost port,
//! exposing the same endpoints a cluster node does: `/cluster`, `/keys` and
//! the `/keystorage` family, backed by an in-memory store. The topology a
//! node reports is settable, so tests can simulate snapshot changes, and a
//! "dead" node is simply an address nothing listens on.

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use shardkv_client::SeedNode;
use shardkv_client::cluster::types::{Node, NodeState, Topology};
use shardkv_client::routing::hash::PARTITION_COUNT;
use shardkv_client::routing::protocol::{
    KeyList, KvRequest, KvResponse, KvUpdateRequest, ResponseEnvelope,
};

pub struct MockState {
    store: Mutex<HashMap<String, Vec<u8>>>,
    topology: Mutex<Topology>,
}

pub struct MockNode {
    pub addr: SocketAddr,
    listener: Option<TcpListener>,
    state: Arc<MockState>,
}

impl MockNode {
    /// Reserve a port for the node without serving yet, so tests can build
    /// a topology that references the address before starting the server.
    pub async fn bind() -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        Self {
            addr,
            listener: Some(listener),
            state: Arc::new(MockState {
                store: Mutex::new(HashMap::new()),
                topology: Mutex::new(Topology { nodes: vec![] }),
            }),
        }
    }

    /// Start serving with the given topology snapshot.
    pub fn start(&mut self, topology: Topology) {
        self.set_topology(topology);
        let listener = self.listener.take().expect("node already started");
        let state = self.state.clone();

        let app = Router::new()
            .route("/cluster", get(handle_cluster))
            .route("/keys", get(handle_keys))
            .route("/keystorage", get(handle_count).post(handle_put))
            .route("/keystorage/:key", get(handle_get).delete(handle_delete))
            .route("/keystorage/:key/getandremove", get(handle_get_and_remove))
            .route("/keystorage/:key/updatevalueifequal", post(handle_update))
            .layer(Extension(state));

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
    }

    /// Replace the topology this node reports from `/cluster`.
    pub fn set_topology(&self, topology: Topology) {
        *self.state.topology.lock().unwrap() = topology;
    }

    /// Seed the node's store directly, bypassing the client.
    pub fn insert_raw(&self, key: &str, data: Vec<u8>) {
        self.state.store.lock().unwrap().insert(key.to_string(), data);
    }

    pub fn store_len(&self) -> usize {
        self.state.store.lock().unwrap().len()
    }
}

/// An address guaranteed to refuse connections: bind an ephemeral port and
/// release it again.
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn node(name: &str, addr: SocketAddr, partitions: Vec<i32>, twins: Vec<&str>) -> Node {
    Node {
        name: name.to_string(),
        host: addr.ip().to_string(),
        port: addr.port(),
        state: NodeState::Active,
        partition_ranges: partitions,
        twin_names: twins.into_iter().map(str::to_string).collect(),
    }
}

pub fn all_partitions() -> Vec<i32> {
    (0..PARTITION_COUNT).collect()
}

pub fn seed(addr: SocketAddr) -> SeedNode {
    SeedNode::new(addr.ip().to_string(), addr.port())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

fn done<T>(data: T) -> ResponseEnvelope<T> {
    ResponseEnvelope {
        status: "done".to_string(),
        code: "ok".to_string(),
        data: Some(data),
    }
}

fn error<T>(code: &str) -> ResponseEnvelope<T> {
    ResponseEnvelope {
        status: "error".to_string(),
        code: code.to_string(),
        data: None,
    }
}

async fn handle_cluster(
    Extension(state): Extension<Arc<MockState>>,
) -> Json<ResponseEnvelope<Topology>> {
    Json(done(state.topology.lock().unwrap().clone()))
}

async fn handle_keys(
    Extension(state): Extension<Arc<MockState>>,
) -> Json<ResponseEnvelope<KeyList>> {
    let keys = state.store.lock().unwrap().keys().cloned().collect();
    Json(done(KeyList { keys }))
}

async fn handle_count(Extension(state): Extension<Arc<MockState>>) -> Json<ResponseEnvelope<i64>> {
    let count = state.store.lock().unwrap().len() as i64;
    Json(done(count))
}

async fn handle_put(
    Extension(state): Extension<Arc<MockState>>,
    Json(request): Json<KvRequest>,
) -> (StatusCode, Json<ResponseEnvelope<serde_json::Value>>) {
    state
        .store
        .lock()
        .unwrap()
        .insert(request.key, request.data);
    (StatusCode::OK, Json(done(serde_json::Value::Null)))
}

async fn handle_get(
    Extension(state): Extension<Arc<MockState>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<ResponseEnvelope<KvResponse>>) {
    match state.store.lock().unwrap().get(&key) {
        Some(data) => (
            StatusCode::OK,
            Json(done(KvResponse {
                key,
                data: data.clone(),
            })),
        ),
        None => (StatusCode::NOT_FOUND, Json(error("key_not_found"))),
    }
}

async fn handle_get_and_remove(
    Extension(state): Extension<Arc<MockState>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<ResponseEnvelope<KvResponse>>) {
    match state.store.lock().unwrap().remove(&key) {
        Some(data) => (StatusCode::OK, Json(done(KvResponse { key, data }))),
        None => (StatusCode::NOT_FOUND, Json(error("key_not_found"))),
    }
}

async fn handle_delete(
    Extension(state): Extension<Arc<MockState>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<ResponseEnvelope<serde_json::Value>>) {
    match state.store.lock().unwrap().remove(&key) {
        Some(_) => (StatusCode::OK, Json(done(serde_json::Value::Null))),
        None => (StatusCode::NOT_FOUND, Json(error("key_not_found"))),
    }
}

async fn handle_update(
    Extension(state): Extension<Arc<MockState>>,
    Path(key): Path<String>,
    Json(request): Json<KvUpdateRequest>,
) -> (StatusCode, Json<ResponseEnvelope<serde_json::Value>>) {
    let mut store = state.store.lock().unwrap();
    match store.get(&key) {
        None => (StatusCode::NOT_FOUND, Json(error("key_not_found"))),
        Some(current) if *current == request.data => {
            store.insert(key, request.new_data);
            (StatusCode::OK, Json(done(serde_json::Value::Null)))
        }
        Some(_) => (StatusCode::FORBIDDEN, Json(error("value_not_equal"))),
    }
}
