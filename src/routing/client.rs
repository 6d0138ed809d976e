//! Cluster Client
//!
//! Owns the current topology snapshot and a partition-to-session index, and
//! orchestrates every operation: compute the partition, attempt the primary
//! node, fan out to its twins on transport failure, and refresh the topology
//! whenever the primary could not be reached.
//!
//! ## Concurrency
//! The topology and both session indices live in one [`RouterState`] behind a
//! `tokio::sync::RwLock`. Readers hold the lock only for the map lookup, and
//! the refresh path takes the write lock only for the in-memory swap; the
//! network round trip fetching a new snapshot always happens outside the
//! lock. Concurrent refreshes are last-writer-wins: routing is advisory and
//! twin fallback masks a misroute.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;

use crate::cluster::types::{Node, Topology};
use crate::config::Config;
use crate::error::ClientError;

use super::hash::{PARTITION_COUNT, partition_hash};
use super::protocol::{
    KEY_STORAGE_PATH, KEYS_PATH, KeyList, KvRequest, KvResponse, KvUpdateRequest,
    ResponseEnvelope, get_and_remove_path, key_path, topology_endpoint, update_value_path,
};
use super::session::Session;

/// Envelope decoded when only the status matters.
type Ack = ResponseEnvelope<serde_json::Value>;

/// Per-node object counts plus their sum, as reported by `Client::count`.
#[derive(Debug, Clone, Default)]
pub struct Counters {
    pub nodes: HashMap<String, i64>,
    pub total: i64,
}

/// One consistent routing view: the topology snapshot and the session
/// indices derived from it. Rebuilt wholesale on every refresh.
pub(crate) struct RouterState {
    pub(crate) topology: Topology,
    by_name: HashMap<String, Session>,
    by_partition: HashMap<i32, Session>,
}

impl RouterState {
    pub(crate) fn build(topology: Topology, http: &reqwest::Client) -> Self {
        let mut by_name = HashMap::with_capacity(topology.nodes.len());
        let mut by_partition = HashMap::with_capacity(PARTITION_COUNT as usize);
        for node in &topology.nodes {
            let session = Session::new(http.clone(), node.clone());
            for partition in &node.partition_ranges {
                by_partition.insert(*partition, session.clone());
            }
            by_name.insert(node.name.clone(), session);
        }
        Self {
            topology,
            by_name,
            by_partition,
        }
    }

    pub(crate) fn session_for(&self, partition: i32) -> Option<Session> {
        self.by_partition.get(&partition).cloned()
    }

    /// Sessions of the named twins, in topology order.
    pub(crate) fn twin_sessions(&self, names: &[String]) -> Vec<Session> {
        self.topology
            .twins_of(names)
            .into_iter()
            .filter_map(|node| self.by_name.get(&node.name).cloned())
            .collect()
    }

    /// One session per topology node, in topology order.
    fn node_sessions(&self) -> Vec<Session> {
        self.topology
            .nodes
            .iter()
            .filter_map(|node| self.by_name.get(&node.name).cloned())
            .collect()
    }
}

struct ClientInner {
    http: reqwest::Client,
    state: RwLock<RouterState>,
}

/// Client for a partitioned key-value cluster.
///
/// Thread safe: all operations take `&self` and may run concurrently from
/// any number of tasks.
pub struct Client {
    inner: Arc<ClientInner>,
    refresher: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl Client {
    /// Connect to the cluster, fetching the initial topology from the seed
    /// list. Seeds are contacted in order; the first one answering with a
    /// topology snapshot wins. Fails with the last transport error when no
    /// seed is reachable.
    pub async fn connect(config: Config) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(ms) = config.request_timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let http = builder.build().map_err(ClientError::Transport)?;

        let seeds: Vec<(String, u16)> = config
            .cluster_nodes
            .iter()
            .map(|seed| (seed.host.clone(), seed.port))
            .collect();
        let topology = fetch_topology(&http, &seeds).await?;

        let inner = Arc::new(ClientInner {
            state: RwLock::new(RouterState::build(topology, &http)),
            http,
        });

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = spawn_refresher(
            inner.clone(),
            config.effective_check_period(),
            shutdown_rx,
        );

        Ok(Self {
            inner,
            refresher: Mutex::new(Some(handle)),
            shutdown,
        })
    }

    /// Stop the background topology refresher. Idempotent; in-flight
    /// operations are not cancelled.
    pub async fn close(&self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.refresher.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// The nodes of the current topology snapshot.
    pub async fn nodes(&self) -> Vec<Node> {
        self.inner.state.read().await.topology.nodes.clone()
    }

    /// Store a value under `key`, serialized as JSON.
    ///
    /// `ttl` is the time to live in seconds; zero means the object is never
    /// expired by the cluster.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T, ttl: u64) -> Result<(), ClientError> {
        let data = serde_json::to_vec(value)?;
        self.put_raw(key, data, ttl).await
    }

    /// Store a raw byte payload under `key`.
    pub async fn put_raw(&self, key: &str, data: Vec<u8>, ttl: u64) -> Result<(), ClientError> {
        let partition = partition_hash(key, PARTITION_COUNT);
        let primary = self.primary_session(partition).await?;
        let request = KvRequest {
            key: key.to_string(),
            data,
            collection: None,
            ttl,
            partition_hash: partition,
        };

        match primary.post::<KvRequest, Ack>(KEY_STORAGE_PATH, &request).await {
            Ok(exchange) => write_status(exchange.status),
            Err(primary_err) => {
                tracing::warn!(
                    "Put to {} failed, trying twins: {}",
                    primary.node().name,
                    primary_err
                );
                let twins = self.twin_sessions(&primary).await;
                let mut all_ok = !twins.is_empty();
                for twin in &twins {
                    let ok = matches!(
                        twin.post::<KvRequest, Ack>(KEY_STORAGE_PATH, &request).await,
                        Ok(exchange) if exchange.status == 200
                    );
                    all_ok = all_ok && ok;
                }
                refresh_topology(&self.inner).await;
                if all_ok { Ok(()) } else { Err(primary_err) }
            }
        }
    }

    /// Retrieve the value stored under `key`, deserialized from JSON.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, ClientError> {
        let data = self.read_value(key, false).await?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Retrieve the raw byte payload stored under `key`.
    pub async fn get_raw(&self, key: &str) -> Result<Vec<u8>, ClientError> {
        self.read_value(key, false).await
    }

    /// Retrieve the value stored under `key` and remove it from the cluster
    /// in the same round trip.
    pub async fn get_and_remove<T: DeserializeOwned>(&self, key: &str) -> Result<T, ClientError> {
        let data = self.read_value(key, true).await?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Remove the value stored under `key`.
    pub async fn delete(&self, key: &str) -> Result<(), ClientError> {
        let partition = partition_hash(key, PARTITION_COUNT);
        let primary = self.primary_session(partition).await?;
        let path = key_path(key);

        match primary.delete::<Ack>(&path).await {
            Ok(exchange) => write_status(exchange.status),
            Err(primary_err) => {
                tracing::warn!(
                    "Delete on {} failed, trying twins: {}",
                    primary.node().name,
                    primary_err
                );
                let twins = self.twin_sessions(&primary).await;
                let mut all_ok = !twins.is_empty();
                for twin in &twins {
                    // A twin that never held the key has nothing to delete,
                    // so 404 counts as success for the fan-out.
                    let ok = matches!(
                        twin.delete::<Ack>(&path).await,
                        Ok(exchange) if exchange.status == 200 || exchange.status == 404
                    );
                    all_ok = all_ok && ok;
                }
                refresh_topology(&self.inner).await;
                if all_ok { Ok(()) } else { Err(primary_err) }
            }
        }
    }

    /// Replace the value under `key` with `new`, but only if the stored
    /// value equals `old`. A mismatch surfaces as
    /// [`ClientError::PreconditionFailed`].
    pub async fn update_value_if_equal<T: Serialize, U: Serialize>(
        &self,
        key: &str,
        old: &T,
        new: &U,
    ) -> Result<(), ClientError> {
        let old_data = serde_json::to_vec(old)?;
        let new_data = serde_json::to_vec(new)?;
        let partition = partition_hash(key, PARTITION_COUNT);
        let primary = self.primary_session(partition).await?;
        let path = update_value_path(key);
        let request = KvUpdateRequest {
            key: key.to_string(),
            new_key: None,
            data: old_data,
            new_data,
            partition_hash: partition,
            new_partition_hash: None,
        };

        match primary.post::<KvUpdateRequest, Ack>(&path, &request).await {
            Ok(exchange) => match exchange.status {
                200 => Ok(()),
                403 => Err(ClientError::PreconditionFailed),
                404 => Err(ClientError::KeyNotFound),
                status => Err(ClientError::InvalidResponse { status }),
            },
            Err(primary_err) => {
                tracing::warn!(
                    "Conditional update on {} failed, trying twins: {}",
                    primary.node().name,
                    primary_err
                );
                let twins = self.twin_sessions(&primary).await;
                let mut reachable = !twins.is_empty();
                let mut all_matched = true;
                let mut saw_forbidden = false;
                for twin in &twins {
                    match twin.post::<KvUpdateRequest, Ack>(&path, &request).await {
                        Ok(exchange) => {
                            if exchange.status == 403 {
                                saw_forbidden = true;
                            }
                            all_matched = all_matched && exchange.status == 200;
                        }
                        Err(_) => reachable = false,
                    }
                }
                refresh_topology(&self.inner).await;
                if reachable && all_matched {
                    Ok(())
                } else if reachable && saw_forbidden {
                    Err(ClientError::PreconditionFailed)
                } else if reachable {
                    Err(ClientError::KeyNotFound)
                } else {
                    Err(primary_err)
                }
            }
        }
    }

    /// Object count of every reachable node, plus their sum.
    ///
    /// Fans out to each known node once; nodes that fail to answer are
    /// excluded from the result rather than retried.
    pub async fn count(&self) -> Counters {
        let sessions = self.inner.state.read().await.node_sessions();

        let mut counters = Counters::default();
        for session in sessions {
            match session.get::<ResponseEnvelope<i64>>(KEY_STORAGE_PATH).await {
                Ok(exchange) if exchange.status == 200 => {
                    if let Some(count) = exchange.body.and_then(|envelope| envelope.data) {
                        counters.nodes.insert(session.node().name.clone(), count);
                        counters.total += count;
                    }
                }
                Ok(exchange) => {
                    tracing::debug!(
                        "Count on {} answered status {}",
                        session.node().name,
                        exchange.status
                    );
                }
                Err(e) => {
                    tracing::debug!("Count on {} unreachable: {}", session.node().name, e);
                }
            }
        }
        counters
    }

    /// Union of the keys reported by every reachable node, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let sessions = self.inner.state.read().await.node_sessions();

        let mut keys = BTreeSet::new();
        for session in sessions {
            match session.get::<ResponseEnvelope<KeyList>>(KEYS_PATH).await {
                Ok(exchange) if exchange.status == 200 => {
                    if let Some(list) = exchange.body.and_then(|envelope| envelope.data) {
                        keys.extend(list.keys);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("Key listing on {} unreachable: {}", session.node().name, e);
                }
            }
        }
        keys.into_iter().collect()
    }

    /// Shared read path of `get`, `get_raw` and `get_and_remove`.
    ///
    /// On primary transport failure the twins are tried in order and the
    /// first 200 wins; the topology is refreshed before returning either way.
    async fn read_value(&self, key: &str, and_remove: bool) -> Result<Vec<u8>, ClientError> {
        let partition = partition_hash(key, PARTITION_COUNT);
        let primary = self.primary_session(partition).await?;
        let path = if and_remove {
            get_and_remove_path(key)
        } else {
            key_path(key)
        };

        match primary.get::<ResponseEnvelope<KvResponse>>(&path).await {
            Ok(exchange) => match exchange.status {
                200 => extract_value(exchange.body),
                404 => Err(ClientError::KeyNotFound),
                status => Err(ClientError::InvalidResponse { status }),
            },
            Err(primary_err) => {
                tracing::warn!(
                    "Read from {} failed, trying twins: {}",
                    primary.node().name,
                    primary_err
                );
                let twins = self.twin_sessions(&primary).await;
                let mut value = None;
                let mut saw_not_found = false;
                for twin in &twins {
                    match twin.get::<ResponseEnvelope<KvResponse>>(&path).await {
                        Ok(exchange) if exchange.status == 200 => {
                            if let Ok(data) = extract_value(exchange.body) {
                                value = Some(data);
                                break;
                            }
                        }
                        Ok(exchange) if exchange.status == 404 => saw_not_found = true,
                        Ok(_) | Err(_) => {}
                    }
                }
                refresh_topology(&self.inner).await;
                match value {
                    Some(data) => Ok(data),
                    None if saw_not_found => Err(ClientError::KeyNotFound),
                    None => Err(primary_err),
                }
            }
        }
    }

    async fn primary_session(&self, partition: i32) -> Result<Session, ClientError> {
        self.inner
            .state
            .read()
            .await
            .session_for(partition)
            .ok_or(ClientError::NodeNotFound)
    }

    async fn twin_sessions(&self, primary: &Session) -> Vec<Session> {
        self.inner
            .state
            .read()
            .await
            .twin_sessions(&primary.node().twin_names)
    }
}

/// Map a write/delete status to the operation outcome.
fn write_status(status: u16) -> Result<(), ClientError> {
    match status {
        200 => Ok(()),
        404 => Err(ClientError::KeyNotFound),
        status => Err(ClientError::InvalidResponse { status }),
    }
}

fn extract_value(body: Option<ResponseEnvelope<KvResponse>>) -> Result<Vec<u8>, ClientError> {
    body.and_then(ResponseEnvelope::into_data)
        .map(|kv| kv.data)
        .ok_or(ClientError::InvalidResponse { status: 200 })
}

/// Contact `endpoints` in order until one answers with a topology snapshot.
async fn fetch_topology(
    http: &reqwest::Client,
    endpoints: &[(String, u16)],
) -> Result<Topology, ClientError> {
    let mut last_err = None;
    for (host, port) in endpoints {
        let url = topology_endpoint(host, *port);
        match http.get(&url).send().await {
            Ok(response) if response.status().as_u16() == 200 => {
                match response.json::<ResponseEnvelope<Topology>>().await {
                    Ok(envelope) => {
                        if let Some(topology) = envelope.data {
                            tracing::info!(
                                "Connected to {}:{}: topology has {} node(s)",
                                host,
                                port,
                                topology.nodes.len()
                            );
                            return Ok(topology);
                        }
                        tracing::warn!("Topology answer from {}:{} carried no data", host, port);
                        last_err = Some(ClientError::InvalidResponse { status: 200 });
                    }
                    Err(e) => {
                        tracing::warn!("Undecodable topology from {}:{}: {}", host, port, e);
                        last_err = Some(ClientError::InvalidResponse { status: 200 });
                    }
                }
            }
            Ok(response) => {
                let status = response.status().as_u16();
                tracing::info!("Topology fetch from {}:{} answered {}", host, port, status);
                last_err = Some(ClientError::InvalidResponse { status });
            }
            Err(e) => {
                tracing::info!("Connection to {}:{} failed: {}", host, port, e);
                last_err = Some(ClientError::Transport(e));
            }
        }
    }
    Err(last_err.unwrap_or(ClientError::NodeNotFound))
}

/// Re-fetch the topology from the currently known nodes and swap the routing
/// state. A total failure keeps the previous snapshot in effect.
async fn refresh_topology(inner: &ClientInner) {
    let endpoints: Vec<(String, u16)> = {
        let state = inner.state.read().await;
        state
            .topology
            .nodes
            .iter()
            .map(|node| (node.host.clone(), node.port))
            .collect()
    };

    match fetch_topology(&inner.http, &endpoints).await {
        Ok(topology) => {
            let mut state = inner.state.write().await;
            *state = RouterState::build(topology, &inner.http);
            tracing::debug!(
                "Topology refreshed: {} node(s)",
                state.topology.nodes.len()
            );
        }
        Err(e) => {
            tracing::warn!("Topology refresh failed, keeping previous snapshot: {}", e);
        }
    }
}

fn spawn_refresher(
    inner: Arc<ClientInner>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately; consume it so the first
        // refresh happens one full period after startup.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    refresh_topology(&inner).await;
                }
                _ = shutdown.changed() => {
                    tracing::debug!("Topology refresher stopped");
                    return;
                }
            }
        }
    })
}
