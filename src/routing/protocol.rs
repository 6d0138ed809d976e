//! Cluster Wire Protocol
//!
//! Defines the HTTP endpoints exposed by every cluster node and the Data
//! Transfer Objects (DTOs) exchanged with them.
//!
//! Every response arrives wrapped in a [`ResponseEnvelope`] whose `data`
//! field is polymorphic per endpoint; each call site decodes it into the
//! concrete shape for the endpoint it invoked.

use serde::{Deserialize, Serialize};

// --- API Endpoints ---

/// Endpoint serving the full cluster topology snapshot.
pub const CLUSTER_PATH: &str = "/cluster";
/// Endpoint serving the descriptor of the answering node itself.
pub const CLUSTER_ME_PATH: &str = "/cluster/me";
/// Endpoint listing every key stored on a node.
pub const KEYS_PATH: &str = "/keys";
/// Write target (POST) and per-node object count (GET).
pub const KEY_STORAGE_PATH: &str = "/keystorage";

/// Full URL of the topology endpoint on a node, used before any session exists.
pub fn topology_endpoint(host: &str, port: u16) -> String {
    format!("http://{}:{}{}", host, port, CLUSTER_PATH)
}

/// Path reading or deleting a single key.
pub fn key_path(key: &str) -> String {
    format!("{}/{}", KEY_STORAGE_PATH, key)
}

/// Path of the destructive read (return the value, then remove it).
pub fn get_and_remove_path(key: &str) -> String {
    format!("{}/{}/getandremove", KEY_STORAGE_PATH, key)
}

/// Path of the conditional update (replace only if the stored value matches).
pub fn update_value_path(key: &str) -> String {
    format!("{}/{}/updatevalueifequal", KEY_STORAGE_PATH, key)
}

// --- Data Transfer Objects ---

/// Write request for one key.
///
/// `partition_hash` carries the client-computed partition so the node can
/// verify the routing. A `ttl` of zero means the object never expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvRequest {
    pub key: String,
    pub data: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Time to live in seconds; zero disables expiry.
    pub ttl: u64,
    pub partition_hash: i32,
}

/// Conditional-update request: replace `data` with `new_data` only if the
/// stored value equals `data`. The optional `new_key`/`new_partition_hash`
/// support renaming the entry in the same round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvUpdateRequest {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_key: Option<String>,
    pub data: Vec<u8>,
    pub new_data: Vec<u8>,
    pub partition_hash: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_partition_hash: Option<i32>,
}

/// Payload of a successful single-key read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvResponse {
    pub key: String,
    pub data: Vec<u8>,
}

/// Payload of the per-node key listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyList {
    pub keys: Vec<String>,
}

/// Generic response envelope wrapping every endpoint's payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope<T> {
    pub status: String,
    pub code: String,
    pub data: Option<T>,
}

impl<T> ResponseEnvelope<T> {
    /// Consume the envelope, keeping only the payload.
    pub fn into_data(self) -> Option<T> {
        self.data
    }
}
