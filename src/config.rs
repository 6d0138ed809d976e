//! Client Configuration
//!
//! The configuration surface is deliberately small: an initial seed list of
//! cluster nodes used to bootstrap the topology, the period of the background
//! topology check, and an optional request timeout handed to the transport.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default topology check period, in seconds.
pub const DEFAULT_CLUSTER_CHECK_PERIOD: u64 = 30;
/// Smallest accepted check period, in seconds. Shorter values are clamped
/// to avoid refresh storms against the cluster.
pub const MIN_CLUSTER_CHECK_PERIOD: u64 = 10;

/// Address of a node used to bootstrap the first topology fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedNode {
    pub host: String,
    pub port: u16,
}

impl SeedNode {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Nodes contacted in order during startup until one answers with a
    /// topology snapshot.
    pub cluster_nodes: Vec<SeedNode>,
    /// Period of the background topology check, in seconds.
    #[serde(default = "default_check_period")]
    pub cluster_check_period: u64,
    /// Optional timeout applied to every HTTP request, in milliseconds.
    /// Unset means the transport imposes no deadline.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

fn default_check_period() -> u64 {
    DEFAULT_CLUSTER_CHECK_PERIOD
}

impl Config {
    pub fn new(cluster_nodes: Vec<SeedNode>) -> Self {
        Self {
            cluster_nodes,
            cluster_check_period: DEFAULT_CLUSTER_CHECK_PERIOD,
            request_timeout_ms: None,
        }
    }

    /// Load a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// The check period with the minimum floor applied.
    pub fn effective_check_period(&self) -> Duration {
        Duration::from_secs(self.cluster_check_period.max(MIN_CLUSTER_CHECK_PERIOD))
    }
}
