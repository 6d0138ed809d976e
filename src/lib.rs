//! Partitioned Key-Value Cluster Client Library
//!
//! This library crate gives application code read/write access to a partitioned
//! key-value cluster reachable over HTTP. It maps a logical key to the cluster
//! node that owns it, issues the request, and transparently retries against
//! replica ("twin") nodes when the primary is unreachable, while keeping a
//! background-refreshed view of the cluster topology.
//!
//! ## Architecture Modules
//! The crate is composed of four loosely coupled subsystems:
//!
//! - **`cluster`**: The topology model. Immutable snapshots of cluster nodes,
//!   their partition ranges and their twin (replica) relationships.
//! - **`routing`**: The core of the client. Key hashing, the wire protocol,
//!   per-node sessions, and the router that orchestrates primary attempts,
//!   twin fan-out and topology refresh.
//! - **`config`**: The configuration surface: seed node list, refresh period
//!   and the optional transport timeout.
//! - **`error`**: The typed error kinds surfaced by every operation.

pub mod cluster;
pub mod config;
pub mod error;
pub mod routing;

pub use cluster::types::{Node, NodeState, Topology};
pub use config::{Config, SeedNode};
pub use error::ClientError;
pub use routing::client::{Client, Counters};
