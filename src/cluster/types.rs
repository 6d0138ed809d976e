use serde::{Deserialize, Serialize};

/// Lifecycle state reported by the cluster for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeState {
    Active,
    Inactive,
}

/// A single member of a topology snapshot.
///
/// Nodes are immutable values: a topology refresh produces a wholly new set
/// of nodes rather than mutating these in place. `twin_names` lists the other
/// nodes holding replicas of the same partitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub state: NodeState,
    /// Every partition index this node owns.
    pub partition_ranges: Vec<i32>,
    /// Names of the nodes replicating this node's partitions.
    pub twin_names: Vec<String>,
}

/// One consistent snapshot of the cluster.
///
/// Within a snapshot every partition index is owned by at most one node, so
/// routing over it is a total, conflict-free function.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    pub nodes: Vec<Node>,
}

impl Topology {
    /// Resolve twin names to the live nodes of this snapshot.
    ///
    /// Nodes are returned in topology order; names with no matching node are
    /// silently skipped.
    pub fn twins_of(&self, names: &[String]) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|node| names.iter().any(|name| name == &node.name))
            .collect()
    }
}
