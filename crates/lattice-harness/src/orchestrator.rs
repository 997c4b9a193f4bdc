//! Sequential cluster orchestration.
//!
//! Drives N node launches in index order. Each launch receives the
//! resolved peer addresses of every node started before it, so the loop
//! cannot be parallelized: node `i`'s configuration does not exist until
//! node `i-1` is ready. Any failure aborts the entire run before later
//! nodes are launched.

use std::path::{Path, PathBuf};

use tokio::process::Child;
use tracing::info;

use crate::address::{extract_peer_address, AddressParseError};
use crate::config::ClusterConfig;
use crate::launcher::{launch_node, LaunchError, LaunchedNode, NodePorts};
use crate::readiness::{wait_for_marker, ReadinessError, READY_MARKER};

/// One successfully started, ready node.
///
/// Created only after readiness detection and address extraction both
/// succeed; a record without a resolved peer address cannot exist.
#[derive(Debug)]
pub struct NodeRecord {
    index: u16,
    child: Child,
    data_dir: PathBuf,
    log_path: PathBuf,
    ports: NodePorts,
    peer_address: String,
}

impl NodeRecord {
    fn promote(launched: LaunchedNode, peer_address: String) -> Self {
        Self {
            index: launched.index,
            child: launched.child,
            data_dir: launched.data_dir,
            log_path: launched.log_path,
            ports: launched.ports,
            peer_address,
        }
    }

    /// 0-based ordinal of the node, assigned at launch and never reused.
    #[must_use]
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Data directory exclusively owned by this node's process.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Log file receiving the node's merged stdout and stderr.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Ports derived from the node index.
    #[must_use]
    pub fn ports(&self) -> NodePorts {
        self.ports
    }

    /// The node's externally dialable address, taken from its logs.
    #[must_use]
    pub fn peer_address(&self) -> &str {
        &self.peer_address
    }

    /// Mutable handle of the spawned process.
    ///
    /// The harness never touches the process after launch; this exists so
    /// external teardown can terminate it.
    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }
}

/// Ordered, append-only collection of the nodes started in one run.
///
/// Insertion order equals start order equals index order. Records are
/// never mutated or removed after append; downstream collaborators get
/// read-only access once orchestration completes.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: Vec<NodeRecord>,
}

impl NodeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of started nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node has started yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All records in start order.
    #[must_use]
    pub fn nodes(&self) -> &[NodeRecord] {
        &self.nodes
    }

    /// Record for the node at `index`, if it has started.
    #[must_use]
    pub fn get(&self, index: u16) -> Option<&NodeRecord> {
        self.nodes.get(usize::from(index))
    }

    /// Resolved peer addresses in start order, one per record.
    #[must_use]
    pub fn peer_addresses(&self) -> Vec<&str> {
        self.nodes.iter().map(NodeRecord::peer_address).collect()
    }

    /// Consume the registry for external teardown.
    #[must_use]
    pub fn into_nodes(self) -> Vec<NodeRecord> {
        self.nodes
    }

    fn push(&mut self, record: NodeRecord) {
        debug_assert_eq!(usize::from(record.index), self.nodes.len());
        self.nodes.push(record);
    }
}

/// Orchestration errors: a per-node stage failure tagged with the node
/// index. Every variant is terminal for the whole run.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The node could not be launched.
    #[error("failed to launch node {index}: {source}")]
    Launch {
        /// Index of the failed node.
        index: u16,
        /// Launch-stage error.
        #[source]
        source: LaunchError,
    },

    /// The node never reported readiness within the wait budget.
    #[error("node {index} did not become ready: {source}")]
    Readiness {
        /// Index of the failed node.
        index: u16,
        /// Readiness-stage error, carrying the full log on timeout.
        #[source]
        source: ReadinessError,
    },

    /// The node reported readiness but its address field was malformed.
    #[error("could not extract peer address for node {index}: {source}")]
    AddressParse {
        /// Index of the failed node.
        index: u16,
        /// Extraction error, carrying the searched log text.
        #[source]
        source: AddressParseError,
    },
}

/// Start `config.num_nodes` nodes sequentially and return the registry of
/// ready nodes.
///
/// Each node is launched with the resolved addresses of all prior nodes,
/// then awaited until its readiness marker appears in its log and its
/// dialable address is extracted. Total startup latency is therefore the
/// sum of the per-node readiness latencies.
///
/// # Errors
///
/// Returns the first per-node failure, tagged with the node index. No
/// partial registry survives an error; nodes after the failed one are
/// never launched.
pub async fn start_cluster(config: &ClusterConfig) -> Result<NodeRegistry, OrchestratorError> {
    let mut registry = NodeRegistry::new();
    for index in 0..config.num_nodes {
        let record = start_node(config, index, &registry).await?;
        registry.push(record);
    }
    info!(nodes = registry.len(), "cluster ready");
    Ok(registry)
}

async fn start_node(
    config: &ClusterConfig,
    index: u16,
    registry: &NodeRegistry,
) -> Result<NodeRecord, OrchestratorError> {
    let peers = registry.peer_addresses();
    let launched = launch_node(config, index, &peers)
        .await
        .map_err(|source| OrchestratorError::Launch { index, source })?;

    let log = wait_for_marker(&launched.log_path, READY_MARKER, &config.readiness)
        .await
        .map_err(|source| OrchestratorError::Readiness { index, source })?;

    let peer_address = extract_peer_address(&log)
        .map_err(|source| OrchestratorError::AddressParse { index, source })?
        .to_string();

    info!(index, peer_address = %peer_address, "node ready");
    Ok(NodeRecord::promote(launched, peer_address))
}
