//! End-to-end cluster orchestration for lattice nodes.
//!
//! The harness brings up a small cluster of independent node processes,
//! wires them into a known topology, and blocks the calling test until
//! every node reaches an externally observable ready state. The only
//! synchronization channel with a node is its log file: each node is
//! spawned with stdout and stderr redirected into a per-node log, and the
//! harness polls that file for a fixed readiness marker before extracting
//! the node's dialable peer address from the same text.
//!
//! Nodes start strictly sequentially because node `i`'s launch
//! configuration embeds the resolved addresses of nodes `0..i-1`. Every
//! failure is terminal for the whole run; there is no degraded-cluster
//! mode.

pub mod address;
pub mod config;
pub mod launcher;
pub mod orchestrator;
pub mod readiness;

pub use address::{extract_peer_address, AddressParseError, MULTIADDR_SEARCH};
pub use config::ClusterConfig;
pub use launcher::{build_node_args, launch_node, LaunchError, LaunchedNode, NodePorts};
pub use orchestrator::{start_cluster, NodeRecord, NodeRegistry, OrchestratorError};
pub use readiness::{log_contains, wait_for_marker, ReadinessConfig, ReadinessError, READY_MARKER};
