//! Node process launch.
//!
//! Computes the per-index configuration (ports, data directory, flags,
//! known-peer addresses), creates the log sink, and spawns the node binary
//! with stdout and stderr redirected into it.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tracing::info;

use crate::config::ClusterConfig;

/// Base port for the control-plane RPC endpoint.
pub const BASE_RPC_PORT: u16 = 4000;
/// Base port for peer-discovery datagrams.
pub const BASE_DISCOVERY_UDP_PORT: u16 = 12000;
/// Base port for the peer-discovery stream transport.
pub const BASE_DISCOVERY_TCP_PORT: u16 = 13000;
/// Base port for the monitoring endpoint.
pub const BASE_MONITORING_PORT: u16 = 8080;
/// Base port for the gateway endpoint.
pub const BASE_GATEWAY_PORT: u16 = 3200;

/// The five per-node ports, derived deterministically from the node index.
///
/// Base values are far enough apart that no two nodes in one run can
/// collide on any port, and the mapping is reproducible from the index
/// alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePorts {
    /// Control-plane RPC port.
    pub rpc: u16,
    /// Peer-discovery datagram port.
    pub discovery_udp: u16,
    /// Peer-discovery stream port.
    pub discovery_tcp: u16,
    /// Monitoring port.
    pub monitoring: u16,
    /// Gateway port.
    pub gateway: u16,
}

impl NodePorts {
    /// Derive the port set for the node at `index`.
    #[must_use]
    pub fn for_index(index: u16) -> Self {
        Self {
            rpc: BASE_RPC_PORT + index,
            discovery_udp: BASE_DISCOVERY_UDP_PORT + index,
            discovery_tcp: BASE_DISCOVERY_TCP_PORT + index,
            monitoring: BASE_MONITORING_PORT + index,
            gateway: BASE_GATEWAY_PORT + index,
        }
    }
}

/// A spawned node whose readiness has not yet been confirmed.
///
/// Deliberately has no peer-address field: a node only gains one by being
/// promoted to a registry record after readiness detection and address
/// extraction both succeed.
#[derive(Debug)]
pub struct LaunchedNode {
    /// 0-based ordinal of the node within the run.
    pub index: u16,
    /// Handle of the spawned process. Opaque to the harness; only external
    /// teardown ever uses it.
    pub child: Child,
    /// Data directory exclusively owned by this node.
    pub data_dir: PathBuf,
    /// Log file receiving the node's merged stdout and stderr.
    pub log_path: PathBuf,
    /// Ports derived from the node index.
    pub ports: NodePorts,
}

/// Node launch errors. All fatal to the run and never retried.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// The node executable does not exist at the configured path.
    #[error("node binary not found at {path}")]
    BinaryNotFound {
        /// Path that was checked.
        path: PathBuf,
    },

    /// The log sink could not be created before spawn.
    #[error("failed to create log sink {path}: {source}")]
    LogSink {
        /// Intended log file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// OS-level process creation failed.
    #[error("failed to spawn node process: {0}")]
    Spawn(std::io::Error),
}

/// Build the full argument vector for the node at `index`.
///
/// `peers` are the resolved addresses of all previously started nodes, in
/// start order; each contributes one explicit `--peer` flag. Node 0 is
/// launched with an empty slice. The underlying peer protocol establishes
/// the reverse direction on its own, so no back-wiring flags are emitted.
#[must_use]
pub fn build_node_args(config: &ClusterConfig, index: u16, peers: &[&str]) -> Vec<String> {
    let ports = NodePorts::for_index(index);

    let mut args = vec![
        "--no-genesis-delay".to_string(),
        "--verbosity=debug".to_string(),
        "--force-clear-db".to_string(),
        "--no-discovery".to_string(),
        "--new-cache".to_string(),
        "--enable-shuffled-index-cache".to_string(),
        "--enable-skip-slots-cache".to_string(),
        "--enable-attestation-cache".to_string(),
        "--http-web3provider=http://127.0.0.1:8545".to_string(),
        "--web3provider=ws://127.0.0.1:8546".to_string(),
        format!("--datadir={}", data_dir(config, index).display()),
        format!("--deposit-contract={}", config.deposit_contract),
        format!("--rpc-port={}", ports.rpc),
        format!("--p2p-udp-port={}", ports.discovery_udp),
        format!("--p2p-tcp-port={}", ports.discovery_tcp),
        format!("--monitoring-port={}", ports.monitoring),
        format!("--grpc-gateway-port={}", ports.gateway),
        "--contract-deployment-block=0".to_string(),
    ];

    if config.minimal_config {
        args.push("--minimal-config".to_string());
    }
    if config.enable_ssz_cache {
        args.push("--enable-ssz-cache".to_string());
    }

    for peer in peers {
        args.push(format!("--peer={peer}"));
    }

    args
}

/// Spawn the node at `index` with its log sink attached.
///
/// `peers` are the resolved addresses of nodes `0..index`, in start order.
/// The log file is created before the process so readiness polling always
/// has something to read.
///
/// # Errors
///
/// Returns [`LaunchError::BinaryNotFound`] if the configured executable is
/// missing, [`LaunchError::LogSink`] if the log file cannot be created,
/// and [`LaunchError::Spawn`] if OS-level process creation fails.
pub async fn launch_node(
    config: &ClusterConfig,
    index: u16,
    peers: &[&str],
) -> Result<LaunchedNode, LaunchError> {
    if !config.binary.exists() {
        return Err(LaunchError::BinaryNotFound {
            path: config.binary.clone(),
        });
    }

    let log_path = log_path(config, index);
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| LaunchError::LogSink {
            path: log_path.clone(),
            source,
        })?;
    }
    let stdout_sink = std::fs::File::create(&log_path).map_err(|source| LaunchError::LogSink {
        path: log_path.clone(),
        source,
    })?;
    let stderr_sink = stdout_sink
        .try_clone()
        .map_err(|source| LaunchError::LogSink {
            path: log_path.clone(),
            source,
        })?;

    let args = build_node_args(config, index, peers);
    info!(index, flags = %args.join(" "), "starting node");

    let child = Command::new(&config.binary)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_sink))
        .stderr(Stdio::from(stderr_sink))
        .kill_on_drop(true)
        .spawn()
        .map_err(LaunchError::Spawn)?;

    Ok(LaunchedNode {
        index,
        child,
        data_dir: data_dir(config, index),
        log_path,
        ports: NodePorts::for_index(index),
    })
}

fn data_dir(config: &ClusterConfig, index: u16) -> PathBuf {
    config.tmp_root.join(format!("node-{index}"))
}

fn log_path(config: &ClusterConfig, index: u16) -> PathBuf {
    config.tmp_root.join(format!("node-{index}.log"))
}

/// Log file path for the node at `index`, exposed for diagnostics.
#[must_use]
pub fn node_log_path(tmp_root: &Path, index: u16) -> PathBuf {
    tmp_root.join(format!("node-{index}.log"))
}
