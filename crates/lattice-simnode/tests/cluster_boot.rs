//! End-to-end cluster boot tests against real simnode processes.
//!
//! Every test acquires a process-wide lock: the harness derives node ports
//! from fixed base values, so two clusters cannot coexist in one test run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use lattice_harness::{
    start_cluster, AddressParseError, ClusterConfig, NodeRegistry, OrchestratorError,
    ReadinessConfig, ReadinessError,
};
use tempfile::TempDir;

static CLUSTER_LOCK: Mutex<()> = Mutex::new(());

fn lock_cluster() -> std::sync::MutexGuard<'static, ()> {
    CLUSTER_LOCK
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Clears the simnode mode variable when the test scope ends, even on
/// panic, so a failure in one test cannot poison the next.
struct ModeGuard;

impl ModeGuard {
    fn set(mode: &str) -> Self {
        std::env::set_var("LATTICE_SIMNODE_MODE", mode);
        Self
    }
}

impl Drop for ModeGuard {
    fn drop(&mut self) {
        std::env::remove_var("LATTICE_SIMNODE_MODE");
    }
}

fn test_config(tmp_root: &Path, num_nodes: u16) -> ClusterConfig {
    ClusterConfig {
        binary: PathBuf::from(env!("CARGO_BIN_EXE_lattice-simnode")),
        num_nodes,
        num_validators: 8,
        epochs_to_run: 1,
        minimal_config: true,
        enable_ssz_cache: false,
        deposit_contract: "0x4242424242424242424242424242424242424242".to_string(),
        tmp_root: tmp_root.to_path_buf(),
        readiness: ReadinessConfig {
            poll_interval: Duration::from_millis(100),
            wait_budget: Duration::from_secs(10),
        },
    }
}

async fn shutdown(registry: NodeRegistry) {
    for mut node in registry.into_nodes() {
        let _ = node.child_mut().kill().await;
    }
}

#[tokio::test]
async fn single_node_cluster_boots() -> Result<()> {
    let _lock = lock_cluster();
    let tmp = TempDir::new().context("create temp root")?;

    let config = test_config(tmp.path(), 1);
    let registry = start_cluster(&config).await?;

    assert_eq!(registry.len(), 1);
    let node = registry.get(0).context("node 0 missing from registry")?;
    assert_eq!(node.index(), 0);
    assert_eq!(node.peer_address(), "/ip4/127.0.0.1/tcp/13000");
    assert_eq!(node.ports().rpc, 4000);
    assert_eq!(node.ports().gateway, 3200);
    assert_eq!(node.data_dir(), tmp.path().join("node-0"));
    assert!(node.log_path().exists(), "log sink missing");
    assert!(node.data_dir().exists(), "node never created its data dir");

    // Node 0 must have been launched with zero peer flags: its log records
    // every configured static peer, and there were none.
    let log = std::fs::read_to_string(node.log_path())?;
    assert!(!log.contains("static peer configured"));

    shutdown(registry).await;
    Ok(())
}

#[tokio::test]
async fn three_node_cluster_wires_peers_in_start_order() -> Result<()> {
    let _lock = lock_cluster();
    let tmp = TempDir::new().context("create temp root")?;

    let config = test_config(tmp.path(), 3);
    let registry = start_cluster(&config).await?;

    assert_eq!(registry.len(), 3);
    for (position, node) in registry.nodes().iter().enumerate() {
        assert_eq!(usize::from(node.index()), position);
    }

    let rpc: Vec<u16> = registry.nodes().iter().map(|n| n.ports().rpc).collect();
    let udp: Vec<u16> = registry
        .nodes()
        .iter()
        .map(|n| n.ports().discovery_udp)
        .collect();
    let tcp: Vec<u16> = registry
        .nodes()
        .iter()
        .map(|n| n.ports().discovery_tcp)
        .collect();
    assert_eq!(rpc, vec![4000, 4001, 4002]);
    assert_eq!(udp, vec![12000, 12001, 12002]);
    assert_eq!(tcp, vec![13000, 13001, 13002]);

    // All five port categories stay pairwise distinct across the registry.
    let mut all_ports = HashSet::new();
    for node in registry.nodes() {
        let ports = node.ports();
        for port in [
            ports.rpc,
            ports.discovery_udp,
            ports.discovery_tcp,
            ports.monitoring,
            ports.gateway,
        ] {
            assert!(all_ports.insert(port), "port {port} assigned twice");
        }
    }

    // Node 2 was configured with the addresses of nodes 0 and 1, in start
    // order. The simnode logs each static peer as it is configured.
    let addr_0 = registry.get(0).unwrap().peer_address().to_string();
    let addr_1 = registry.get(1).unwrap().peer_address().to_string();
    let node_2_log = std::fs::read_to_string(registry.get(2).unwrap().log_path())?;
    let pos_0 = node_2_log
        .find(&addr_0)
        .context("node 2 log missing node 0's address")?;
    let pos_1 = node_2_log
        .find(&addr_1)
        .context("node 2 log missing node 1's address")?;
    assert!(pos_0 < pos_1, "peer flags out of start order");

    // Node 1 only knows about node 0.
    let node_1_log = std::fs::read_to_string(registry.get(1).unwrap().log_path())?;
    assert!(node_1_log.contains(&addr_0));
    assert!(!node_1_log.contains(&addr_1));

    shutdown(registry).await;
    Ok(())
}

#[tokio::test]
async fn silent_node_times_out_with_log_payload() -> Result<()> {
    let _lock = lock_cluster();
    let _mode = ModeGuard::set("fail-silent");
    let tmp = TempDir::new().context("create temp root")?;

    let mut config = test_config(tmp.path(), 1);
    config.readiness = ReadinessConfig {
        poll_interval: Duration::from_millis(100),
        wait_budget: Duration::from_millis(1500),
    };

    let started = Instant::now();
    let err = start_cluster(&config)
        .await
        .expect_err("silent node must not become ready");
    let elapsed = started.elapsed();

    assert!(elapsed >= config.readiness.wait_budget);
    assert!(
        elapsed < config.readiness.wait_budget * 3,
        "timeout took {elapsed:?}, budget was {:?}",
        config.readiness.wait_budget
    );

    match err {
        OrchestratorError::Readiness {
            index: 0,
            source: ReadinessError::Timeout { waited, log, .. },
        } => {
            assert!(waited >= config.readiness.wait_budget);
            // The failure payload is the literal log produced so far.
            assert!(
                log.contains("p2p server disabled by fail-silent mode"),
                "timeout payload did not carry the node's log: {log}"
            );
        }
        other => panic!("expected readiness timeout for node 0, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn corrupt_multiaddr_is_an_address_parse_error() -> Result<()> {
    let _lock = lock_cluster();
    let _mode = ModeGuard::set("corrupt-multiaddr");
    let tmp = TempDir::new().context("create temp root")?;

    let config = test_config(tmp.path(), 1);
    let err = start_cluster(&config)
        .await
        .expect_err("corrupt address must not produce a registry");

    assert!(matches!(
        err,
        OrchestratorError::AddressParse {
            index: 0,
            source: AddressParseError::MarkerNotFound { .. },
        }
    ));
    Ok(())
}

#[tokio::test]
async fn missing_binary_fails_before_any_node_starts() -> Result<()> {
    let _lock = lock_cluster();
    let tmp = TempDir::new().context("create temp root")?;

    let mut config = test_config(tmp.path(), 3);
    config.binary = PathBuf::from("/nonexistent/lattice-node");

    let err = start_cluster(&config)
        .await
        .expect_err("missing binary must abort the run");
    assert!(matches!(
        err,
        OrchestratorError::Launch { index: 0, .. }
    ));
    // The run aborted before creating any log sinks.
    assert!(!tmp.path().join("node-0.log").exists());
    Ok(())
}
