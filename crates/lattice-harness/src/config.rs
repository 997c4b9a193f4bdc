//! Cluster run configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::readiness::ReadinessConfig;

/// Configuration for one orchestration run.
///
/// Constructed once by the calling test and read-only thereafter; every
/// node in the cluster is parameterized from the same instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Resolved path to the node executable. Binary resolution itself is
    /// the caller's concern; the launcher only validates existence.
    pub binary: PathBuf,
    /// Number of nodes to start.
    pub num_nodes: u16,
    /// Number of simulated validators backing the run.
    pub num_validators: u64,
    /// Epochs the cluster is expected to run for.
    pub epochs_to_run: u64,
    /// Select the minimal network-parameter profile instead of the full one.
    pub minimal_config: bool,
    /// Enable the node's SSZ cache subsystem.
    pub enable_ssz_cache: bool,
    /// Deposit contract address passed identically to every node.
    pub deposit_contract: String,
    /// Run-scoped temp root. Data directories and log files for every node
    /// live under this path.
    pub tmp_root: PathBuf,
    /// Readiness polling parameters.
    #[serde(default)]
    pub readiness: ReadinessConfig,
}
