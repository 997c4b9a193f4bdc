//! Log-based readiness detection.
//!
//! A node's only observability channel is its log file, so readiness is a
//! bounded poll: sleep a fixed interval, re-read the log from the
//! beginning, and test a pure predicate against the snapshot. Re-reading
//! from the start every tick sidesteps unreliable stream-position
//! semantics across polls.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::debug;

/// Log line the node emits once its p2p subsystem is operational.
pub const READY_MARKER: &str = "Node started p2p server";

/// Polling parameters for readiness detection.
///
/// The defaults match the production node's worst-case startup envelope;
/// tests shrink them to keep failure paths fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Delay between successive log scans.
    pub poll_interval: Duration,
    /// Total accumulated wait before giving up.
    pub wait_budget: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            wait_budget: Duration::from_secs(36),
        }
    }
}

/// Readiness detection errors.
#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    /// The log file could not be read back.
    #[error("failed to read log {path}: {source}")]
    Io {
        /// Path of the unreadable log file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The marker never appeared within the wait budget. Carries the full
    /// log content observed at exhaustion, verbatim, as the primary
    /// debugging aid for slow or wedged node startup.
    #[error("marker {marker:?} not found after {waited:?} in logs:\n{log}")]
    Timeout {
        /// Marker that was being waited for.
        marker: String,
        /// Accumulated wait before giving up.
        waited: Duration,
        /// Full log content at exhaustion.
        log: String,
    },
}

/// Pure readiness predicate: does any line of `text` contain `marker`?
#[must_use]
pub fn log_contains(text: &str, marker: &str) -> bool {
    text.lines().any(|line| line.contains(marker))
}

/// Block until `marker` appears in the file at `log_path`, or the wait
/// budget is exhausted.
///
/// On success returns the log snapshot in which the marker was observed,
/// so callers can parse further fields out of the same text without a
/// re-read race.
///
/// # Errors
///
/// Returns [`ReadinessError::Timeout`] when the budget runs out, carrying
/// the complete current log content, and [`ReadinessError::Io`] when the
/// log cannot be read back.
pub async fn wait_for_marker(
    log_path: &Path,
    marker: &str,
    config: &ReadinessConfig,
) -> Result<String, ReadinessError> {
    let mut waited = Duration::ZERO;
    while waited < config.wait_budget {
        sleep(config.poll_interval).await;
        waited += config.poll_interval;

        let text = read_log(log_path).await?;
        if log_contains(&text, marker) {
            debug!(path = %log_path.display(), ?waited, "readiness marker observed");
            return Ok(text);
        }
    }

    let log = read_log(log_path).await?;
    Err(ReadinessError::Timeout {
        marker: marker.to_string(),
        waited,
        log,
    })
}

async fn read_log(path: &Path) -> Result<String, ReadinessError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ReadinessError::Io {
            path: path.to_path_buf(),
            source,
        })
}
