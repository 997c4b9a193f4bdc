//! Peer address extraction from node logs.
//!
//! Once readiness is confirmed, the node's externally dialable multiaddr
//! is parsed out of the same log text. A malformed or missing address
//! field on a log that already passed the readiness check indicates a
//! log-format mismatch, which is a different defect class from a slow
//! node, so it gets its own error type.

/// Search prefix for the quoted multiaddr field on the readiness line.
pub const MULTIADDR_SEARCH: &str = "\"Node started p2p server\" multiAddr=\"";

/// Peer address extraction errors.
#[derive(Debug, thiserror::Error)]
pub enum AddressParseError {
    /// The labeled, quoted multiaddr field is absent from the log.
    #[error("no multiaddr field found in logs:\n{log}")]
    MarkerNotFound {
        /// Full log text that was searched.
        log: String,
    },

    /// The multiaddr field opens a quote that never closes.
    #[error("unterminated multiaddr field in logs:\n{log}")]
    UnterminatedAddress {
        /// Full log text that was searched.
        log: String,
    },
}

/// Extract the node's dialable peer address from log text.
///
/// Pure function of its input: returns the substring between the first
/// quote after [`MULTIADDR_SEARCH`] and the next quote.
///
/// # Errors
///
/// Returns [`AddressParseError::MarkerNotFound`] if the search prefix is
/// absent and [`AddressParseError::UnterminatedAddress`] if the closing
/// quote is missing. Never returns an empty-by-accident address for
/// marker-free input.
pub fn extract_peer_address(log: &str) -> Result<&str, AddressParseError> {
    let start = log
        .find(MULTIADDR_SEARCH)
        .ok_or_else(|| AddressParseError::MarkerNotFound {
            log: log.to_string(),
        })?;
    let rest = &log[start + MULTIADDR_SEARCH.len()..];
    let end = rest
        .find('"')
        .ok_or_else(|| AddressParseError::UnterminatedAddress {
            log: log.to_string(),
        })?;
    Ok(&rest[..end])
}
