//! lattice-simnode - Stand-in node binary for harness tests.
//!
//! Speaks the real node's command-line surface, binds its p2p TCP port,
//! dials any configured static peers, announces readiness on stdout in the
//! production log-line format, and idles until killed. The
//! `LATTICE_SIMNODE_MODE` environment variable selects degraded behaviors
//! (`fail-silent`, `corrupt-multiaddr`) so the test suite can exercise the
//! harness failure paths.

use std::env;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = SimNodeConfig::from_args(env::args().skip(1))?;
    info!(
        p2p_tcp_port = config.p2p_tcp_port,
        peers = config.peers.len(),
        datadir = %config.datadir.as_ref().map_or_else(|| "none".to_string(), |d| d.display().to_string()),
        "starting lattice-simnode"
    );

    if let Some(datadir) = &config.datadir {
        std::fs::create_dir_all(datadir).context("failed to create data directory")?;
    }

    let listener = TcpListener::bind(("127.0.0.1", config.p2p_tcp_port))
        .await
        .context("failed to bind p2p TCP port")?;

    for peer in &config.peers {
        dial_peer(peer).await;
    }

    announce_readiness(config.p2p_tcp_port)?;

    loop {
        tokio::select! {
            conn = listener.accept() => {
                match conn {
                    Ok((_, addr)) => info!(peer = %addr, "inbound connection"),
                    Err(err) => warn!(error = %err, "failed to accept connection"),
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(error = %err, "failed to listen for shutdown signal");
                }
                break;
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Emit the readiness line the harness polls for, honoring the degraded
/// modes used by the failure-path tests.
fn announce_readiness(port: u16) -> Result<()> {
    let mut stdout = std::io::stdout();
    match env::var("LATTICE_SIMNODE_MODE").as_deref() {
        Ok("fail-silent") => {
            info!("p2p server disabled by fail-silent mode");
            return Ok(());
        }
        Ok("corrupt-multiaddr") => {
            writeln!(
                stdout,
                "level=info msg=\"Node started p2p server\" multiAddr=MALFORMED"
            )?;
        }
        _ => {
            writeln!(
                stdout,
                "level=info msg=\"Node started p2p server\" multiAddr=\"/ip4/127.0.0.1/tcp/{port}\""
            )?;
        }
    }
    stdout.flush().context("failed to flush readiness line")?;
    Ok(())
}

async fn dial_peer(peer: &str) {
    info!(peer = %peer, "static peer configured");
    let Some(target) = tcp_endpoint(peer) else {
        warn!(peer = %peer, "could not parse peer multiaddr");
        return;
    };
    match TcpStream::connect(&target).await {
        Ok(_) => info!(peer = %peer, "dialed peer"),
        Err(err) => warn!(peer = %peer, error = %err, "failed to dial peer"),
    }
}

/// Convert a `/ip4/<host>/tcp/<port>` multiaddr into a `host:port` pair.
fn tcp_endpoint(multiaddr: &str) -> Option<String> {
    let mut parts = multiaddr.split('/');
    let _empty = parts.next()?;
    if parts.next()? != "ip4" {
        return None;
    }
    let host = parts.next()?;
    if parts.next()? != "tcp" {
        return None;
    }
    let port: u16 = parts.next()?.parse().ok()?;
    Some(format!("{host}:{port}"))
}

#[derive(Debug)]
struct SimNodeConfig {
    p2p_tcp_port: u16,
    datadir: Option<PathBuf>,
    peers: Vec<String>,
}

impl SimNodeConfig {
    /// Parse the node flag surface. Flags the simulator has no behavior
    /// for are accepted and ignored so the launcher can pass the full
    /// production argument vector.
    fn from_args(args: impl Iterator<Item = String>) -> Result<Self> {
        let mut p2p_tcp_port = None;
        let mut datadir = None;
        let mut peers = Vec::new();

        for arg in args {
            if let Some(value) = arg.strip_prefix("--p2p-tcp-port=") {
                let port = value
                    .parse()
                    .with_context(|| format!("invalid --p2p-tcp-port value: {value}"))?;
                p2p_tcp_port = Some(port);
            } else if let Some(value) = arg.strip_prefix("--datadir=") {
                datadir = Some(PathBuf::from(value));
            } else if let Some(value) = arg.strip_prefix("--peer=") {
                peers.push(value.to_string());
            }
        }

        let p2p_tcp_port = p2p_tcp_port.context("--p2p-tcp-port is required")?;
        Ok(Self {
            p2p_tcp_port,
            datadir,
            peers,
        })
    }
}
