//! UDP hole punching strategy
//!
//! Both peers send probe datagrams at each other's external address at the
//! same time. The outbound probe opens a binding in our own NAT, so the peer's
//! probe (or its response to ours) can come back in. Learning the peer's
//! address is left to whatever coordination mechanism the caller uses; the
//! strategy only gets the result through its config.

use super::strategy::Strategy;
use super::types::{ConnectionToken, Outcome, StrategyFault};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// Probe packet marker
pub(crate) const PROBE_MARKER: &[u8] = b"KIDA_PROBE";
/// Response packet marker
pub(crate) const RESPONSE_MARKER: &[u8] = b"KIDA_RESPONSE";

/// Hole punch parameters, fixed when the strategy is built
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HolePunchConfig {
    /// Local address to punch from
    ///
    /// The socket is released after the attempt, so use a fixed port when the
    /// punched path should be reused.
    pub bind_addr: SocketAddr,
    /// Peer's external address, if coordination produced one
    pub peer_addr: Option<SocketAddr>,
    /// Probes to send before giving up
    pub max_probes: u32,
    /// How long to wait for an answer after each probe, in milliseconds
    pub probe_timeout_ms: u64,
    /// Pause between unanswered probes, in milliseconds
    pub probe_interval_ms: u64,
}

impl HolePunchConfig {
    /// Upper bound on how long one attempt can take
    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(
            u64::from(self.max_probes)
                .saturating_mul(self.probe_timeout_ms.saturating_add(self.probe_interval_ms)),
        )
    }
}

impl Default for HolePunchConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            peer_addr: None,
            max_probes: 20,
            probe_timeout_ms: 50,
            probe_interval_ms: 100,
        }
    }
}

/// Direct path to a peer through simultaneous UDP probing
#[derive(Debug, Clone)]
pub struct HolePunchStrategy {
    config: HolePunchConfig,
}

impl HolePunchStrategy {
    /// Create a strategy with the given probing parameters
    pub fn new(config: HolePunchConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Strategy for HolePunchStrategy {
    type Token = ConnectionToken;

    fn name(&self) -> &str {
        "hole-punch"
    }

    async fn attempt(&self) -> Result<Outcome<ConnectionToken>, StrategyFault> {
        let Some(peer) = self.config.peer_addr else {
            debug!("No peer address known, skipping UDP hole punch");
            return Ok(Outcome::Empty);
        };

        info!(
            "Attempting UDP hole punch towards {} (up to {:?})...",
            peer,
            self.config.max_duration()
        );

        // Dropped on every return path, which closes the binding
        let socket = UdpSocket::bind(self.config.bind_addr).await?;
        let local = socket.local_addr()?;
        debug!("Punching from {}", local);

        match punch(&socket, peer, &self.config).await? {
            Some(from) => {
                info!("UDP hole punch succeeded: {} <-> {}", local, from);
                Ok(Outcome::Success(ConnectionToken::HolePunched { local, peer: from }))
            }
            None => {
                debug!(
                    "UDP hole punch got no answer after {} probes",
                    self.config.max_probes
                );
                Ok(Outcome::Empty)
            }
        }
    }
}

/// Probe `peer` until it answers or the probe budget runs out
///
/// Only addresses with the peer's IP count as an answer; its NAT may have
/// picked a different port than the one we were told about.
async fn punch(
    socket: &UdpSocket,
    peer: SocketAddr,
    config: &HolePunchConfig,
) -> io::Result<Option<SocketAddr>> {
    let probe_timeout = Duration::from_millis(config.probe_timeout_ms);
    let probe_interval = Duration::from_millis(config.probe_interval_ms);

    for probe in 0..config.max_probes {
        socket.send_to(PROBE_MARKER, peer).await?;

        match tokio::time::timeout(probe_timeout, recv_probe(socket, peer)).await {
            Ok(Ok(from)) if from.ip() == peer.ip() => return Ok(Some(from)),
            Ok(Ok(from)) => debug!("Ignoring probe from unexpected address {}", from),
            Ok(Err(e)) => debug!("Discarding datagram: {}", e),
            Err(_) => debug!("Probe {} unanswered", probe + 1),
        }

        tokio::time::sleep(probe_interval).await;
    }

    Ok(None)
}

/// Receive one probe or response, answering probes from the peer's IP only
async fn recv_probe(socket: &UdpSocket, peer: SocketAddr) -> io::Result<SocketAddr> {
    let mut buf = [0u8; 64];
    let (len, from) = socket.recv_from(&mut buf).await?;
    let packet = &buf[..len];

    if packet == PROBE_MARKER {
        if from.ip() == peer.ip() {
            socket.send_to(RESPONSE_MARKER, from).await?;
        }
        Ok(from)
    } else if packet == RESPONSE_MARKER {
        Ok(from)
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Not a probe packet",
        ))
    }
}
