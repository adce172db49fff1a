//! Common types for connectivity module

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

/// What a single strategy attempt produced when it did not fault
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The technique worked; carries the success token
    Success(T),
    /// The technique made no progress (no device, mapping rejected, no answer)
    Empty,
}

impl<T> Outcome<T> {
    /// Check if the attempt succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

impl<T> From<Option<T>> for Outcome<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(token) => Outcome::Success(token),
            None => Outcome::Empty,
        }
    }
}

/// Abnormal termination of a strategy attempt
///
/// Faults are logged by the orchestrator and then treated like [`Outcome::Empty`].
#[derive(Debug, Error)]
pub enum StrategyFault {
    /// Socket or other I/O setup failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Port mapping machinery failed unexpectedly
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// The attempt panicked while running
    #[error("Strategy panicked: {0}")]
    Panicked(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Final decision of the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EstablishmentResult<T> {
    /// A strategy succeeded with this token
    Established(T),
    /// Every strategy returned empty or faulted (or there were none)
    Exhausted,
}

impl<T> EstablishmentResult<T> {
    /// Check if reachability was established
    pub fn is_established(&self) -> bool {
        matches!(self, EstablishmentResult::Established(_))
    }

    /// Borrow the success token, if any
    pub fn token(&self) -> Option<&T> {
        match self {
            EstablishmentResult::Established(token) => Some(token),
            EstablishmentResult::Exhausted => None,
        }
    }

    /// Take the success token, if any
    pub fn into_token(self) -> Option<T> {
        match self {
            EstablishmentResult::Established(token) => Some(token),
            EstablishmentResult::Exhausted => None,
        }
    }
}

/// Result of attempting a specific connectivity strategy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StrategyAttempt {
    /// Strategy was not attempted
    NotAttempted,
    /// Strategy succeeded
    Success,
    /// Strategy ran but made no progress
    Empty,
    /// Strategy faulted with error message
    Faulted(String),
}

/// One strategy's entry in an [`EstablishmentReport`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttemptRecord {
    /// Strategy name as reported by the strategy
    pub strategy: String,
    /// What happened when (and if) it ran
    pub attempt: StrategyAttempt,
}

/// Complete result of connectivity orchestration
///
/// Carries the final [`EstablishmentResult`] together with one record per
/// strategy in the order they were supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstablishmentReport<T> {
    /// Final decision
    pub result: EstablishmentResult<T>,
    /// Per-strategy records, in caller order
    pub attempts: Vec<AttemptRecord>,
}

impl<T> EstablishmentReport<T> {
    /// Check if any strategy succeeded
    pub fn is_success(&self) -> bool {
        self.result.is_established()
    }

    /// Index of the strategy whose success became the result
    pub fn winner(&self) -> Option<usize> {
        self.attempts
            .iter()
            .position(|record| record.attempt == StrategyAttempt::Success)
    }

    /// Number of strategies that were actually invoked
    pub fn invoked(&self) -> usize {
        self.attempts
            .iter()
            .filter(|record| record.attempt != StrategyAttempt::NotAttempted)
            .count()
    }

    /// Get a summary string of all attempts (for UX display)
    pub fn summary(&self) -> String {
        if self.attempts.is_empty() {
            return "no strategies".to_string();
        }

        self.attempts
            .iter()
            .map(|record| match &record.attempt {
                StrategyAttempt::NotAttempted => format!("{}: not tried", record.strategy),
                StrategyAttempt::Success => format!("{}: ok", record.strategy),
                StrategyAttempt::Empty => format!("{}: empty", record.strategy),
                StrategyAttempt::Faulted(e) => format!("{}: fault ({})", record.strategy, e),
            })
            .collect::<Vec<_>>()
            .join(" → ")
    }
}

/// Success token produced by the built-in traversal strategies
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ConnectionToken {
    /// A gateway forwards the external port to this host
    PortMapped(PortMappingResult),
    /// A direct path to the peer was opened
    ///
    /// The punching socket is closed when the attempt returns. With an
    /// ephemeral `bind_addr` port the `local` address is gone by then; bind a
    /// fixed port to reopen the same NAT binding before it expires.
    HolePunched {
        /// Local socket address the path was punched from
        local: SocketAddr,
        /// Peer address that answered the probes
        peer: SocketAddr,
    },
}

impl fmt::Display for ConnectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionToken::PortMapped(mapping) => write!(
                f,
                "port mapped {}:{} -> {} ({:?})",
                mapping.external_ip, mapping.external_port, mapping.internal_addr, mapping.protocol
            ),
            ConnectionToken::HolePunched { local, peer } => {
                write!(f, "hole punched {} <-> {}", local, peer)
            }
        }
    }
}

/// Result of a port mapping operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortMappingResult {
    /// External IP address visible to the internet
    pub external_ip: IpAddr,
    /// External port mapped on the gateway
    pub external_port: u16,
    /// LAN address the gateway forwards to
    pub internal_addr: SocketAddr,
    /// Lease duration of the mapping in seconds (0 = permanent)
    pub lifetime_secs: u32,
    /// Transport protocol of the mapping
    pub protocol: IpProtocol,
    /// Timestamp when mapping was created (Unix milliseconds)
    pub created_at_ms: i64,
}

/// Errors that can occur during port mapping
#[derive(Debug, Error)]
pub enum MappingError {
    /// No gateway found on network
    #[error("No gateway found: {0}")]
    NoGateway(String),

    /// Gateway would not report its external address
    #[error("External IP query failed: {0}")]
    ExternalIp(String),

    /// Gateway refused the mapping request
    #[error("Mapping rejected: {0}")]
    Rejected(String),

    /// Could not determine our own LAN address
    #[error("Local address unavailable: {0}")]
    LocalAddress(String),

    /// IO error during communication
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MappingError {
    /// Whether this error is an anomaly rather than an expected negative answer
    ///
    /// A missing or uncooperative gateway is an ordinary "no" from the network.
    /// Failing to set up our own sockets or tasks is not.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            MappingError::LocalAddress(_) | MappingError::Io(_) | MappingError::Internal(_)
        )
    }
}

/// IP protocol numbers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[repr(u8)]
pub enum IpProtocol {
    /// TCP protocol
    TCP = 6,
    /// UDP protocol
    UDP = 17,
}

impl IpProtocol {
    /// Convert to the igd-next protocol type
    pub(crate) fn to_igd(self) -> igd_next::PortMappingProtocol {
        match self {
            IpProtocol::TCP => igd_next::PortMappingProtocol::TCP,
            IpProtocol::UDP => igd_next::PortMappingProtocol::UDP,
        }
    }
}
