//! UPnP IGD (Internet Gateway Device) port mapping strategy
//!
//! Discovers an IGD on the local network over SSDP, asks it for the external
//! address, and requests a port mapping towards this host. The SSDP and SOAP
//! exchanges are handled by `igd-next`; its API is blocking, so the work runs
//! on tokio's blocking pool.

use super::strategy::Strategy;
use super::types::{
    ConnectionToken, IpProtocol, MappingError, Outcome, PortMappingResult, StrategyFault,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Port mapped when nothing else is configured
pub const DEFAULT_PORT: u16 = 8888;

/// Port mapping parameters, fixed when the strategy is built
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UpnpConfig {
    /// How long to wait for SSDP discovery, in milliseconds
    pub discovery_timeout_ms: u64,
    /// Port on this host the gateway should forward to
    pub internal_port: u16,
    /// Port to open on the gateway's external interface
    pub external_port: u16,
    /// Transport protocol of the mapping
    pub protocol: IpProtocol,
    /// Lease duration in seconds (0 = permanent until gateway reboot)
    pub lease_duration_secs: u32,
    /// Human-readable mapping description shown in the router UI
    pub description: String,
}

impl UpnpConfig {
    /// Config mapping the same port number on both sides
    pub fn for_port(port: u16) -> Self {
        Self {
            internal_port: port,
            external_port: port,
            ..Self::default()
        }
    }

    /// Discovery timeout as a duration
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }
}

impl Default for UpnpConfig {
    fn default() -> Self {
        Self {
            discovery_timeout_ms: 2000,
            internal_port: DEFAULT_PORT,
            external_port: DEFAULT_PORT,
            protocol: IpProtocol::UDP,
            lease_duration_secs: 0,
            description: "Kida".to_string(),
        }
    }
}

/// Port mapping through a UPnP IGD
#[derive(Debug, Clone)]
pub struct UpnpStrategy {
    config: UpnpConfig,
}

impl UpnpStrategy {
    /// Create a strategy with the given mapping parameters
    pub fn new(config: UpnpConfig) -> Self {
        Self { config }
    }

    /// Mapping parameters this strategy was built with
    pub fn config(&self) -> &UpnpConfig {
        &self.config
    }
}

#[async_trait]
impl Strategy for UpnpStrategy {
    type Token = ConnectionToken;

    fn name(&self) -> &str {
        "upnp"
    }

    async fn attempt(&self) -> Result<Outcome<ConnectionToken>, StrategyFault> {
        info!(
            "Attempting UPnP mapping {} -> {} (lease: {}s, protocol: {:?})",
            self.config.external_port,
            self.config.internal_port,
            self.config.lease_duration_secs,
            self.config.protocol
        );

        let config = self.config.clone();
        let result = tokio::task::spawn_blocking(move || upnp_mapping_blocking(&config))
            .await
            .map_err(join_fault)?;

        classify(result)
    }
}

/// A blocking mapping task that panicked or was cancelled
pub(crate) fn join_fault(e: tokio::task::JoinError) -> StrategyFault {
    StrategyFault::Internal(format!("Task join error: {}", e))
}

/// Sort a mapping result into success, an expected miss, or a fault
pub(crate) fn classify(
    result: Result<PortMappingResult, MappingError>,
) -> Result<Outcome<ConnectionToken>, StrategyFault> {
    match result {
        Ok(mapping) => Ok(Outcome::Success(ConnectionToken::PortMapped(mapping))),
        Err(e) if e.is_fault() => Err(StrategyFault::Mapping(e)),
        Err(e) => {
            debug!("UPnP made no progress: {}", e);
            Ok(Outcome::Empty)
        }
    }
}

fn search_gateway(timeout: Duration) -> Result<igd_next::Gateway, MappingError> {
    igd_next::search_gateway(igd_next::SearchOptions {
        timeout: Some(timeout),
        ..Default::default()
    })
    .map_err(|e| MappingError::NoGateway(e.to_string()))
}

/// Determine which of our addresses faces the gateway
///
/// Connecting a UDP socket sends nothing; it only makes the OS pick a route.
fn local_ip_towards(gateway: SocketAddr) -> Result<IpAddr, MappingError> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .map_err(|e| MappingError::LocalAddress(format!("Failed to create socket: {}", e)))?;

    socket
        .connect(gateway)
        .map_err(|e| MappingError::LocalAddress(format!("Failed to connect: {}", e)))?;

    let local_addr = socket
        .local_addr()
        .map_err(|e| MappingError::LocalAddress(format!("Failed to get local address: {}", e)))?;

    match local_addr.ip() {
        IpAddr::V4(ipv4) => Ok(IpAddr::V4(ipv4)),
        IpAddr::V6(_) => Err(MappingError::LocalAddress(
            "UPnP requires IPv4 address".to_string(),
        )),
    }
}

/// Blocking UPnP mapping implementation
pub(crate) fn upnp_mapping_blocking(config: &UpnpConfig) -> Result<PortMappingResult, MappingError> {
    debug!("Searching for UPnP IGD gateway...");
    let gateway = search_gateway(config.discovery_timeout())?;

    let lan_ip = local_ip_towards(gateway.addr)?;
    debug!("LAN IP: {}, gateway: {}", lan_ip, gateway.addr);

    let external_ip = gateway
        .get_external_ip()
        .map_err(|e| MappingError::ExternalIp(e.to_string()))?;
    debug!("External IP: {}", external_ip);

    let internal_addr = SocketAddr::new(lan_ip, config.internal_port);

    gateway
        .add_port(
            config.protocol.to_igd(),
            config.external_port,
            internal_addr,
            config.lease_duration_secs,
            &config.description,
        )
        .map_err(|e| {
            warn!("UPnP AddPortMapping failed: {}", e);
            MappingError::Rejected(e.to_string())
        })?;

    let result = PortMappingResult {
        external_ip,
        external_port: config.external_port,
        internal_addr,
        lifetime_secs: config.lease_duration_secs,
        protocol: config.protocol,
        created_at_ms: Utc::now().timestamp_millis(),
    };

    info!(
        "Port {} mapped successfully: {}:{} -> {}",
        config.external_port, result.external_ip, result.external_port, result.internal_addr
    );

    Ok(result)
}

/// Delete a UPnP port mapping created with `config`
///
/// Call this on shutdown when the mapping should not outlive the process.
pub async fn delete_upnp_mapping(config: &UpnpConfig) -> Result<(), MappingError> {
    info!(
        "Deleting UPnP mapping for port {} (protocol: {:?})",
        config.external_port, config.protocol
    );

    let config = config.clone();
    tokio::task::spawn_blocking(move || {
        let gateway = search_gateway(config.discovery_timeout())?;

        gateway
            .remove_port(config.protocol.to_igd(), config.external_port)
            .map_err(|e| MappingError::Rejected(format!("DeletePortMapping failed: {}", e)))?;

        info!("UPnP mapping deleted successfully");
        Ok(())
    })
    .await
    .map_err(|e| MappingError::Internal(format!("Task join error: {}", e)))?
}
