//! Traversal configuration
//!
//! Stored as JSON. A missing or empty file yields the defaults, which match a
//! plain UDP mapping of port 8888 followed by a hole punch attempt (skipped
//! unless a peer address is set).

use crate::connectivity::{HolePunchConfig, UpnpConfig};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Settings for every built-in strategy
///
/// # Example
/// ```rust,no_run
/// use kida::config::KidaConfig;
///
/// let mut config = KidaConfig::load("kida.json").expect("Failed to load");
/// config.set_port(9000);
/// config.save("kida.json").expect("Failed to save");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KidaConfig {
    /// UPnP port mapping parameters
    pub upnp: UpnpConfig,
    /// UDP hole punch parameters
    pub hole_punch: HolePunchConfig,
}

impl KidaConfig {
    /// Load configuration from a JSON file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// The loaded configuration, or defaults if the file doesn't exist
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to a JSON file, creating parent directories
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;

        Ok(())
    }

    /// Use `port` for the mapping on both sides and as the hole punch source
    pub fn set_port(&mut self, port: u16) {
        self.upnp.internal_port = port;
        self.upnp.external_port = port;
        self.hole_punch.bind_addr.set_port(port);
    }

    /// Set the peer the hole punch strategy should probe
    pub fn set_peer(&mut self, peer: SocketAddr) {
        self.hole_punch.peer_addr = Some(peer);
    }
}
