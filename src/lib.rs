//! Kida - NAT traversal by ordered strategy fallback
//!
//! This library establishes outbound reachability for a peer sitting behind a
//! NAT or firewall. Traversal techniques (UPnP port mapping, UDP hole punching)
//! are expressed as independent strategies, and the connectivity orchestrator
//! tries them in order until one succeeds.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connectivity;

#[cfg(test)]
mod tests;

use connectivity::MappingError;
use tracing::Level;

/// Result type alias for Kida operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Kida operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Port mapping error
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

/// Initialize the Kida library with logging
pub fn init() {
    tracing_subscriber::fmt::init();
}

/// Initialize logging with an explicit maximum level
///
/// Does nothing if a global subscriber is already installed.
pub fn init_with_level(level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}
