//! Connectivity module for NAT traversal
//!
//! This module establishes reachability by trying traversal strategies in
//! order until one succeeds:
//! - UPnP IGD port mapping
//! - UDP hole punching
//!
//! Each technique implements the [`Strategy`] trait; the orchestrator runs an
//! ordered list of them, isolates faults, and returns a single result.

// Submodules
pub mod hole_punch;
pub mod orchestrator;
pub mod strategy;
pub mod types;
pub mod upnp;

// Re-export commonly used types
pub use types::{
    AttemptRecord, ConnectionToken, EstablishmentReport, EstablishmentResult, IpProtocol,
    MappingError, Outcome, PortMappingResult, StrategyAttempt, StrategyFault,
};

// Re-export main functions
pub use orchestrator::{
    default_strategies, establish, establish_connectivity, establish_with_report,
    EstablishmentState,
};
pub use strategy::Strategy;

// Re-export strategies
pub use hole_punch::{HolePunchConfig, HolePunchStrategy};
pub use upnp::{delete_upnp_mapping, UpnpConfig, UpnpStrategy};
