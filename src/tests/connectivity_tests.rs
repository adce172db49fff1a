use crate::connectivity::*;
use crate::connectivity::hole_punch::{PROBE_MARKER, RESPONSE_MARKER};
use crate::connectivity::upnp::{classify, join_fault, DEFAULT_PORT};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;

fn sample_mapping() -> PortMappingResult {
    PortMappingResult {
        external_ip: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 10)),
        external_port: 8888,
        internal_addr: "192.168.1.20:8888".parse().unwrap(),
        lifetime_secs: 0,
        protocol: IpProtocol::UDP,
        created_at_ms: 1234567890000,
    }
}

// ========================================================================
// Types
// ========================================================================

#[test]
fn test_outcome_from_option() {
    assert_eq!(Outcome::from(Some(7)), Outcome::Success(7));
    assert_eq!(Outcome::<i32>::from(None), Outcome::Empty);
    assert!(Outcome::Success(()).is_success());
    assert!(!Outcome::<()>::Empty.is_success());
}

#[test]
fn test_establishment_result_accessors() {
    let established = EstablishmentResult::Established(5);
    assert!(established.is_established());
    assert_eq!(established.token(), Some(&5));
    assert_eq!(established.into_token(), Some(5));

    let exhausted = EstablishmentResult::<i32>::Exhausted;
    assert!(!exhausted.is_established());
    assert_eq!(exhausted.token(), None);
}

#[test]
fn test_mapping_error_classification() {
    assert!(!MappingError::NoGateway("timeout".to_string()).is_fault());
    assert!(!MappingError::ExternalIp("bad reply".to_string()).is_fault());
    assert!(!MappingError::Rejected("ConflictInMappingEntry".to_string()).is_fault());
    assert!(MappingError::LocalAddress("no route".to_string()).is_fault());
    assert!(MappingError::Internal("join".to_string()).is_fault());
    assert!(MappingError::Io(std::io::Error::other("boom")).is_fault());
}

#[test]
fn test_ip_protocol_numbers() {
    assert_eq!(IpProtocol::TCP as u8, 6);
    assert_eq!(IpProtocol::UDP as u8, 17);
    assert!(matches!(
        IpProtocol::UDP.to_igd(),
        igd_next::PortMappingProtocol::UDP
    ));
    assert!(matches!(
        IpProtocol::TCP.to_igd(),
        igd_next::PortMappingProtocol::TCP
    ));
}

#[test]
fn test_connection_token_serialization() {
    let token = ConnectionToken::PortMapped(sample_mapping());

    let json = serde_json::to_string(&token).unwrap();
    let deserialized: ConnectionToken = serde_json::from_str(&json).unwrap();
    assert_eq!(token, deserialized);
}

#[test]
fn test_connection_token_display() {
    let mapped = ConnectionToken::PortMapped(sample_mapping());
    assert_eq!(
        mapped.to_string(),
        "port mapped 203.0.113.10:8888 -> 192.168.1.20:8888 (UDP)"
    );

    let punched = ConnectionToken::HolePunched {
        local: "0.0.0.0:40000".parse().unwrap(),
        peer: "198.51.100.7:41000".parse().unwrap(),
    };
    assert_eq!(
        punched.to_string(),
        "hole punched 0.0.0.0:40000 <-> 198.51.100.7:41000"
    );
}

// ========================================================================
// UPnP
// ========================================================================

#[test]
fn test_upnp_config_defaults() {
    let config = UpnpConfig::default();
    assert_eq!(config.discovery_timeout(), Duration::from_millis(2000));
    assert_eq!(config.internal_port, DEFAULT_PORT);
    assert_eq!(config.external_port, DEFAULT_PORT);
    assert_eq!(config.protocol, IpProtocol::UDP);
    assert_eq!(config.lease_duration_secs, 0);
    assert_eq!(config.description, "Kida");
}

#[test]
fn test_upnp_config_for_port() {
    let config = UpnpConfig::for_port(9000);
    assert_eq!(config.internal_port, 9000);
    assert_eq!(config.external_port, 9000);
    assert_eq!(config.protocol, IpProtocol::UDP);

    let strategy = UpnpStrategy::new(config.clone());
    assert_eq!(strategy.name(), "upnp");
    assert_eq!(strategy.config(), &config);
}

#[test]
fn test_classify_success() {
    let mapping = sample_mapping();
    let outcome = classify(Ok(mapping.clone())).unwrap();
    assert_eq!(outcome, Outcome::Success(ConnectionToken::PortMapped(mapping)));
}

#[test]
fn test_classify_expected_misses_are_empty() {
    let no_gateway = classify(Err(MappingError::NoGateway("timeout".to_string())));
    assert!(matches!(no_gateway, Ok(Outcome::Empty)));

    let rejected = classify(Err(MappingError::Rejected("refused".to_string())));
    assert!(matches!(rejected, Ok(Outcome::Empty)));
}

#[test]
fn test_classify_local_failures_are_faults() {
    let fault = classify(Err(MappingError::LocalAddress("no route".to_string())));
    assert!(matches!(
        fault,
        Err(StrategyFault::Mapping(MappingError::LocalAddress(_)))
    ));
}

// ========================================================================
// Hole punch
// ========================================================================

fn loopback_config(peer: SocketAddr) -> HolePunchConfig {
    HolePunchConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        peer_addr: Some(peer),
        max_probes: 20,
        probe_timeout_ms: 100,
        probe_interval_ms: 20,
    }
}

#[test]
fn test_hole_punch_config_defaults() {
    let config = HolePunchConfig::default();
    assert_eq!(config.peer_addr, None);
    assert_eq!(config.bind_addr.port(), 0);
    assert_eq!(config.max_duration(), Duration::from_millis(20 * 150));
}

#[tokio::test]
async fn test_hole_punch_without_peer_is_empty() {
    let strategy = HolePunchStrategy::new(HolePunchConfig::default());
    assert_eq!(strategy.name(), "hole-punch");

    let outcome = strategy.attempt().await.unwrap();
    assert_eq!(outcome, Outcome::Empty);
}

#[tokio::test]
async fn test_hole_punch_with_responding_peer() {
    let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer = responder.local_addr().unwrap();

    let responder_task = tokio::spawn(async move {
        let mut buf = [0u8; 64];
        loop {
            let (len, from) = responder.recv_from(&mut buf).await.unwrap();
            if &buf[..len] == PROBE_MARKER {
                responder.send_to(RESPONSE_MARKER, from).await.unwrap();
                return from;
            }
        }
    });

    let strategy = HolePunchStrategy::new(loopback_config(peer));
    let outcome = strategy.attempt().await.unwrap();

    let prober = responder_task.await.unwrap();
    match outcome {
        Outcome::Success(ConnectionToken::HolePunched { local, peer: answered }) => {
            assert_eq!(answered, peer);
            assert_eq!(local, prober);
        }
        other => panic!("Expected hole punch success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_hole_punch_silent_peer_is_empty() {
    // Bound but never reads, so probes go unanswered
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut config = loopback_config(silent.local_addr().unwrap());
    config.max_probes = 3;
    config.probe_timeout_ms = 20;
    config.probe_interval_ms = 5;

    let outcome = HolePunchStrategy::new(config).attempt().await.unwrap();
    assert_eq!(outcome, Outcome::Empty);
}

#[tokio::test]
async fn test_hole_punch_unbindable_address_faults() {
    let mut config = loopback_config("127.0.0.1:9".parse().unwrap());
    // TEST-NET-3 is never assigned to a local interface
    config.bind_addr = "203.0.113.1:0".parse().unwrap();

    let result = HolePunchStrategy::new(config).attempt().await;
    assert!(matches!(result, Err(StrategyFault::Io(_))));
}

#[test]
fn test_default_strategy_order() {
    let strategies = default_strategies(&crate::config::KidaConfig::default());
    let names: Vec<&str> = strategies.iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["upnp", "hole-punch"]);
}

#[test]
fn test_report_serializable_records() {
    let record = AttemptRecord {
        strategy: "upnp".to_string(),
        attempt: StrategyAttempt::Faulted("No gateway found: timeout".to_string()),
    };

    let json = serde_json::to_string(&record).unwrap();
    let deserialized: AttemptRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(record, deserialized);

    let report = EstablishmentReport {
        result: EstablishmentResult::<ConnectionToken>::Exhausted,
        attempts: vec![record],
    };
    assert!(!report.is_success());
    assert_eq!(report.summary(), "upnp: fault (No gateway found: timeout)");
}

// ========================================================================
// Error conversion and edge cases
// ========================================================================

#[test]
fn test_mapping_error_into_crate_error() {
    let error = crate::Error::from(MappingError::NoGateway("timeout".to_string()));
    assert!(matches!(error, crate::Error::Mapping(MappingError::NoGateway(_))));
    assert_eq!(error.to_string(), "Mapping error: No gateway found: timeout");
}

#[tokio::test]
async fn test_blocking_task_panic_is_fault() {
    let handle = tokio::task::spawn_blocking(|| -> Result<PortMappingResult, MappingError> {
        panic!("igd worker crashed")
    });

    let fault = join_fault(handle.await.unwrap_err());
    match fault {
        StrategyFault::Internal(message) => assert!(message.starts_with("Task join error")),
        other => panic!("Expected internal fault, got {:?}", other),
    }
}

#[test]
fn test_max_duration_saturates() {
    let config = HolePunchConfig {
        max_probes: u32::MAX,
        probe_timeout_ms: u64::MAX,
        probe_interval_ms: u64::MAX,
        ..HolePunchConfig::default()
    };

    assert_eq!(config.max_duration(), Duration::from_millis(u64::MAX));
}

#[tokio::test]
async fn test_hole_punch_releases_socket_after_success() {
    let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer = responder.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 64];
        loop {
            let (len, from) = responder.recv_from(&mut buf).await.unwrap();
            if &buf[..len] == PROBE_MARKER {
                responder.send_to(RESPONSE_MARKER, from).await.unwrap();
                return;
            }
        }
    });

    let outcome = HolePunchStrategy::new(loopback_config(peer))
        .attempt()
        .await
        .unwrap();

    let local = match outcome {
        Outcome::Success(ConnectionToken::HolePunched { local, .. }) => local,
        other => panic!("Expected hole punch success, got {:?}", other),
    };

    // The attempt's socket is closed, so the same local address binds again
    let rebound = UdpSocket::bind(local).await;
    assert!(rebound.is_ok(), "Local address should be free after the attempt");
}
