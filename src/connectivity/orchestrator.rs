//! Connectivity orchestrator - ordered strategy fallback
//!
//! Strategies are tried strictly one at a time in the order the caller gave
//! them. The first success ends the run; strategies after it are never
//! invoked. A strategy that returns an error or panics is logged and treated
//! as if it had returned [`Outcome::Empty`].

use super::hole_punch::HolePunchStrategy;
use super::strategy::Strategy;
use super::types::{
    AttemptRecord, ConnectionToken, EstablishmentReport, EstablishmentResult, Outcome,
    StrategyAttempt, StrategyFault,
};
use super::upnp::UpnpStrategy;
use crate::config::KidaConfig;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

/// Position of an establishment run
///
/// `Established` and `Exhausted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstablishmentState {
    /// Strategy at this index is about to run
    Trying(usize),
    /// Strategy at this index succeeded
    Established(usize),
    /// No strategy succeeded
    Exhausted,
}

impl EstablishmentState {
    /// Initial state for a list of `len` strategies
    pub fn start(len: usize) -> Self {
        if len == 0 {
            Self::Exhausted
        } else {
            Self::Trying(0)
        }
    }

    /// Transition after the current strategy finished
    pub fn advance(self, succeeded: bool, len: usize) -> Self {
        match self {
            Self::Trying(index) if succeeded => Self::Established(index),
            Self::Trying(index) if index + 1 < len => Self::Trying(index + 1),
            Self::Trying(_) => Self::Exhausted,
            terminal => terminal,
        }
    }

    /// Check if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Trying(_))
    }
}

/// Run the strategies in order and return the first success
///
/// Never fails: an empty list, or a list where every strategy comes back
/// empty or faults, yields [`EstablishmentResult::Exhausted`].
///
/// # Example
///
/// ```no_run
/// use kida::config::KidaConfig;
/// use kida::connectivity::{default_strategies, establish};
///
/// # async fn example() {
/// let strategies = default_strategies(&KidaConfig::default());
/// match establish(&strategies).await.into_token() {
///     Some(token) => println!("Reachable: {}", token),
///     None => println!("All strategies exhausted"),
/// }
/// # }
/// ```
pub async fn establish<S: Strategy>(strategies: &[S]) -> EstablishmentResult<S::Token> {
    establish_with_report(strategies).await.result
}

/// Same as [`establish`], but also records what every strategy did
pub async fn establish_with_report<S: Strategy>(strategies: &[S]) -> EstablishmentReport<S::Token> {
    let span = info_span!(
        "establish",
        attempt_id = %Uuid::new_v4(),
        strategies = strategies.len()
    );

    run_strategies(strategies).instrument(span).await
}

async fn run_strategies<S: Strategy>(strategies: &[S]) -> EstablishmentReport<S::Token> {
    let total = strategies.len();
    let mut attempts: Vec<AttemptRecord> = strategies
        .iter()
        .map(|strategy| AttemptRecord {
            strategy: strategy.name().to_string(),
            attempt: StrategyAttempt::NotAttempted,
        })
        .collect();

    let mut token = None;
    let mut state = EstablishmentState::start(total);

    while let EstablishmentState::Trying(index) = state {
        let strategy = &strategies[index];
        let name = strategy.name();
        info!("Attempting {} ({}/{})...", name, index + 1, total);

        let succeeded = match attempt_isolated(strategy).await {
            Ok(Outcome::Success(found)) => {
                info!("{} succeeded", name);
                attempts[index].attempt = StrategyAttempt::Success;
                token = Some(found);
                true
            }
            Ok(Outcome::Empty) => {
                debug!("{} made no progress", name);
                attempts[index].attempt = StrategyAttempt::Empty;
                false
            }
            Err(fault) => {
                error!("Fault encountered during {} attempt: {}", name, fault);
                attempts[index].attempt = StrategyAttempt::Faulted(fault.to_string());
                false
            }
        };

        state = state.advance(succeeded, total);
    }

    let result = match token {
        Some(found) => EstablishmentResult::Established(found),
        None => EstablishmentResult::Exhausted,
    };
    let report = EstablishmentReport { result, attempts };

    if report.is_success() {
        info!("Connectivity established. Summary: {}", report.summary());
    } else {
        error!(
            "All connection strategies exhausted with no success. Summary: {}",
            report.summary()
        );
    }

    report
}

/// Invoke one strategy, turning a panic into a fault
async fn attempt_isolated<S: Strategy>(strategy: &S) -> Result<Outcome<S::Token>, StrategyFault> {
    match AssertUnwindSafe(async { strategy.attempt().await })
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(payload) => Err(StrategyFault::Panicked(panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Build the standard strategy list: UPnP port mapping, then UDP hole punch
pub fn default_strategies(config: &KidaConfig) -> Vec<Box<dyn Strategy<Token = ConnectionToken>>> {
    let strategies: Vec<Box<dyn Strategy<Token = ConnectionToken>>> = vec![
        Box::new(UpnpStrategy::new(config.upnp.clone())),
        Box::new(HolePunchStrategy::new(config.hole_punch.clone())),
    ];
    strategies
}

/// Establish connectivity with the standard strategies
///
/// Tries UPnP port mapping first, then UDP hole punching, as configured.
pub async fn establish_connectivity(config: &KidaConfig) -> EstablishmentReport<ConnectionToken> {
    info!("Establishing connectivity (trying UPnP → hole punch)");
    establish_with_report(&default_strategies(config)).await
}
