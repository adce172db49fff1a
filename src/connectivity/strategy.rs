//! The capability every traversal technique implements

use super::types::{Outcome, StrategyFault};
use async_trait::async_trait;

/// One self-contained traversal technique
///
/// A strategy knows nothing about the alternatives tried before or after it.
/// Everything it needs (ports, peer address, timeouts) is fixed when it is
/// constructed; `attempt` takes no input.
///
/// Implementations must bound their own blocking with an internal timeout.
/// The orchestrator waits for `attempt` to finish and does not cancel it.
///
/// Return `Ok(Outcome::Empty)` for an expected negative answer ("no device
/// found", "mapping rejected") and `Err(StrategyFault)` for anything that
/// should show up in diagnostics as an anomaly.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Token handed back on success
    type Token: Send;

    /// Short name used in log lines and reports
    fn name(&self) -> &str;

    /// Try the technique once
    async fn attempt(&self) -> Result<Outcome<Self::Token>, StrategyFault>;
}

#[async_trait]
impl<S: Strategy + ?Sized> Strategy for Box<S> {
    type Token = S::Token;

    fn name(&self) -> &str {
        (**self).name()
    }

    async fn attempt(&self) -> Result<Outcome<Self::Token>, StrategyFault> {
        (**self).attempt().await
    }
}
