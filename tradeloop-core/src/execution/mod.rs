//! Executors: turn admitted intents into fills.
//!
//! Both variants share one contract so the orchestrator never knows which it
//! is driving:
//! - **Simulated**: synthesizes fills from the bar with slippage and fees,
//!   always immediate and full
//! - **Live**: forwards the intent to an [`OrderGateway`] and awaits the
//!   acknowledgment under a timeout
//!
//! Neither touches the ledger. A fill's quantity never exceeds the intent's
//! and its fee is never negative.

pub mod cost_model;
pub mod live;
pub mod simulated;

pub use cost_model::{ExecutionConfig, ReferencePrice, SlippageModel};
pub use live::{GatewayAck, LiveExecutor, OrderGateway, OrderKind, OrderRequest};
pub use simulated::SimulatedExecutor;

use crate::domain::{Bar, Fill, Intent};
use async_trait::async_trait;
use thiserror::Error;

/// Failure to obtain a fill. Surfaced to the orchestrator, never retried by it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("no acknowledgment for order {order_id} within {timeout_ms} ms")]
    Timeout { order_id: String, timeout_ms: u64 },

    #[error("order {0} acknowledged with zero fill")]
    Unfilled(String),

    #[error("gateway transport failure: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Executor: Send {
    fn name(&self) -> &str;

    /// Submits `intent` against the current `bar`. The only suspension point
    /// in a run.
    async fn submit(&mut self, intent: &Intent, bar: &Bar) -> Result<Fill, GatewayError>;
}
