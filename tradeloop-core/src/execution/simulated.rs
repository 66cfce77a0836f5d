//! Backtest executor: deterministic fills synthesized from the bar.

use super::{ExecutionConfig, Executor, GatewayError};
use crate::domain::{Bar, Fill, Intent, OrderId};
use crate::engine::EngineContext;
use async_trait::async_trait;
use tracing::info;

/// Fills every intent immediately and in full.
///
/// Identical (bar, intent, config) inputs always produce identical fills,
/// including order ids, which are sequential per executor.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    config: ExecutionConfig,
    next_order: u64,
}

impl SimulatedExecutor {
    pub fn new(ctx: &EngineContext) -> Self {
        Self::with_config(ctx.execution.clone())
    }

    pub fn with_config(config: ExecutionConfig) -> Self {
        Self {
            config,
            next_order: 1,
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Synchronous core of [`Executor::submit`].
    pub fn fill(&mut self, intent: &Intent, bar: &Bar) -> Result<Fill, GatewayError> {
        let price = self.config.fill_price(intent, bar);
        if !(price.is_finite() && price > 0.0) {
            return Err(GatewayError::Rejected(format!(
                "no valid fill price for {} at {}",
                intent.symbol, bar.timestamp
            )));
        }
        let liquidity = self.config.liquidity_for(intent);
        let quantity = intent.quantity;
        let fee = self.config.fee(liquidity, price * quantity);
        let order_id = OrderId::sequential("SIM", self.next_order);
        self.next_order += 1;

        info!(
            order_id = %order_id,
            side = %intent.side(),
            quantity,
            price,
            fee,
            origin = ?intent.origin,
            "simulated fill"
        );

        Ok(Fill {
            order_id,
            symbol: intent.symbol.clone(),
            timestamp: bar.timestamp,
            acknowledged_at: None,
            side: intent.side(),
            action: intent.action,
            price,
            quantity,
            fee,
            realized_pnl: 0.0,
            liquidity,
            origin: intent.origin,
            protection: intent.protection,
        })
    }
}

#[async_trait]
impl Executor for SimulatedExecutor {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn submit(&mut self, intent: &Intent, bar: &Bar) -> Result<Fill, GatewayError> {
        self.fill(intent, bar)
    }
}
