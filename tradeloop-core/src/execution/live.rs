//! Live executor: forwards intents to an external order gateway.

use super::{ExecutionConfig, Executor, GatewayError};
use crate::domain::{Bar, Fill, Intent, OrderId, OrderSide};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Market,
    Stop,
}

/// What the gateway is asked to do. `price` is set only for stop orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: Option<f64>,
    pub kind: OrderKind,
}

impl OrderRequest {
    pub fn from_intent(intent: &Intent, client_id: impl Into<String>) -> Self {
        let (kind, price) = match intent.trigger_price {
            Some(level) => (OrderKind::Stop, Some(level)),
            None => (OrderKind::Market, None),
        };
        Self {
            client_id: client_id.into(),
            symbol: intent.symbol.clone(),
            side: intent.side(),
            quantity: intent.quantity,
            price,
            kind,
        }
    }
}

/// Fill-shaped acknowledgment returned by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayAck {
    pub order_id: String,
    pub filled_quantity: f64,
    pub average_price: f64,
    pub fee: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Black-box order gateway. Retries, auth and transport live behind it.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn submit(&self, request: OrderRequest) -> Result<GatewayAck, GatewayError>;

    async fn cancel(&self, order_id: &str) -> Result<(), GatewayError>;
}

pub struct LiveExecutor<G: OrderGateway> {
    gateway: Arc<G>,
    ack_timeout: Duration,
    config: ExecutionConfig,
    client_prefix: String,
    next_client: u64,
}

impl<G: OrderGateway> LiveExecutor<G> {
    pub fn new(gateway: Arc<G>, ack_timeout: Duration, config: ExecutionConfig) -> Self {
        Self {
            gateway,
            ack_timeout,
            config,
            client_prefix: "LIVE".to_string(),
            next_client: 1,
        }
    }

    /// Prefix for client order ids, e.g. the symbol in multi-symbol sessions.
    pub fn with_client_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.client_prefix = prefix.into();
        self
    }

    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    fn to_fill(&self, intent: &Intent, bar: &Bar, ack: GatewayAck) -> Result<Fill, GatewayError> {
        let quantity = ack.filled_quantity.min(intent.quantity);
        if !(quantity > 0.0) {
            return Err(GatewayError::Unfilled(ack.order_id));
        }
        if !(ack.average_price.is_finite() && ack.average_price > 0.0) {
            return Err(GatewayError::Rejected(format!(
                "order {} acknowledged with invalid price {}",
                ack.order_id, ack.average_price
            )));
        }
        let fee = if ack.fee.is_finite() { ack.fee.max(0.0) } else { 0.0 };
        Ok(Fill {
            order_id: OrderId::new(ack.order_id),
            symbol: intent.symbol.clone(),
            timestamp: bar.timestamp,
            acknowledged_at: ack.timestamp,
            side: intent.side(),
            action: intent.action,
            price: ack.average_price,
            quantity,
            fee,
            realized_pnl: 0.0,
            liquidity: self.config.liquidity_for(intent),
            origin: intent.origin,
            protection: intent.protection,
        })
    }
}

#[async_trait]
impl<G: OrderGateway + 'static> Executor for LiveExecutor<G> {
    fn name(&self) -> &str {
        "live"
    }

    async fn submit(&mut self, intent: &Intent, bar: &Bar) -> Result<Fill, GatewayError> {
        let client_id = format!("{}-{:06}", self.client_prefix, self.next_client);
        self.next_client += 1;
        let request = OrderRequest::from_intent(intent, client_id.clone());

        match timeout(self.ack_timeout, self.gateway.submit(request)).await {
            Ok(Ok(ack)) => {
                let fill = self.to_fill(intent, bar, ack)?;
                info!(
                    order_id = %fill.order_id,
                    side = %fill.side,
                    quantity = fill.quantity,
                    price = fill.price,
                    fee = fill.fee,
                    "gateway fill"
                );
                Ok(fill)
            }
            Ok(Err(e)) => {
                warn!(client_id = %client_id, error = %e, "gateway refused order");
                Err(e)
            }
            Err(_) => {
                let timeout_ms = self.ack_timeout.as_millis() as u64;
                warn!(client_id = %client_id, timeout_ms, "ack timed out, cancelling");
                match timeout(self.ack_timeout, self.gateway.cancel(&client_id)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(client_id = %client_id, error = %e, "cancel failed"),
                    Err(_) => warn!(client_id = %client_id, "cancel timed out"),
                }
                Err(GatewayError::Timeout {
                    order_id: client_id,
                    timeout_ms,
                })
            }
        }
    }
}
