use super::ids::OrderId;
use super::intent::{IntentAction, IntentOrigin, Protection};
use super::side::OrderSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which fee schedule a fill paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Liquidity {
    Maker,
    Taker,
}

/// Realized outcome of submitting an intent.
///
/// `timestamp` is always the time of the bar the intent was admitted on, so
/// backtests and replayed paper sessions share one clock. `acknowledged_at`
/// keeps the gateway's own acknowledgement time when there is one.
///
/// `realized_pnl` is zero for opening fills. For closing fills the ledger
/// fills it in, net of both entry and exit fees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub side: OrderSide,
    pub action: IntentAction,
    pub price: f64,
    pub quantity: f64,
    pub fee: f64,
    pub realized_pnl: f64,
    pub liquidity: Liquidity,
    pub origin: IntentOrigin,
    pub protection: Protection,
}

impl Fill {
    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }

    pub fn is_closing(&self) -> bool {
        !self.action.is_open()
    }
}
