//! Round-trip trade records, derived from an opening and a closing fill.

use super::ids::OrderId;
use super::intent::IntentOrigin;
use super::side::PositionSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Signal,
    StopLoss,
    TakeProfit,
    MarginCall,
}

impl From<IntentOrigin> for ExitReason {
    fn from(origin: IntentOrigin) -> Self {
        match origin {
            IntentOrigin::Signal => ExitReason::Signal,
            IntentOrigin::StopLoss => ExitReason::StopLoss,
            IntentOrigin::TakeProfit => ExitReason::TakeProfit,
            IntentOrigin::MarginCall => ExitReason::MarginCall,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: f64,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub fees: f64,
    pub net_pnl: f64,
    pub exit_reason: ExitReason,
    pub exit_order_id: OrderId,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }

    /// Net return relative to entry notional.
    pub fn return_pct(&self) -> f64 {
        let notional = self.entry_price * self.quantity;
        if notional > 0.0 {
            self.net_pnl / notional
        } else {
            0.0
        }
    }
}
