//! Intent: a sized, risk-checked, protected order proposal.
//!
//! Only the RiskManager constructs intents; executors turn them into fills.

use super::side::{OrderSide, PositionSide};
use super::signal::Rationale;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether the intent opens a new position or closes the existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "side", rename_all = "snake_case")]
pub enum IntentAction {
    Open(PositionSide),
    Close(PositionSide),
}

impl IntentAction {
    /// The order side sent to the venue.
    pub fn order_side(self) -> OrderSide {
        match self {
            IntentAction::Open(side) => side.entry_side(),
            IntentAction::Close(side) => side.exit_side(),
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, IntentAction::Open(_))
    }

    pub fn position_side(self) -> PositionSide {
        match self {
            IntentAction::Open(side) | IntentAction::Close(side) => side,
        }
    }
}

/// What produced the intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentOrigin {
    Signal,
    StopLoss,
    TakeProfit,
    MarginCall,
}

/// Protective price levels attached to an opening intent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Protection {
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub symbol: String,
    pub action: IntentAction,
    pub quantity: f64,
    /// Trigger level for protective exits; `None` means "use the bar's reference price".
    pub trigger_price: Option<f64>,
    pub protection: Protection,
    pub origin: IntentOrigin,
    pub created_at: DateTime<Utc>,
    pub rationale: Rationale,
}

impl Intent {
    pub fn side(&self) -> OrderSide {
        self.action.order_side()
    }

    pub fn is_open(&self) -> bool {
        self.action.is_open()
    }
}
