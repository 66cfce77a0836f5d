use super::intent::Protection;
use super::side::PositionSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An open position. Created by an opening fill, removed by a closing fill,
/// never partially mutated in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: f64,
    pub entry_price: f64,
    pub opened_at: DateTime<Utc>,
    pub entry_fee: f64,
    pub protection: Protection,
}

impl Position {
    pub fn unrealized_pnl(&self, mark: f64) -> f64 {
        (mark - self.entry_price) * self.quantity * self.side.sign()
    }

    pub fn notional(&self, mark: f64) -> f64 {
        mark * self.quantity
    }

    pub fn is_long(&self) -> bool {
        self.side == PositionSide::Long
    }
}
