use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One point on the equity curve, appended once per bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    /// Reference close of the bar, kept for benchmark comparisons.
    pub price: f64,
    pub equity: f64,
    pub peak_equity: f64,
    pub drawdown: f64,
}
