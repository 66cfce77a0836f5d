use serde::{Deserialize, Serialize};

/// Read-only snapshot of the account, as handed to strategies and risk checks.
///
/// `margin_level` is equity over required margin and is +inf while flat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub equity: f64,
    pub balance: f64,
    pub unrealized_pnl: f64,
    pub available_margin: f64,
    pub margin_level: f64,
    pub peak_equity: f64,
}

impl AccountState {
    /// Fresh account holding only cash.
    pub fn with_capital(capital: f64) -> Self {
        Self {
            equity: capital,
            balance: capital,
            unrealized_pnl: 0.0,
            available_margin: capital,
            margin_level: f64::INFINITY,
            peak_equity: capital,
        }
    }

    /// Fractional decline from the running peak, clamped to [0, 1].
    pub fn drawdown(&self) -> f64 {
        drawdown(self.peak_equity, self.equity)
    }
}

pub(crate) fn drawdown(peak: f64, equity: f64) -> f64 {
    if peak <= 0.0 {
        return 0.0;
    }
    ((peak - equity) / peak).clamp(0.0, 1.0)
}
