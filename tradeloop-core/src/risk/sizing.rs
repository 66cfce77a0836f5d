//! Position sizing.
//!
//! Sizing is portfolio-aware (uses equity and trade history) but signal-agnostic:
//! it never changes the direction, only the quantity.

use super::config::SizingPolicy;
use std::collections::VecDeque;

/// Trailing realized outcomes of closed trades, used by Kelly sizing.
#[derive(Debug, Clone, Default)]
pub struct TradeStats {
    outcomes: VecDeque<f64>,
    capacity: usize,
}

impl TradeStats {
    pub fn new(capacity: usize) -> Self {
        Self {
            outcomes: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, pnl: f64) {
        if !pnl.is_finite() {
            return;
        }
        self.outcomes.push_back(pnl);
        while self.outcomes.len() > self.capacity {
            self.outcomes.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn win_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        self.outcomes.iter().filter(|p| **p > 0.0).count() as f64 / self.outcomes.len() as f64
    }

    /// Average win over average loss magnitude. `None` with no losses or no wins.
    pub fn payoff_ratio(&self) -> Option<f64> {
        let (wins, losses): (Vec<f64>, Vec<f64>) =
            self.outcomes.iter().partition(|p| **p > 0.0);
        let losses: Vec<f64> = losses.into_iter().filter(|p| *p < 0.0).collect();
        if wins.is_empty() || losses.is_empty() {
            return None;
        }
        let avg_win = wins.iter().sum::<f64>() / wins.len() as f64;
        let avg_loss = losses.iter().map(|l| l.abs()).sum::<f64>() / losses.len() as f64;
        Some(avg_win / avg_loss)
    }

    /// Raw Kelly fraction f = W − (1 − W) / R, unclamped.
    ///
    /// With wins but no losses the payoff ratio is unbounded and f reduces to W.
    pub fn kelly_fraction(&self) -> f64 {
        let w = self.win_rate();
        match self.payoff_ratio() {
            Some(r) => w - (1.0 - w) / r,
            None if w > 0.0 => w,
            None => 0.0,
        }
    }
}

/// Outcome of the sizing step before limits are applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizedQuantity {
    pub quantity: f64,
    /// Fraction of equity (or fixed amount share of it) the notional represents.
    pub fraction: f64,
}

/// Quantity prescribed by `policy` for an entry at `price`.
pub fn size_entry(policy: &SizingPolicy, equity: f64, price: f64, stats: &TradeStats) -> SizedQuantity {
    if !(price.is_finite() && price > 0.0 && equity.is_finite() && equity > 0.0) {
        return SizedQuantity {
            quantity: 0.0,
            fraction: 0.0,
        };
    }
    let notional = match policy {
        SizingPolicy::FixedPercentage { risk_per_trade } => equity * risk_per_trade,
        SizingPolicy::FixedAmount { amount } => *amount,
        SizingPolicy::Kelly {
            max_fraction,
            min_trades,
            fallback_fraction,
            ..
        } => {
            let fraction = if stats.len() < *min_trades {
                *fallback_fraction
            } else {
                stats.kelly_fraction()
            };
            equity * fraction.clamp(0.0, *max_fraction)
        }
    };
    let notional = notional.max(0.0);
    SizedQuantity {
        quantity: notional / price,
        fraction: notional / equity,
    }
}

/// Rounds `qty` down to a multiple of `step`. A non-positive step leaves it untouched.
pub fn round_down_to_step(qty: f64, step: f64) -> f64 {
    if step <= 0.0 || !qty.is_finite() {
        return qty;
    }
    // The epsilon keeps exact multiples (0.004 / 0.0001) from flooring one step low.
    ((qty / step) + 1e-9).floor() * step
}
