//! PerformanceAnalyzer: run-end reductions over fills and equity points.
//!
//! Nothing here feeds back into the simulation.

pub mod metrics;

use crate::domain::{EquityPoint, Fill};
use crate::engine::EngineContext;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Annualization factor for Sharpe (8760 for hourly bars).
    pub bars_per_year: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bars_per_year: 8760.0,
        }
    }
}

/// Summary statistics for one run.
///
/// Fractions are fractions (0.05 = 5%) except `total_return_pct`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub initial_capital: f64,
    pub final_equity: f64,
    pub total_return: f64,
    pub total_return_pct: f64,
    pub max_drawdown: f64,
    pub sharpe: Option<f64>,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    #[serde(with = "float_or_string")]
    pub profit_factor: f64,
    pub avg_win: f64,
    /// Mean of losing trades' pnl, so negative or zero.
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub max_consecutive_losses: usize,
    pub total_fees: f64,
    pub benchmark_return: f64,
    pub excess_return: f64,
    pub bars: usize,
}

#[derive(Debug, Clone)]
pub struct PerformanceAnalyzer {
    config: AnalysisConfig,
    initial_capital: f64,
    benchmark_fee: f64,
}

impl PerformanceAnalyzer {
    pub fn new(ctx: &EngineContext) -> Self {
        Self {
            config: ctx.analysis.clone(),
            initial_capital: ctx.ledger.initial_capital,
            benchmark_fee: ctx.execution.taker_fee,
        }
    }

    /// Reduces the full fill and equity sequences of a run.
    pub fn analyze(&self, fills: &[Fill], equity: &[EquityPoint]) -> PerformanceReport {
        let capital = self.initial_capital;
        let pnls: Vec<f64> = fills
            .iter()
            .filter(|f| f.is_closing())
            .map(|f| f.realized_pnl)
            .collect();
        let wins: Vec<f64> = pnls.iter().copied().filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = pnls.iter().copied().filter(|p| *p <= 0.0).collect();

        let final_equity = equity.last().map(|p| p.equity).unwrap_or(capital);
        let total_return = if capital > 0.0 {
            (final_equity - capital) / capital
        } else {
            0.0
        };

        let curve: Vec<f64> = std::iter::once(capital)
            .chain(equity.iter().map(|p| p.equity))
            .collect();
        let max_drawdown = equity.iter().map(|p| p.drawdown).fold(0.0, f64::max);

        let prices: Vec<f64> = equity
            .iter()
            .map(|p| p.price)
            .filter(|p| p.is_finite() && *p > 0.0)
            .collect();
        let benchmark_return = match (prices.first(), prices.last()) {
            (Some(&first), Some(&last)) => {
                metrics::buy_and_hold_return(first, last, self.benchmark_fee)
            }
            _ => 0.0,
        };

        PerformanceReport {
            initial_capital: capital,
            final_equity,
            total_return,
            total_return_pct: total_return * 100.0,
            max_drawdown,
            sharpe: metrics::sharpe_ratio(&curve, self.config.bars_per_year),
            total_trades: pnls.len(),
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate: metrics::win_rate(&pnls),
            profit_factor: metrics::profit_factor(&pnls),
            avg_win: metrics::mean_f64(&wins),
            avg_loss: metrics::mean_f64(&losses),
            largest_win: wins.iter().copied().fold(0.0, f64::max),
            largest_loss: losses.iter().copied().fold(0.0, f64::min),
            max_consecutive_losses: metrics::max_consecutive_losses(&pnls),
            total_fees: fills.iter().map(|f| f.fee).sum(),
            benchmark_return,
            excess_return: total_return - benchmark_return,
            bars: equity.len(),
        }
    }
}

/// Serializes non-finite floats as `"inf"`, `"-inf"` or `"NaN"`, which JSON
/// cannot represent as numbers.
mod float_or_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            s.serialize_f64(*value)
        } else if value.is_nan() {
            s.serialize_str("NaN")
        } else if *value > 0.0 {
            s.serialize_str("inf")
        } else {
            s.serialize_str("-inf")
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }
        match Repr::deserialize(d)? {
            Repr::Number(v) => Ok(v),
            Repr::Text(t) => t.parse::<f64>().map_err(serde::de::Error::custom),
        }
    }
}
