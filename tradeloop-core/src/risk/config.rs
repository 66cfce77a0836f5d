//! Risk policy configuration.
//!
//! Every field has a serde default so partial TOML tables deserialize.

use serde::{Deserialize, Serialize};

fn default_risk_per_trade() -> f64 {
    0.02
}

fn default_fixed_amount() -> f64 {
    100_000.0
}

fn default_kelly_max_fraction() -> f64 {
    0.25
}

fn default_kelly_lookback() -> usize {
    50
}

fn default_kelly_min_trades() -> usize {
    10
}

fn default_stop_pct() -> f64 {
    0.02
}

fn default_atr_multiplier() -> f64 {
    2.0
}

fn default_atr_field() -> String {
    "atr".to_string()
}

fn default_stop_amount() -> f64 {
    50_000.0
}

fn default_take_pct() -> f64 {
    0.04
}

fn default_reward_ratio() -> f64 {
    2.0
}

fn default_take_amount() -> f64 {
    100_000.0
}

/// How many units to trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SizingPolicy {
    /// Notional = risk_per_trade × equity.
    FixedPercentage {
        #[serde(default = "default_risk_per_trade")]
        risk_per_trade: f64,
    },
    /// Notional = a fixed currency amount.
    FixedAmount {
        #[serde(default = "default_fixed_amount")]
        amount: f64,
    },
    /// Notional = clamped Kelly fraction × equity, estimated from trailing trades.
    Kelly {
        #[serde(default = "default_kelly_max_fraction")]
        max_fraction: f64,
        #[serde(default = "default_kelly_lookback")]
        lookback: usize,
        #[serde(default = "default_kelly_min_trades")]
        min_trades: usize,
        /// Fraction used until `min_trades` closed trades exist.
        #[serde(default = "default_risk_per_trade")]
        fallback_fraction: f64,
    },
}

impl Default for SizingPolicy {
    fn default() -> Self {
        SizingPolicy::FixedPercentage {
            risk_per_trade: default_risk_per_trade(),
        }
    }
}

impl SizingPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            SizingPolicy::FixedPercentage { .. } => "fixed_percentage",
            SizingPolicy::FixedAmount { .. } => "fixed_amount",
            SizingPolicy::Kelly { .. } => "kelly",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StopLossPolicy {
    None,
    Percentage {
        #[serde(default = "default_stop_pct")]
        pct: f64,
    },
    Atr {
        #[serde(default = "default_atr_multiplier")]
        multiplier: f64,
        #[serde(default = "default_atr_field")]
        field: String,
    },
    FixedAmount {
        #[serde(default = "default_stop_amount")]
        amount: f64,
    },
}

impl Default for StopLossPolicy {
    fn default() -> Self {
        StopLossPolicy::Percentage {
            pct: default_stop_pct(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TakeProfitPolicy {
    None,
    Percentage {
        #[serde(default = "default_take_pct")]
        pct: f64,
    },
    RiskReward {
        #[serde(default = "default_reward_ratio")]
        ratio: f64,
    },
    FixedAmount {
        #[serde(default = "default_take_amount")]
        amount: f64,
    },
}

impl Default for TakeProfitPolicy {
    fn default() -> Self {
        TakeProfitPolicy::RiskReward {
            ratio: default_reward_ratio(),
        }
    }
}

/// Limits and policies enforced by the RiskManager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub sizing: SizingPolicy,
    pub stop_loss: StopLossPolicy,
    pub take_profit: TakeProfitPolicy,
    /// Largest quantity a single position may have.
    pub max_position_size: f64,
    /// Quantities below this are vetoed.
    pub min_order_size: f64,
    /// Quantities are rounded down to a multiple of this.
    pub quantity_step: f64,
    /// Protective prices are rounded to a multiple of this.
    pub tick_size: f64,
    pub max_open_positions: usize,
    pub max_daily_trades: usize,
    pub max_drawdown_percentage: f64,
    /// Margin level below which every open position is closed.
    pub margin_call_level: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            sizing: SizingPolicy::default(),
            stop_loss: StopLossPolicy::default(),
            take_profit: TakeProfitPolicy::default(),
            max_position_size: 0.1,
            min_order_size: 0.0001,
            quantity_step: 0.0001,
            tick_size: 1.0,
            max_open_positions: 3,
            max_daily_trades: 10,
            max_drawdown_percentage: 0.20,
            margin_call_level: 0.05,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policies_deserialize_with_defaults() {
        let cfg: RiskConfig = serde_json::from_str(
            r#"{
                "sizing": {"type": "kelly"},
                "stop_loss": {"type": "atr", "multiplier": 3.0},
                "take_profit": {"type": "none"},
                "max_open_positions": 1
            }"#,
        )
        .unwrap();
        assert_eq!(
            cfg.sizing,
            SizingPolicy::Kelly {
                max_fraction: 0.25,
                lookback: 50,
                min_trades: 10,
                fallback_fraction: 0.02
            }
        );
        assert_eq!(
            cfg.stop_loss,
            StopLossPolicy::Atr {
                multiplier: 3.0,
                field: "atr".into()
            }
        );
        assert_eq!(cfg.take_profit, TakeProfitPolicy::None);
        assert_eq!(cfg.max_open_positions, 1);
        assert_eq!(cfg.max_daily_trades, 10);
    }

    #[test]
    fn default_sizing_is_two_percent() {
        assert_eq!(
            RiskConfig::default().sizing,
            SizingPolicy::FixedPercentage {
                risk_per_trade: 0.02
            }
        );
    }
}
