//! Strategy engine: maps (bar, position, account) to a signal.
//!
//! Every variant declares the indicator fields it needs. Reading goes through
//! [`read_fields`], which separates the two failure modes:
//!
//! - a field the bar does not carry at all is a configuration problem and
//!   fails the run with [`StrategyError::MissingIndicator`];
//! - a field that is present but NaN/inf is normal during warm-up and comes
//!   back as [`Evaluation::InvalidValue`], which the orchestrator treats as HOLD.

pub mod breakout;
pub mod grid;
pub mod learned;
pub mod ma_crossover;
pub mod multi_timeframe;
pub mod oscillator;
pub mod registry;

pub use breakout::ChannelBreakout;
pub use grid::GridTrading;
pub use learned::{LearnedModel, LearnedParams};
pub use ma_crossover::{MaCrossover, MaType};
pub use multi_timeframe::MultiTimeframe;
pub use oscillator::MacdRsi;
pub use registry::{FactoryError, StrategyFactory, StrategyRegistry};

use crate::domain::{AccountState, Bar, Position, PositionSide, Rationale, Signal, SignalKind};
use std::collections::BTreeMap;
use thiserror::Error;

/// Numeric strategy parameters, keyed by name.
pub type StrategyParams = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyError {
    #[error("strategy '{strategy}' requires indicator '{field}' which the feed does not supply")]
    MissingIndicator { strategy: String, field: String },
}

/// Outcome of evaluating one bar.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// A decision was reached. May itself be HOLD.
    Decided(Signal),
    /// A required field is present but not a finite number.
    InvalidValue { field: String, rationale: Rationale },
    /// Not enough history yet (own cache or resampled view).
    InsufficientData { rationale: Rationale },
}

impl Evaluation {
    pub fn decided(kind: SignalKind, rationale: Rationale) -> Self {
        Evaluation::Decided(Signal::new(kind, rationale))
    }

    pub fn hold(reason: impl Into<String>) -> Self {
        Evaluation::Decided(Signal::hold(reason))
    }

    pub fn insufficient(reason: impl Into<String>) -> Self {
        Evaluation::InsufficientData {
            rationale: Rationale::new(reason),
        }
    }

    /// The signal to act on. Recoverable conditions collapse to HOLD.
    pub fn signal(&self) -> Signal {
        match self {
            Evaluation::Decided(signal) => signal.clone(),
            Evaluation::InvalidValue { rationale, .. }
            | Evaluation::InsufficientData { rationale } => {
                Signal::new(SignalKind::Hold, rationale.clone())
            }
        }
    }

    pub fn kind(&self) -> SignalKind {
        match self {
            Evaluation::Decided(signal) => signal.kind,
            _ => SignalKind::Hold,
        }
    }
}

/// A trading strategy.
///
/// Implementations may cache their own indicator history between calls but
/// must not touch the ledger or the network.
pub trait Strategy: Send {
    fn name(&self) -> &str;

    /// Indicator fields every bar must carry.
    fn required_indicators(&self) -> Vec<String>;

    fn evaluate(
        &mut self,
        bar: &Bar,
        position: Option<&Position>,
        account: &AccountState,
    ) -> Result<Evaluation, StrategyError>;
}

// ─── Indicator reading ───────────────────────────────────────────────

/// Result of reading a set of required fields from a bar.
#[derive(Debug, Clone, PartialEq)]
pub enum Fields {
    Ready(Vec<f64>),
    Invalid(Evaluation),
}

/// Reads `names` from `bar` in order.
pub fn read_fields(strategy: &str, bar: &Bar, names: &[&str]) -> Result<Fields, StrategyError> {
    let mut values = Vec::with_capacity(names.len());
    for name in names {
        let value = bar
            .indicator(name)
            .ok_or_else(|| StrategyError::MissingIndicator {
                strategy: strategy.to_string(),
                field: (*name).to_string(),
            })?;
        if !value.is_finite() {
            return Ok(Fields::Invalid(Evaluation::InvalidValue {
                field: (*name).to_string(),
                rationale: Rationale::new(format!("invalid value for '{name}': {value}")),
            }));
        }
        values.push(value);
    }
    Ok(Fields::Ready(values))
}

/// Optional field: `Some` only when present and finite.
pub fn optional_field(bar: &Bar, name: &str) -> Option<f64> {
    bar.indicator(name).filter(|v| v.is_finite())
}

/// Bar prices must be usable before any variant looks at indicators.
pub(crate) fn check_prices(bar: &Bar) -> Option<Evaluation> {
    if bar.is_sane() {
        return None;
    }
    let field = if !bar.close.is_finite() || bar.close <= 0.0 {
        "close"
    } else {
        "ohlc"
    };
    Some(Evaluation::InvalidValue {
        field: field.to_string(),
        rationale: Rationale::new(format!("invalid bar prices at {}", bar.timestamp)),
    })
}

pub(crate) fn position_side(position: Option<&Position>) -> Option<PositionSide> {
    position.map(|p| p.side)
}

// ─── Param helpers ───────────────────────────────────────────────────

/// Extract a named f64 parameter, falling back to `default`.
pub(crate) fn param(params: &StrategyParams, name: &str, default: f64) -> f64 {
    params.get(name).copied().unwrap_or(default)
}

/// Extract a named usize parameter, falling back to `default`.
pub(crate) fn param_usize(params: &StrategyParams, name: &str, default: usize) -> usize {
    params
        .get(name)
        .copied()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v as usize)
        .unwrap_or(default)
}

pub(crate) fn param_bool(params: &StrategyParams, name: &str, default: bool) -> bool {
    params.get(name).map(|v| *v != 0.0).unwrap_or(default)
}

/// Simple mean over the last `n` values, `None` if fewer are available.
pub(crate) fn tail_mean(values: &[f64], n: usize) -> Option<f64> {
    if n == 0 || values.len() < n {
        return None;
    }
    let tail = &values[values.len() - n..];
    Some(tail.iter().sum::<f64>() / n as f64)
}


#[cfg(test)]
mod tests {
    use super::test_support::bar;
    use super::*;

    #[test]
    fn read_fields_missing_is_error() {
        let b = bar(0, 100.0).with_indicator("rsi", 40.0);
        let err = read_fields("macd_rsi", &b, &["rsi", "macd"]).unwrap_err();
        assert_eq!(
            err,
            StrategyError::MissingIndicator {
                strategy: "macd_rsi".into(),
                field: "macd".into()
            }
        );
    }

    #[test]
    fn read_fields_nan_is_invalid_value() {
        let b = bar(0, 100.0)
            .with_indicator("rsi", f64::NAN)
            .with_indicator("macd", 1.0);
        match read_fields("x", &b, &["macd", "rsi"]).unwrap() {
            Fields::Invalid(Evaluation::InvalidValue { field, .. }) => assert_eq!(field, "rsi"),
            other => panic!("expected invalid, got {other:?}"),
        }
    }

    #[test]
    fn recoverable_evaluations_collapse_to_hold() {
        let e = Evaluation::insufficient("warming up");
        assert_eq!(e.kind(), SignalKind::Hold);
        assert_eq!(e.signal().rationale.reason, "warming up");
    }

    #[test]
    fn tail_mean_needs_enough_values() {
        assert_eq!(tail_mean(&[1.0, 2.0], 3), None);
        assert_eq!(tail_mean(&[1.0, 2.0, 3.0, 4.0], 2), Some(3.5));
    }

    #[test]
    fn param_helpers_fall_back_to_defaults() {
        let mut p = StrategyParams::new();
        p.insert("period".into(), 30.0);
        assert_eq!(param_usize(&p, "period", 14), 30);
        assert_eq!(param_usize(&p, "missing", 14), 14);
        assert_eq!(param(&p, "missing", 0.5), 0.5);
        assert!(param_bool(&p, "missing", true));
    }
}
