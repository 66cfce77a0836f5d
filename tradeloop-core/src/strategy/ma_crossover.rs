//! Moving average crossover: golden cross and dead cross detection.
//!
//! Flat: a confirmed golden cross opens long, a confirmed dead cross opens short.
//! In a position: the opposing cross closes it on the crossing bar.

use super::{check_prices, position_side, read_fields, Evaluation, Fields, Strategy, StrategyError};
use crate::domain::{AccountState, Bar, Position, PositionSide, Rationale, SignalKind};
use tracing::debug;

/// Moving average type selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaType {
    Sma,
    Ema,
}

impl MaType {
    fn prefix(&self) -> &'static str {
        match self {
            MaType::Sma => "sma",
            MaType::Ema => "ema",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Regime {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    regime: Regime,
    /// The regime changed on this bar.
    fresh: bool,
    /// The regime has held exactly `confirmation_bars` bars since a cross.
    confirmed: bool,
}

/// Crossover signal over two precomputed moving averages.
///
/// # Indicator dependencies
/// - Fast: `{ma_type}_{fast_period}` (e.g., `sma_7`)
/// - Slow: `{ma_type}_{slow_period}` (e.g., `sma_25`)
///
/// Entries wait until the new regime has held for `confirmation_bars`
/// consecutive bars, counting the crossing bar. Exits do not wait.
#[derive(Debug, Clone)]
pub struct MaCrossover {
    pub fast_period: usize,
    pub slow_period: usize,
    pub ma_type: MaType,
    pub confirmation_bars: usize,
    fast_key: String,
    slow_key: String,
    regime: Option<Regime>,
    bars_in_regime: usize,
    crossed: bool,
}

impl MaCrossover {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        ma_type: MaType,
        confirmation_bars: usize,
    ) -> Self {
        let prefix = ma_type.prefix();
        Self {
            fast_period,
            slow_period,
            ma_type,
            confirmation_bars: confirmation_bars.max(1),
            fast_key: format!("{prefix}_{fast_period}"),
            slow_key: format!("{prefix}_{slow_period}"),
            regime: None,
            bars_in_regime: 0,
            crossed: false,
        }
    }

    pub fn default_params() -> Self {
        Self::new(7, 25, MaType::Sma, 1)
    }

    /// Advances the regime tracker. `None` until the lines first separate.
    fn observe(&mut self, fast: f64, slow: f64) -> Option<Observation> {
        let now = if fast > slow {
            Regime::Above
        } else if fast < slow {
            Regime::Below
        } else {
            // Touching lines keep the current regime.
            self.regime?
        };

        match self.regime {
            Some(prev) if prev == now => self.bars_in_regime += 1,
            Some(_) => {
                self.crossed = true;
                self.bars_in_regime = 1;
            }
            None => self.bars_in_regime = 1,
        }
        self.regime = Some(now);

        Some(Observation {
            regime: now,
            fresh: self.crossed && self.bars_in_regime == 1,
            confirmed: self.crossed && self.bars_in_regime == self.confirmation_bars,
        })
    }
}

impl Strategy for MaCrossover {
    fn name(&self) -> &str {
        "ma_crossover"
    }

    fn required_indicators(&self) -> Vec<String> {
        vec![self.fast_key.clone(), self.slow_key.clone()]
    }

    fn evaluate(
        &mut self,
        bar: &Bar,
        position: Option<&Position>,
        _account: &AccountState,
    ) -> Result<Evaluation, StrategyError> {
        if let Some(invalid) = check_prices(bar) {
            return Ok(invalid);
        }
        let values = match read_fields(self.name(), bar, &[&self.fast_key, &self.slow_key])? {
            Fields::Ready(v) => v,
            Fields::Invalid(eval) => return Ok(eval),
        };
        let (fast, slow) = (values[0], values[1]);

        let Some(obs) = self.observe(fast, slow) else {
            return Ok(Evaluation::hold("averages not separated yet"));
        };

        let rationale = |reason: &str| {
            Rationale::new(reason)
                .with(self.fast_key.clone(), fast)
                .with(self.slow_key.clone(), slow)
                .with("close", bar.close)
        };

        let decision = match (obs.regime, position_side(position)) {
            (Regime::Below, Some(PositionSide::Long)) if obs.fresh => {
                Evaluation::decided(SignalKind::CloseLong, rationale("dead cross exit"))
            }
            (Regime::Above, Some(PositionSide::Short)) if obs.fresh => {
                Evaluation::decided(SignalKind::CloseShort, rationale("golden cross exit"))
            }
            (Regime::Above, None) if obs.confirmed => {
                Evaluation::decided(SignalKind::Buy, rationale("golden cross"))
            }
            (Regime::Below, None) if obs.confirmed => {
                Evaluation::decided(SignalKind::Sell, rationale("dead cross"))
            }
            (_, Some(_)) => Evaluation::hold("no opposing cross"),
            (_, None) => Evaluation::hold("no confirmed cross"),
        };
        debug!(strategy = self.name(), kind = %decision.kind(), "crossover evaluated");
        Ok(decision)
    }
}
