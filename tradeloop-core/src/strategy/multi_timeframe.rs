//! Multi-timeframe trend + momentum.
//!
//! The higher-timeframe trend comes from a [`Resampler`] this strategy owns and
//! feeds incrementally with every primary bar; entry timing comes from the
//! primary bar's RSI. Until enough resampled bars exist for the trend average
//! the strategy reports insufficient data.

use super::{check_prices, read_fields, tail_mean, Evaluation, Fields, Strategy, StrategyError};
use crate::domain::{AccountState, Bar, Position, PositionSide, Rationale, SignalKind};
use crate::feed::{MarketFeed, Resampler};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    StrongUp,
    Up,
    Range,
    Down,
    StrongDown,
}

impl Trend {
    fn is_up(self) -> bool {
        matches!(self, Trend::StrongUp | Trend::Up)
    }

    fn is_down(self) -> bool {
        matches!(self, Trend::StrongDown | Trend::Down)
    }

    fn code(self) -> f64 {
        match self {
            Trend::StrongUp => 2.0,
            Trend::Up => 1.0,
            Trend::Range => 0.0,
            Trend::Down => -1.0,
            Trend::StrongDown => -2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendReading {
    pub trend: Trend,
    pub strength: f64,
}

/// Classifies the trend of a close series using fast/slow/trend averages.
pub fn classify_trend(closes: &[f64], fast: usize, slow: usize, trend: usize) -> Option<TrendReading> {
    let last = *closes.last()?;
    let ma_fast = tail_mean(closes, fast)?;
    let ma_slow = tail_mean(closes, slow)?;
    let ma_trend = tail_mean(closes, trend)?;

    let reading = if ma_fast > ma_slow && ma_slow > ma_trend && last > ma_trend {
        TrendReading {
            trend: Trend::StrongUp,
            strength: ((last - ma_trend) / ma_trend).min(1.0),
        }
    } else if ma_fast > ma_slow && last > ma_slow {
        TrendReading {
            trend: Trend::Up,
            strength: ((last - ma_slow) / ma_slow).min(0.7),
        }
    } else if ma_fast < ma_slow && ma_slow < ma_trend && last < ma_trend {
        TrendReading {
            trend: Trend::StrongDown,
            strength: ((ma_trend - last) / ma_trend).min(1.0),
        }
    } else if ma_fast < ma_slow && last < ma_slow {
        TrendReading {
            trend: Trend::Down,
            strength: ((ma_slow - last) / ma_slow).min(0.7),
        }
    } else {
        TrendReading {
            trend: Trend::Range,
            strength: 0.3,
        }
    };
    Some(reading)
}

#[derive(Debug, Clone)]
pub struct MultiTimeframe {
    pub tf_minutes: i64,
    pub ma_fast: usize,
    pub ma_slow: usize,
    pub ma_trend: usize,
    pub min_trend_strength: f64,
    resampler: Resampler,
    closes: VecDeque<f64>,
}

impl MultiTimeframe {
    pub fn new(
        tf_minutes: i64,
        ma_fast: usize,
        ma_slow: usize,
        ma_trend: usize,
        min_trend_strength: f64,
    ) -> Self {
        Self {
            tf_minutes,
            ma_fast,
            ma_slow,
            ma_trend,
            min_trend_strength,
            resampler: Resampler::minutes(tf_minutes),
            closes: VecDeque::with_capacity(ma_trend + 1),
        }
    }

    pub fn default_params() -> Self {
        Self::new(240, 20, 50, 200, 0.3)
    }

    fn history_needed(&self) -> usize {
        self.ma_fast.max(self.ma_slow).max(self.ma_trend)
    }

    fn absorb(&mut self, bar: &Bar) {
        self.resampler.push(bar);
        while let Ok(Some(higher)) = self.resampler.next_bar() {
            self.closes.push_back(higher.close);
            if self.closes.len() > self.history_needed() {
                self.closes.pop_front();
            }
        }
    }
}

impl Strategy for MultiTimeframe {
    fn name(&self) -> &str {
        "multi_timeframe"
    }

    fn required_indicators(&self) -> Vec<String> {
        vec!["rsi".to_string()]
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
        self.absorb(bar);

        let rsi = match read_fields(self.name(), bar, &["rsi"])? {
            Fields::Ready(v) => v[0],
            Fields::Invalid(eval) => return Ok(eval),
        };

        let closes: Vec<f64> = self.closes.iter().copied().collect();
        let Some(reading) = classify_trend(&closes, self.ma_fast, self.ma_slow, self.ma_trend)
        else {
            return Ok(Evaluation::InsufficientData {
                rationale: Rationale::new("insufficient resampled history")
                    .with("resampled_bars", closes.len() as f64)
                    .with("needed", self.history_needed() as f64),
            });
        };

        let rationale = |reason: &str| {
            Rationale::new(reason)
                .with("rsi", rsi)
                .with("trend", reading.trend.code())
                .with("trend_strength", reading.strength)
                .with("close", bar.close)
        };

        let decision = match position.map(|p| p.side) {
            Some(PositionSide::Long) if reading.trend.is_down() || rsi > 80.0 => {
                Evaluation::decided(SignalKind::CloseLong, rationale("higher timeframe turned down"))
            }
            Some(PositionSide::Short) if reading.trend.is_up() || rsi < 20.0 => {
                Evaluation::decided(SignalKind::CloseShort, rationale("higher timeframe turned up"))
            }
            Some(_) => Evaluation::hold("trend supports open position"),
            None => {
                let strong_enough = reading.strength >= self.min_trend_strength;
                if strong_enough && !reading.trend.is_down() && rsi < 40.0 {
                    Evaluation::decided(SignalKind::Buy, rationale("pullback in uptrend"))
                } else if strong_enough && !reading.trend.is_up() && rsi > 60.0 {
                    Evaluation::decided(SignalKind::Sell, rationale("rally in downtrend"))
                } else {
                    Evaluation::hold("no aligned entry")
                }
            }
        };
        Ok(decision)
    }
}
