//! MACD + RSI oscillator-threshold strategy.
//!
//! Entries need RSI near an extreme together with a MACD histogram sign flip.
//! Exits take profit at the opposite RSI extreme or cut when the histogram
//! moves against the position by more than twice the MACD threshold.

use super::{check_prices, read_fields, Evaluation, Fields, Strategy, StrategyError};
use crate::domain::{AccountState, Bar, Position, PositionSide, Rationale, SignalKind};

#[derive(Debug, Clone)]
pub struct MacdRsi {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub macd_threshold: f64,
    prev_histogram: Option<f64>,
}

impl MacdRsi {
    const FIELDS: [&'static str; 4] = ["macd", "macd_signal", "macd_histogram", "rsi"];

    pub fn new(rsi_oversold: f64, rsi_overbought: f64, macd_threshold: f64) -> Self {
        Self {
            rsi_oversold,
            rsi_overbought,
            macd_threshold,
            prev_histogram: None,
        }
    }

    pub fn default_params() -> Self {
        Self::new(30.0, 70.0, 0.0)
    }

    fn entry(&self, macd: f64, hist: f64, prev: f64, rsi: f64) -> Option<(SignalKind, &'static str)> {
        if rsi < self.rsi_oversold + 10.0 && prev <= 0.0 && hist > 0.0 && macd > self.macd_threshold {
            return Some((SignalKind::Buy, "rsi oversold, histogram turned positive"));
        }
        if rsi > self.rsi_overbought - 10.0
            && prev >= 0.0
            && hist < 0.0
            && macd < -self.macd_threshold
        {
            return Some((SignalKind::Sell, "rsi overbought, histogram turned negative"));
        }
        None
    }

    fn exit(&self, side: PositionSide, hist: f64, rsi: f64) -> Option<(SignalKind, &'static str)> {
        let cut = self.macd_threshold.abs() * 2.0;
        match side {
            PositionSide::Long if rsi >= self.rsi_overbought => {
                Some((SignalKind::CloseLong, "rsi overbought take-profit"))
            }
            PositionSide::Long if hist < -cut => {
                Some((SignalKind::CloseLong, "histogram deteriorated"))
            }
            PositionSide::Short if rsi <= self.rsi_oversold => {
                Some((SignalKind::CloseShort, "rsi oversold take-profit"))
            }
            PositionSide::Short if hist > cut => {
                Some((SignalKind::CloseShort, "histogram deteriorated"))
            }
            _ => None,
        }
    }
}

impl Strategy for MacdRsi {
    fn name(&self) -> &str {
        "macd_rsi"
    }

    fn required_indicators(&self) -> Vec<String> {
        Self::FIELDS.iter().map(|s| s.to_string()).collect()
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
        let v = match read_fields(self.name(), bar, &Self::FIELDS)? {
            Fields::Ready(v) => v,
            Fields::Invalid(eval) => return Ok(eval),
        };
        let (macd, signal_line, hist, rsi) = (v[0], v[1], v[2], v[3]);
        let prev = self.prev_histogram.replace(hist);

        let rationale = |reason: &str| {
            Rationale::new(reason)
                .with("macd", macd)
                .with("macd_signal", signal_line)
                .with("macd_histogram", hist)
                .with("rsi", rsi)
                .with("close", bar.close)
        };

        let decision = match position {
            Some(pos) => self
                .exit(pos.side, hist, rsi)
                .map(|(kind, reason)| Evaluation::decided(kind, rationale(reason)))
                .unwrap_or_else(|| Evaluation::hold("no exit condition")),
            None => {
                let Some(prev) = prev else {
                    return Ok(Evaluation::insufficient("no previous histogram value"));
                };
                self.entry(macd, hist, prev, rsi)
                    .map(|(kind, reason)| Evaluation::decided(kind, rationale(reason)))
                    .unwrap_or_else(|| Evaluation::hold("no entry condition"))
            }
        };
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{account, bar, position};
    use super::*;

    fn osc_bar(i: i64, macd: f64, hist: f64, rsi: f64) -> Bar {
        bar(i, 5_000_000.0)
            .with_indicator("macd", macd)
            .with_indicator("macd_signal", macd - hist)
            .with_indicator("macd_histogram", hist)
            .with_indicator("rsi", rsi)
    }

    #[test]
    fn first_bar_is_insufficient_data() {
        let mut s = MacdRsi::default_params();
        let e = s.evaluate(&osc_bar(0, 1.0, 0.5, 35.0), None, &account()).unwrap();
        assert!(matches!(e, Evaluation::InsufficientData { .. }));
    }

    #[test]
    fn histogram_flip_near_oversold_buys() {
        let mut s = MacdRsi::default_params();
        let acct = account();
        s.evaluate(&osc_bar(0, 0.5, -0.2, 35.0), None, &acct).unwrap();
        let e = s.evaluate(&osc_bar(1, 1.0, 0.3, 35.0), None, &acct).unwrap();
        assert_eq!(e.kind(), SignalKind::Buy);
        assert_eq!(e.signal().rationale.values["rsi"], 35.0);
    }

    #[test]
    fn histogram_flip_near_overbought_sells() {
        let mut s = MacdRsi::default_params();
        let acct = account();
        s.evaluate(&osc_bar(0, -0.5, 0.2, 65.0), None, &acct).unwrap();
        let e = s.evaluate(&osc_bar(1, -1.0, -0.3, 65.0), None, &acct).unwrap();
        assert_eq!(e.kind(), SignalKind::Sell);
    }

    #[test]
    fn long_closes_at_overbought() {
        let mut s = MacdRsi::default_params();
        let long = position(PositionSide::Long, 100.0);
        let e = s
            .evaluate(&osc_bar(0, 1.0, 0.1, 75.0), Some(&long), &account())
            .unwrap();
        assert_eq!(e.kind(), SignalKind::CloseLong);
    }

    #[test]
    fn nan_rsi_degrades_to_hold() {
        let mut s = MacdRsi::default_params();
        let e = s
            .evaluate(&osc_bar(0, 1.0, 0.1, f64::NAN), None, &account())
            .unwrap();
        assert_eq!(e.kind(), SignalKind::Hold);
        assert!(e.signal().rationale.reason.contains("rsi"));
    }
}
