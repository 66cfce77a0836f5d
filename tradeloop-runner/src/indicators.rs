//! Upstream indicator columns for bars that arrive without them.
//!
//! Strategies only read named fields from a bar. Feeds built from raw OHLCV
//! (synthetic walks, bare CSV files) call [`annotate`] to fill in the fields a
//! strategy requires. Names follow the `{kind}_{period}` convention; bare
//! `rsi` and `atr` use period 14, and `macd*` uses 12/26/9.
//!
//! Every column is NaN until its lookback is satisfied.

use thiserror::Error;
use tradeloop_core::domain::Bar;

#[derive(Debug, Error, PartialEq)]
pub enum IndicatorError {
    #[error("unknown indicator field '{0}'")]
    Unknown(String),
    #[error("invalid period in indicator field '{0}'")]
    InvalidPeriod(String),
}

const DEFAULT_PERIOD: usize = 14;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;

/// Computes each of `fields` over `bars` and stores it on every bar.
/// Fields already present on the first bar are left untouched.
pub fn annotate(bars: &mut [Bar], fields: &[String]) -> Result<(), IndicatorError> {
    for field in fields {
        if bars.first().is_some_and(|b| b.indicators.contains_key(field)) {
            continue;
        }
        let column = compute(field, bars)?;
        for (bar, value) in bars.iter_mut().zip(column) {
            bar.indicators.insert(field.clone(), value);
        }
    }
    Ok(())
}

/// Computes a single named column.
pub fn compute(field: &str, bars: &[Bar]) -> Result<Vec<f64>, IndicatorError> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let (kind, period) = parse(field)?;
    let column = match kind {
        "sma" => sma(&closes, period),
        "ema" => ema(&closes, period),
        "rsi" => rsi(&closes, period),
        "atr" => atr(bars, period),
        "donchian_upper" => rolling(bars, period, |b| b.high, f64::max),
        "donchian_lower" => rolling(bars, period, |b| b.low, f64::min),
        "macd" => macd(&closes).0,
        "macd_signal" => macd(&closes).1,
        "macd_histogram" => macd(&closes).2,
        _ => return Err(IndicatorError::Unknown(field.to_string())),
    };
    Ok(column)
}

fn parse(field: &str) -> Result<(&str, usize), IndicatorError> {
    match field {
        "rsi" | "atr" => return Ok((field, DEFAULT_PERIOD)),
        "macd" | "macd_signal" | "macd_histogram" => return Ok((field, 0)),
        _ => {}
    }
    let (kind, period) = field
        .rsplit_once('_')
        .ok_or_else(|| IndicatorError::Unknown(field.to_string()))?;
    let period: usize = period
        .parse()
        .map_err(|_| IndicatorError::Unknown(field.to_string()))?;
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod(field.to_string()));
    }
    Ok((kind, period))
}

// ─── Columns ─────────────────────────────────────────────────────────

fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if values.len() < period {
        return out;
    }
    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        out[i] = window.iter().sum::<f64>() / period as f64;
    }
    out
}

/// EMA seeded with the SMA of the first `period` finite values.
fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    let Some(start) = values.iter().position(|v| v.is_finite()) else {
        return out;
    };
    if values.len() < start + period {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed_end = start + period - 1;
    let mut prev = values[start..=seed_end].iter().sum::<f64>() / period as f64;
    out[seed_end] = prev;
    for i in (seed_end + 1)..values.len() {
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = prev;
    }
    out
}

/// Wilder RSI. avg_loss == 0 gives 100, avg_gain == 0 gives 0.
fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut out = vec![f64::NAN; n];
    if n < period + 1 {
        return out;
    }
    let mut gain = 0.0;
    let mut loss = 0.0;
    for i in 1..=period {
        let ch = closes[i] - closes[i - 1];
        if ch > 0.0 {
            gain += ch;
        } else {
            loss -= ch;
        }
    }
    gain /= period as f64;
    loss /= period as f64;
    out[period] = rsi_value(gain, loss);

    let p = period as f64;
    for i in (period + 1)..n {
        let ch = closes[i] - closes[i - 1];
        gain = (gain * (p - 1.0) + ch.max(0.0)) / p;
        loss = (loss * (p - 1.0) + (-ch).max(0.0)) / p;
        out[i] = rsi_value(gain, loss);
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// Wilder ATR over true range.
fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    let n = bars.len();
    let mut out = vec![f64::NAN; n];
    if n < period + 1 {
        return out;
    }
    let tr: Vec<f64> = (0..n)
        .map(|i| {
            let b = &bars[i];
            if i == 0 {
                return b.high - b.low;
            }
            let pc = bars[i - 1].close;
            (b.high - b.low).max((b.high - pc).abs()).max((b.low - pc).abs())
        })
        .collect();
    let mut prev = tr[1..=period].iter().sum::<f64>() / period as f64;
    out[period] = prev;
    let p = period as f64;
    for i in (period + 1)..n {
        prev = (prev * (p - 1.0) + tr[i]) / p;
        out[i] = prev;
    }
    out
}

fn rolling(
    bars: &[Bar],
    period: usize,
    field: impl Fn(&Bar) -> f64,
    fold: fn(f64, f64) -> f64,
) -> Vec<f64> {
    let mut out = vec![f64::NAN; bars.len()];
    if bars.len() < period {
        return out;
    }
    for i in (period - 1)..bars.len() {
        out[i] = bars[i + 1 - period..=i]
            .iter()
            .map(&field)
            .reduce(fold)
            .unwrap_or(f64::NAN);
    }
    out
}

/// (macd line, signal line, histogram).
fn macd(closes: &[f64]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let fast = ema(closes, MACD_FAST);
    let slow = ema(closes, MACD_SLOW);
    let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let signal = ema(&line, MACD_SIGNAL);
    let hist = line.iter().zip(&signal).map(|(l, s)| l - s).collect();
    (line, signal, hist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bars(closes: &[f64]) -> Vec<Bar> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new("T", t0 + Duration::hours(i as i64), c, c + 1.0, c - 1.0, c, 1.0))
            .collect()
    }

    #[test]
    fn sma_warms_up_then_averages() {
        let col = compute("sma_3", &bars(&[1.0, 2.0, 3.0, 4.0])).unwrap();
        assert!(col[0].is_nan() && col[1].is_nan());
        assert!((col[2] - 2.0).abs() < 1e-12);
        assert!((col[3] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn ema_seeds_with_sma() {
        let col = compute("ema_2", &bars(&[2.0, 4.0, 7.0])).unwrap();
        assert!(col[0].is_nan());
        assert!((col[1] - 3.0).abs() < 1e-12);
        // alpha = 2/3
        assert!((col[2] - (2.0 / 3.0 * 7.0 + 1.0 / 3.0 * 3.0)).abs() < 1e-12);
    }

    #[test]
    fn rsi_extremes() {
        let up = compute("rsi_3", &bars(&[1.0, 2.0, 3.0, 4.0, 5.0])).unwrap();
        assert_eq!(up[4], 100.0);
        let down = compute("rsi", &bars(&(0..20).map(|i| 100.0 - i as f64).collect::<Vec<_>>()))
            .unwrap();
        assert_eq!(down[19], 0.0);
    }

    #[test]
    fn donchian_tracks_window_extremes() {
        let b = bars(&[10.0, 12.0, 11.0, 9.0]);
        let upper = compute("donchian_upper_2", &b).unwrap();
        let lower = compute("donchian_lower_2", &b).unwrap();
        assert_eq!(upper[1], 13.0);
        assert_eq!(upper[3], 12.0);
        assert_eq!(lower[3], 8.0);
    }

    #[test]
    fn macd_histogram_is_line_minus_signal() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
        let b = bars(&closes);
        let line = compute("macd", &b).unwrap();
        let signal = compute("macd_signal", &b).unwrap();
        let hist = compute("macd_histogram", &b).unwrap();
        assert!(hist[20].is_nan());
        assert!((hist[59] - (line[59] - signal[59])).abs() < 1e-12);
    }

    #[test]
    fn annotate_fills_and_skips_existing() {
        let mut b = bars(&[1.0, 2.0, 3.0]);
        for bar in &mut b {
            bar.indicators.insert("sma_2".into(), -1.0);
        }
        annotate(&mut b, &["sma_2".into(), "atr_1".into()]).unwrap();
        assert_eq!(b[2].indicator("sma_2"), Some(-1.0));
        assert!(b[2].indicator("atr_1").is_some_and(|v| v.is_finite()));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let b = bars(&[1.0]);
        assert_eq!(
            compute("vwap", &b),
            Err(IndicatorError::Unknown("vwap".into()))
        );
        assert_eq!(
            compute("sma_0", &b),
            Err(IndicatorError::InvalidPeriod("sma_0".into()))
        );
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn arb_closes() -> impl Strategy<Value = Vec<f64>> {
            prop::collection::vec(1.0f64..1_000.0, 2..120)
        }

        proptest! {
            #[test]
            fn rsi_stays_in_range(closes in arb_closes(), period in 2usize..20) {
                let col = compute(&format!("rsi_{period}"), &bars(&closes)).unwrap();
                for v in col.into_iter().filter(|v| !v.is_nan()) {
                    prop_assert!((0.0..=100.0).contains(&v));
                }
            }

            #[test]
            fn sma_is_bounded_by_window(closes in arb_closes(), period in 1usize..20) {
                let col = compute(&format!("sma_{period}"), &bars(&closes)).unwrap();
                for (i, v) in col.iter().enumerate().filter(|(_, v)| !v.is_nan()) {
                    let window = &closes[i + 1 - period..=i];
                    let lo = window.iter().cloned().fold(f64::INFINITY, f64::min);
                    let hi = window.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                    prop_assert!(*v >= lo - 1e-9 && *v <= hi + 1e-9);
                }
            }

            #[test]
            fn donchian_upper_never_below_lower(closes in arb_closes(), period in 1usize..20) {
                let b = bars(&closes);
                let upper = compute(&format!("donchian_upper_{period}"), &b).unwrap();
                let lower = compute(&format!("donchian_lower_{period}"), &b).unwrap();
                for (u, l) in upper.iter().zip(&lower).filter(|(u, _)| !u.is_nan()) {
                    prop_assert!(u >= l);
                }
            }
        }
    }
}
