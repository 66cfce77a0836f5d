//! Performance metrics: pure functions over pnl lists and equity curves.

/// Per-bar simple returns. Steps from a non-positive equity are skipped.
pub fn bar_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// Annualized Sharpe ratio (risk-free rate 0).
///
/// Sharpe = mean(returns) / std(returns) × √bars_per_year, with the sample
/// standard deviation. `None` for fewer than two returns or zero deviation.
pub fn sharpe_ratio(equity_curve: &[f64], bars_per_year: f64) -> Option<f64> {
    let returns = bar_returns(equity_curve);
    if returns.len() < 2 {
        return None;
    }
    let std = std_dev(&returns);
    if std < 1e-15 {
        return None;
    }
    Some(mean_f64(&returns) / std * bars_per_year.max(0.0).sqrt())
}

/// Gross profit over gross loss.
///
/// +∞ when there are profits but no losses, 0 when there are neither.
pub fn profit_factor(pnls: &[f64]) -> f64 {
    let gross_profit: f64 = pnls.iter().filter(|p| **p > 0.0).sum();
    let gross_loss: f64 = pnls.iter().filter(|p| **p < 0.0).map(|p| p.abs()).sum();
    if gross_loss == 0.0 {
        return if gross_profit > 0.0 { f64::INFINITY } else { 0.0 };
    }
    gross_profit / gross_loss
}

pub fn win_rate(pnls: &[f64]) -> f64 {
    if pnls.is_empty() {
        return 0.0;
    }
    pnls.iter().filter(|p| **p > 0.0).count() as f64 / pnls.len() as f64
}

/// Longest run of non-winning trades.
pub fn max_consecutive_losses(pnls: &[f64]) -> usize {
    let mut max_streak = 0;
    let mut current = 0;
    for &p in pnls {
        if p > 0.0 {
            current = 0;
        } else {
            current += 1;
            max_streak = max_streak.max(current);
        }
    }
    max_streak
}

/// Return of buying at the first price and selling at the last, paying
/// `fee_rate` on both legs.
pub fn buy_and_hold_return(first_price: f64, last_price: f64, fee_rate: f64) -> f64 {
    if !(first_price > 0.0 && last_price.is_finite()) {
        return 0.0;
    }
    let keep = 1.0 - fee_rate.max(0.0);
    let quantity = keep / first_price;
    quantity * last_price * keep - 1.0
}

// ─── Helpers ─────────────────────────────────────────────────────────

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n − 1).
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean_f64(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sharpe_constant_equity_is_none() {
        assert_eq!(sharpe_ratio(&[100.0; 10], 252.0), None);
    }

    #[test]
    fn sharpe_single_return_is_none() {
        assert_eq!(sharpe_ratio(&[100.0, 101.0], 252.0), None);
    }

    #[test]
    fn sharpe_known_returns() {
        // +10%, -5%, +10%: mean 0.05, sample std 0.0866...
        let curve = [100.0, 110.0, 104.5, 114.95];
        let s = sharpe_ratio(&curve, 1.0).unwrap();
        let expected = 0.05 / (0.0075_f64).sqrt();
        assert!((s - expected).abs() < 1e-9, "got {s}");
        let annual = sharpe_ratio(&curve, 4.0).unwrap();
        assert!((annual - 2.0 * s).abs() < 1e-9);
    }

    #[test]
    fn profit_factor_edges() {
        assert_eq!(profit_factor(&[]), 0.0);
        assert_eq!(profit_factor(&[0.0, 0.0]), 0.0);
        assert_eq!(profit_factor(&[5.0, 1.0]), f64::INFINITY);
        assert!((profit_factor(&[30.0, -10.0, -5.0]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn streaks_and_win_rate() {
        let pnls = [1.0, -1.0, -2.0, 0.0, 3.0, -1.0];
        assert_eq!(max_consecutive_losses(&pnls), 3);
        assert!((win_rate(&pnls) - 2.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn buy_and_hold_pays_fees_both_ways() {
        let r = buy_and_hold_return(100.0, 110.0, 0.0);
        assert!((r - 0.10).abs() < 1e-12);
        let with_fees = buy_and_hold_return(100.0, 110.0, 0.001);
        assert!((with_fees - (0.999 * 0.999 * 1.1 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn std_dev_is_sample() {
        assert!((std_dev(&[1.0, 3.0]) - 2.0_f64.sqrt()).abs() < 1e-12);
    }
}
