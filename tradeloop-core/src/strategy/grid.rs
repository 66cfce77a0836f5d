//! Grid trading.
//!
//! Lays `grid_count` levels around a centre price: the lower half are buy
//! levels, the upper half sell levels. A level fires once, when the close
//! crosses it. The grid is rebuilt when price drifts more than
//! `rebalance_threshold` percent from the centre.

use super::{check_prices, optional_field, Evaluation, Strategy, StrategyError};
use crate::domain::{AccountState, Bar, Position, PositionSide, Rationale, SignalKind};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LevelSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct GridLevel {
    price: f64,
    side: LevelSide,
    filled: bool,
}

#[derive(Debug, Clone)]
pub struct GridTrading {
    pub grid_count: usize,
    pub grid_spacing_pct: f64,
    pub rebalance_threshold_pct: f64,
    pub volatility_adjustment: bool,
    levels: Vec<GridLevel>,
    center: Option<f64>,
    prev_close: Option<f64>,
}

impl GridTrading {
    pub fn new(
        grid_count: usize,
        grid_spacing_pct: f64,
        rebalance_threshold_pct: f64,
        volatility_adjustment: bool,
    ) -> Self {
        Self {
            grid_count: grid_count.max(2),
            grid_spacing_pct,
            rebalance_threshold_pct,
            volatility_adjustment,
            levels: Vec::new(),
            center: None,
            prev_close: None,
        }
    }

    pub fn default_params() -> Self {
        Self::new(10, 1.0, 5.0, true)
    }

    fn rebuild(&mut self, price: f64, atr: Option<f64>) -> f64 {
        let mut spacing = self.grid_spacing_pct;
        if self.volatility_adjustment {
            if let Some(atr) = atr {
                let vol_pct = atr / price * 100.0;
                spacing *= 1.0 + vol_pct * 0.5;
            }
        }
        let half = self.grid_count / 2;
        self.levels.clear();
        for i in 1..=half {
            let step = spacing * i as f64 / 100.0;
            self.levels.push(GridLevel {
                price: price * (1.0 + step),
                side: LevelSide::Sell,
                filled: false,
            });
            self.levels.push(GridLevel {
                price: price * (1.0 - step),
                side: LevelSide::Buy,
                filled: false,
            });
        }
        self.levels.sort_by(|a, b| a.price.total_cmp(&b.price));
        self.center = Some(price);
        spacing
    }

    fn needs_rebalance(&self, price: f64) -> bool {
        match self.center {
            None => true,
            Some(center) => ((price - center) / center).abs() * 100.0 > self.rebalance_threshold_pct,
        }
    }

    /// Index of the unfilled level crossed between `prev` and `price`, closest to `price`.
    fn triggered(&self, prev: f64, price: f64) -> Option<usize> {
        self.levels
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.filled)
            .filter(|(_, l)| match l.side {
                LevelSide::Buy => prev > l.price && l.price >= price,
                LevelSide::Sell => prev < l.price && l.price <= price,
            })
            .min_by(|(_, a), (_, b)| (a.price - price).abs().total_cmp(&(b.price - price).abs()))
            .map(|(i, _)| i)
    }
}

impl Strategy for GridTrading {
    fn name(&self) -> &str {
        "grid"
    }

    fn required_indicators(&self) -> Vec<String> {
        Vec::new()
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
        let price = bar.close;
        let Some(prev) = self.prev_close.replace(price) else {
            return Ok(Evaluation::insufficient("no previous close"));
        };

        if self.levels.is_empty() || self.needs_rebalance(price) {
            let spacing = self.rebuild(price, optional_field(bar, "atr"));
            debug!(center = price, spacing_pct = spacing, "grid rebuilt");
            return Ok(Evaluation::decided(
                SignalKind::Hold,
                Rationale::new("grid initialized")
                    .with("center", price)
                    .with("spacing_pct", spacing),
            ));
        }

        let Some(idx) = self.triggered(prev, price) else {
            return Ok(Evaluation::hold("no grid level crossed"));
        };
        let level = self.levels[idx];

        let kind = match (level.side, position.map(|p| p.side)) {
            (LevelSide::Buy, None) => SignalKind::Buy,
            (LevelSide::Buy, Some(PositionSide::Short)) => SignalKind::CloseShort,
            (LevelSide::Sell, None) => SignalKind::Sell,
            (LevelSide::Sell, Some(PositionSide::Long)) => SignalKind::CloseLong,
            _ => return Ok(Evaluation::hold("grid level agrees with open position")),
        };
        self.levels[idx].filled = true;
        let filled = self.levels.iter().filter(|l| l.filled).count();

        Ok(Evaluation::decided(
            kind,
            Rationale::new("grid level crossed")
                .with("grid_price", level.price)
                .with("close", price)
                .with("filled_levels", filled as f64)
                .with("total_levels", self.levels.len() as f64),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{account, bar, position};
    use super::*;

    #[test]
    fn grid_initializes_then_buys_on_downward_cross() {
        let mut g = GridTrading::new(10, 1.0, 5.0, false);
        let acct = account();
        assert!(matches!(
            g.evaluate(&bar(0, 100.0), None, &acct).unwrap(),
            Evaluation::InsufficientData { .. }
        ));
        let init = g.evaluate(&bar(1, 100.0), None, &acct).unwrap();
        assert_eq!(init.signal().rationale.reason, "grid initialized");
        assert_eq!(g.levels.len(), 10);

        let e = g.evaluate(&bar(2, 98.9), None, &acct).unwrap();
        assert_eq!(e.kind(), SignalKind::Buy);
        // Only the 99.0 level lies between 100.0 and 98.9.
        assert!((e.signal().rationale.values["grid_price"] - 99.0).abs() < 1e-9);
    }

    #[test]
    fn sell_level_closes_long() {
        let mut g = GridTrading::new(10, 1.0, 5.0, false);
        let acct = account();
        let long = position(PositionSide::Long, 100.0);
        g.evaluate(&bar(0, 100.0), Some(&long), &acct).unwrap();
        g.evaluate(&bar(1, 100.0), Some(&long), &acct).unwrap();
        let e = g.evaluate(&bar(2, 101.5), Some(&long), &acct).unwrap();
        assert_eq!(e.kind(), SignalKind::CloseLong);
    }

    #[test]
    fn level_fires_once() {
        let mut g = GridTrading::new(10, 1.0, 5.0, false);
        let acct = account();
        g.evaluate(&bar(0, 100.0), None, &acct).unwrap();
        g.evaluate(&bar(1, 100.0), None, &acct).unwrap();
        assert_eq!(g.evaluate(&bar(2, 98.9), None, &acct).unwrap().kind(), SignalKind::Buy);
        g.evaluate(&bar(3, 99.5), None, &acct).unwrap();
        // 99.0 level already used; crossing it again does nothing.
        assert_eq!(g.evaluate(&bar(4, 98.95), None, &acct).unwrap().kind(), SignalKind::Hold);
    }

    #[test]
    fn drift_beyond_threshold_rebuilds() {
        let mut g = GridTrading::new(10, 1.0, 5.0, false);
        let acct = account();
        g.evaluate(&bar(0, 100.0), None, &acct).unwrap();
        g.evaluate(&bar(1, 100.0), None, &acct).unwrap();
        let e = g.evaluate(&bar(2, 110.0), None, &acct).unwrap();
        assert_eq!(e.signal().rationale.reason, "grid initialized");
        assert_eq!(g.center, Some(110.0));
    }

    #[test]
    fn atr_widens_spacing() {
        let mut g = GridTrading::default_params();
        let spacing = g.rebuild(100.0, Some(2.0));
        assert!((spacing - 2.0).abs() < 1e-12);
    }
}
