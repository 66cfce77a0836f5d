//! Fee and slippage model shared by the simulated executor and paper gateway.

use crate::domain::{Bar, Intent, IntentOrigin, Liquidity, OrderSide};
use serde::{Deserialize, Serialize};

/// Price an intent is filled against before slippage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePrice {
    #[default]
    Close,
    Open,
    Typical,
}

impl ReferencePrice {
    pub fn of(self, bar: &Bar) -> f64 {
        match self {
            ReferencePrice::Close => bar.close,
            ReferencePrice::Open => bar.open,
            ReferencePrice::Typical => bar.typical_price(),
        }
    }
}

/// Modeled difference between the reference and the realized price.
///
/// Always adverse: buys fill higher, sells lower.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SlippageModel {
    /// Fraction of the reference price (0.0001 = 1 bp).
    Percentage(f64),
    /// Absolute price offset.
    Fixed(f64),
}

impl Default for SlippageModel {
    fn default() -> Self {
        SlippageModel::Percentage(0.0001)
    }
}

impl SlippageModel {
    /// Non-negative slippage in price units at `price`.
    pub fn offset(self, price: f64) -> f64 {
        let raw = match self {
            SlippageModel::Percentage(pct) => price * pct,
            SlippageModel::Fixed(amount) => amount,
        };
        raw.max(0.0)
    }

    pub fn apply(self, price: f64, side: OrderSide) -> f64 {
        price + side.sign() * self.offset(price)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub maker_fee: f64,
    pub taker_fee: f64,
    pub slippage: SlippageModel,
    pub reference_price: ReferencePrice,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            maker_fee: 0.0005,
            taker_fee: 0.0009,
            slippage: SlippageModel::default(),
            reference_price: ReferencePrice::Close,
        }
    }
}

impl ExecutionConfig {
    /// Opening intents rest on the book and pay the maker rate; closes cross
    /// the spread and pay taker.
    pub fn liquidity_for(&self, intent: &Intent) -> Liquidity {
        if intent.is_open() {
            Liquidity::Maker
        } else {
            Liquidity::Taker
        }
    }

    pub fn fee_rate(&self, liquidity: Liquidity) -> f64 {
        let rate = match liquidity {
            Liquidity::Maker => self.maker_fee,
            Liquidity::Taker => self.taker_fee,
        };
        rate.max(0.0)
    }

    pub fn fee(&self, liquidity: Liquidity, notional: f64) -> f64 {
        (notional.abs() * self.fee_rate(liquidity)).max(0.0)
    }

    /// Fill price before fees. Protective exits fill at their trigger level,
    /// everything else at the configured reference price; both pay slippage.
    pub fn fill_price(&self, intent: &Intent, bar: &Bar) -> f64 {
        let reference = match (intent.origin, intent.trigger_price) {
            (IntentOrigin::StopLoss | IntentOrigin::TakeProfit, Some(level)) => level,
            _ => self.reference_price.of(bar),
        };
        self.slippage.apply(reference, intent.side())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IntentAction, PositionSide, Protection, Rationale};
    use chrono::{TimeZone, Utc};

    fn bar() -> Bar {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Bar::new("BTC_JPY", ts, 99.0, 104.0, 96.0, 100.0, 1.0)
    }

    fn intent(action: IntentAction, origin: IntentOrigin, trigger: Option<f64>) -> Intent {
        Intent {
            symbol: "BTC_JPY".into(),
            action,
            quantity: 1.0,
            trigger_price: trigger,
            protection: Protection::default(),
            origin,
            created_at: bar().timestamp,
            rationale: Rationale::new("t"),
        }
    }

    #[test]
    fn slippage_is_adverse_for_both_sides() {
        let pct = SlippageModel::Percentage(0.01);
        assert!((pct.apply(100.0, OrderSide::Buy) - 101.0).abs() < 1e-12);
        assert!((pct.apply(100.0, OrderSide::Sell) - 99.0).abs() < 1e-12);
        let fixed = SlippageModel::Fixed(100.0);
        assert_eq!(fixed.apply(5_000_000.0, OrderSide::Buy), 5_000_100.0);
    }

    #[test]
    fn negative_slippage_is_clamped() {
        assert_eq!(SlippageModel::Fixed(-5.0).apply(100.0, OrderSide::Buy), 100.0);
    }

    #[test]
    fn reference_price_variants() {
        let b = bar();
        assert_eq!(ReferencePrice::Close.of(&b), 100.0);
        assert_eq!(ReferencePrice::Open.of(&b), 99.0);
        assert!((ReferencePrice::Typical.of(&b) - 100.0).abs() < 1e-12);
    }

    #[test]
    fn protective_exit_fills_at_trigger_level() {
        let cfg = ExecutionConfig {
            slippage: SlippageModel::Fixed(0.0),
            ..ExecutionConfig::default()
        };
        let stop = intent(
            IntentAction::Close(PositionSide::Long),
            IntentOrigin::StopLoss,
            Some(97.0),
        );
        assert_eq!(cfg.fill_price(&stop, &bar()), 97.0);
        let signal_close = intent(
            IntentAction::Close(PositionSide::Long),
            IntentOrigin::Signal,
            None,
        );
        assert_eq!(cfg.fill_price(&signal_close, &bar()), 100.0);
    }

    #[test]
    fn opens_pay_maker_and_closes_pay_taker() {
        let cfg = ExecutionConfig::default();
        let open = intent(IntentAction::Open(PositionSide::Long), IntentOrigin::Signal, None);
        let close = intent(IntentAction::Close(PositionSide::Long), IntentOrigin::Signal, None);
        assert_eq!(cfg.liquidity_for(&open), Liquidity::Maker);
        assert_eq!(cfg.liquidity_for(&close), Liquidity::Taker);
        assert!((cfg.fee(Liquidity::Maker, 20_000.0) - 10.0).abs() < 1e-9);
        assert!((cfg.fee(Liquidity::Taker, 20_000.0) - 18.0).abs() < 1e-9);
    }

    #[test]
    fn config_deserializes_from_toml_shape() {
        let json = r#"{"maker_fee":0.0,"slippage":{"type":"fixed","value":100.0},"reference_price":"typical"}"#;
        let cfg: ExecutionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.maker_fee, 0.0);
        assert_eq!(cfg.taker_fee, 0.0009);
        assert_eq!(cfg.slippage, SlippageModel::Fixed(100.0));
        assert_eq!(cfg.reference_price, ReferencePrice::Typical);
    }
}
