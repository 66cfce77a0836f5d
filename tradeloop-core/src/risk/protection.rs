//! Stop-loss / take-profit computation and trigger detection.

use super::config::{StopLossPolicy, TakeProfitPolicy};
use crate::domain::{Bar, Position, PositionSide};

/// Rounds `price` to the nearest multiple of `tick`. Non-positive ticks are ignored.
pub fn round_to_tick(price: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return price;
    }
    (price / tick).round() * tick
}

/// Stop-loss price for a new position entered at `entry`.
///
/// Returns `None` when the policy is disabled, the ATR field is missing or
/// undefined, or the stop would land at or below zero.
pub fn stop_loss_price(
    policy: &StopLossPolicy,
    side: PositionSide,
    entry: f64,
    bar: &Bar,
    tick: f64,
) -> Option<f64> {
    let distance = match policy {
        StopLossPolicy::None => return None,
        StopLossPolicy::Percentage { pct } => entry * pct,
        StopLossPolicy::Atr { multiplier, field } => {
            let atr = bar.indicator(field).filter(|v| v.is_finite() && *v > 0.0)?;
            atr * multiplier
        }
        StopLossPolicy::FixedAmount { amount } => *amount,
    };
    let stop = entry - side.sign() * distance;
    let stop = round_to_tick(stop, tick);
    (stop.is_finite() && stop > 0.0).then_some(stop)
}

/// Take-profit price for a new position entered at `entry`.
///
/// The risk/reward policy needs a stop; without one it yields `None`.
pub fn take_profit_price(
    policy: &TakeProfitPolicy,
    side: PositionSide,
    entry: f64,
    stop: Option<f64>,
    tick: f64,
) -> Option<f64> {
    let distance = match policy {
        TakeProfitPolicy::None => return None,
        TakeProfitPolicy::Percentage { pct } => entry * pct,
        TakeProfitPolicy::RiskReward { ratio } => (entry - stop?).abs() * ratio,
        TakeProfitPolicy::FixedAmount { amount } => *amount,
    };
    let take = round_to_tick(entry + side.sign() * distance, tick);
    (take.is_finite() && take > 0.0).then_some(take)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProtectiveTrigger {
    StopLoss(f64),
    TakeProfit(f64),
}

impl ProtectiveTrigger {
    pub fn level(self) -> f64 {
        match self {
            ProtectiveTrigger::StopLoss(p) | ProtectiveTrigger::TakeProfit(p) => p,
        }
    }
}

/// Checks the bar's range against the position's protective levels.
///
/// When both levels are inside the bar's range the stop wins.
pub fn check_triggers(position: &Position, bar: &Bar) -> Option<ProtectiveTrigger> {
    let protection = position.protection;
    let stop_hit = protection.stop_loss.filter(|&stop| match position.side {
        PositionSide::Long => bar.low <= stop,
        PositionSide::Short => bar.high >= stop,
    });
    if let Some(stop) = stop_hit {
        return Some(ProtectiveTrigger::StopLoss(stop));
    }
    protection
        .take_profit
        .filter(|&take| match position.side {
            PositionSide::Long => bar.high >= take,
            PositionSide::Short => bar.low <= take,
        })
        .map(ProtectiveTrigger::TakeProfit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Protection;
    use chrono::{TimeZone, Utc};

    fn bar(low: f64, high: f64) -> Bar {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Bar::new("BTC_JPY", ts, (low + high) / 2.0, high, low, (low + high) / 2.0, 1.0)
            .with_indicator("atr", 100.0)
    }

    fn long_with(stop: f64, take: f64) -> Position {
        Position {
            symbol: "BTC_JPY".into(),
            side: PositionSide::Long,
            quantity: 1.0,
            entry_price: 100.0,
            opened_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            entry_fee: 0.0,
            protection: Protection {
                stop_loss: Some(stop),
                take_profit: Some(take),
            },
        }
    }

    #[test]
    fn percentage_stop_and_risk_reward_take() {
        let b = bar(4_990_000.0, 5_010_000.0);
        let stop = stop_loss_price(
            &StopLossPolicy::Percentage { pct: 0.02 },
            PositionSide::Long,
            5_000_000.0,
            &b,
            1.0,
        );
        assert_eq!(stop, Some(4_900_000.0));
        let take = take_profit_price(
            &TakeProfitPolicy::RiskReward { ratio: 2.0 },
            PositionSide::Long,
            5_000_000.0,
            stop,
            1.0,
        );
        assert_eq!(take, Some(5_200_000.0));
    }

    #[test]
    fn short_levels_are_mirrored() {
        let b = bar(99.0, 101.0);
        let stop = stop_loss_price(
            &StopLossPolicy::Atr {
                multiplier: 2.0,
                field: "atr".into(),
            },
            PositionSide::Short,
            1_000.0,
            &b,
            1.0,
        );
        assert_eq!(stop, Some(1_200.0));
        let take = take_profit_price(
            &TakeProfitPolicy::Percentage { pct: 0.04 },
            PositionSide::Short,
            1_000.0,
            stop,
            1.0,
        );
        assert_eq!(take, Some(960.0));
    }

    #[test]
    fn atr_stop_without_atr_is_none() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let b = Bar::new("X", ts, 1.0, 1.0, 1.0, 1.0, 1.0).with_indicator("atr", f64::NAN);
        let policy = StopLossPolicy::Atr {
            multiplier: 2.0,
            field: "atr".into(),
        };
        assert_eq!(stop_loss_price(&policy, PositionSide::Long, 100.0, &b, 0.0), None);
    }

    #[test]
    fn risk_reward_without_stop_is_none() {
        let take = take_profit_price(
            &TakeProfitPolicy::RiskReward { ratio: 2.0 },
            PositionSide::Long,
            100.0,
            None,
            0.01,
        );
        assert_eq!(take, None);
    }

    #[test]
    fn stop_below_zero_is_none() {
        let b = bar(10.0, 20.0);
        let stop = stop_loss_price(
            &StopLossPolicy::FixedAmount { amount: 50_000.0 },
            PositionSide::Long,
            15.0,
            &b,
            1.0,
        );
        assert_eq!(stop, None);
    }

    #[test]
    fn gap_through_both_levels_prefers_stop() {
        let pos = long_with(95.0, 110.0);
        let trigger = check_triggers(&pos, &bar(90.0, 115.0));
        assert_eq!(trigger, Some(ProtectiveTrigger::StopLoss(95.0)));
    }

    #[test]
    fn take_profit_alone_triggers() {
        let pos = long_with(95.0, 110.0);
        assert_eq!(
            check_triggers(&pos, &bar(100.0, 111.0)),
            Some(ProtectiveTrigger::TakeProfit(110.0))
        );
        assert_eq!(check_triggers(&pos, &bar(96.0, 109.0)), None);
    }
}
