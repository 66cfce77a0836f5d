//! PortfolioLedger: sole owner and writer of positions and account state.
//!
//! Accounting is margin-style: opening a position does not move cash, it
//! only commits margin. Balance changes by fees and by realized pnl; equity
//! is balance plus unrealized pnl at the latest mark. The identity
//! `equity == balance + Σ unrealized` holds after every mutation.

use crate::domain::{
    account, AccountState, Bar, Fill, IntentAction, Position, PositionSide, TradeRecord,
};
use crate::engine::EngineContext;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, error, info};

/// Relative tolerance when matching a closing quantity to the open position.
const QTY_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("margin call: equity {equity:.2} at or below maintenance floor {floor:.2}")]
    MarginCall { equity: f64, floor: f64 },

    #[error("position already open for {0}")]
    DuplicatePosition(String),

    #[error("no open {side:?} position for {symbol}")]
    NoPosition { symbol: String, side: PositionSide },

    #[error("closing quantity {fill} does not match open quantity {open} for {symbol}")]
    QuantityMismatch { symbol: String, open: f64, fill: f64 },

    #[error("invalid fill {order_id}: {reason}")]
    InvalidFill { order_id: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub initial_capital: f64,
    /// Required margin = notional / leverage.
    pub leverage: f64,
    /// Equity at or below this raises a margin call.
    pub maintenance_equity: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            initial_capital: 1_000_000.0,
            leverage: 1.0,
            maintenance_equity: 0.0,
        }
    }
}

/// Result of applying one fill.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerUpdate {
    /// The fill as recorded, with `realized_pnl` filled in for closes.
    pub fill: Fill,
    pub account: AccountState,
    /// Present when the fill closed a position.
    pub trade: Option<TradeRecord>,
}

#[derive(Debug, Clone)]
pub struct PortfolioLedger {
    config: LedgerConfig,
    balance: f64,
    positions: HashMap<String, Position>,
    marks: HashMap<String, f64>,
    peak_equity: f64,
    total_fees: f64,
    fills: Vec<Fill>,
    closed_trades: Vec<TradeRecord>,
}

impl PortfolioLedger {
    pub fn new(ctx: &EngineContext) -> Self {
        Self::with_config(ctx.ledger.clone())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        let capital = config.initial_capital;
        Self {
            config,
            balance: capital,
            positions: HashMap::new(),
            marks: HashMap::new(),
            peak_equity: capital,
            total_fees: 0.0,
            fills: Vec::new(),
            closed_trades: Vec::new(),
        }
    }

    pub fn initial_capital(&self) -> f64 {
        self.config.initial_capital
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn total_fees(&self) -> f64 {
        self.total_fees
    }

    /// Every applied fill in order, with realized pnl set. This is the
    /// append-only trade ledger.
    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn closed_trades(&self) -> &[TradeRecord] {
        &self.closed_trades
    }

    fn unrealized(&self) -> f64 {
        self.positions
            .iter()
            .map(|(sym, pos)| {
                let mark = self.marks.get(sym).copied().unwrap_or(pos.entry_price);
                pos.unrealized_pnl(mark)
            })
            .sum()
    }

    fn required_margin(&self) -> f64 {
        let leverage = if self.config.leverage > 0.0 {
            self.config.leverage
        } else {
            1.0
        };
        self.positions
            .iter()
            .map(|(sym, pos)| {
                let mark = self.marks.get(sym).copied().unwrap_or(pos.entry_price);
                pos.notional(mark)
            })
            .sum::<f64>()
            / leverage
    }

    /// Read-only snapshot. Does not update the peak.
    pub fn account(&self) -> AccountState {
        let unrealized_pnl = self.unrealized();
        let equity = self.balance + unrealized_pnl;
        let required = self.required_margin();
        let margin_level = if required > 0.0 {
            equity / required
        } else {
            f64::INFINITY
        };
        AccountState {
            equity,
            balance: self.balance,
            unrealized_pnl,
            available_margin: equity - required,
            margin_level,
            peak_equity: self.peak_equity.max(equity),
        }
    }

    pub fn drawdown(&self) -> f64 {
        let acct = self.account();
        account::drawdown(acct.peak_equity, acct.equity)
    }

    /// Recomputes the snapshot, ratchets the peak and enforces the floor.
    fn settle(&mut self) -> Result<AccountState, LedgerError> {
        let acct = self.account();
        if acct.equity > self.peak_equity {
            self.peak_equity = acct.equity;
        }
        if !(acct.equity > self.config.maintenance_equity) {
            error!(
                equity = acct.equity,
                floor = self.config.maintenance_equity,
                "margin call"
            );
            return Err(LedgerError::MarginCall {
                equity: acct.equity,
                floor: self.config.maintenance_equity,
            });
        }
        Ok(acct)
    }

    /// Applies a fill: opens or fully closes the position for its symbol.
    ///
    /// State is updated before the maintenance check, so on `MarginCall`
    /// the ledger still reflects the fill.
    pub fn apply(&mut self, mut fill: Fill) -> Result<LedgerUpdate, LedgerError> {
        validate(&fill)?;
        let trade = match fill.action {
            IntentAction::Open(side) => {
                self.open(&fill, side)?;
                None
            }
            IntentAction::Close(side) => Some(self.close(&mut fill, side)?),
        };
        self.total_fees += fill.fee;
        self.fills.push(fill.clone());
        if let Some(t) = &trade {
            self.closed_trades.push(t.clone());
        }
        let account = self.settle()?;
        Ok(LedgerUpdate {
            fill,
            account,
            trade,
        })
    }

    fn open(&mut self, fill: &Fill, side: PositionSide) -> Result<(), LedgerError> {
        if self.positions.contains_key(&fill.symbol) {
            return Err(LedgerError::DuplicatePosition(fill.symbol.clone()));
        }
        self.balance -= fill.fee;
        self.marks.insert(fill.symbol.clone(), fill.price);
        self.positions.insert(
            fill.symbol.clone(),
            Position {
                symbol: fill.symbol.clone(),
                side,
                quantity: fill.quantity,
                entry_price: fill.price,
                opened_at: fill.timestamp,
                entry_fee: fill.fee,
                protection: fill.protection,
            },
        );
        info!(
            symbol = %fill.symbol,
            side = %side,
            quantity = fill.quantity,
            price = fill.price,
            "position opened"
        );
        Ok(())
    }

    fn close(&mut self, fill: &mut Fill, side: PositionSide) -> Result<TradeRecord, LedgerError> {
        let pos = match self.positions.get(&fill.symbol) {
            Some(p) if p.side == side => p.clone(),
            _ => {
                return Err(LedgerError::NoPosition {
                    symbol: fill.symbol.clone(),
                    side,
                })
            }
        };
        let tolerance = QTY_TOLERANCE * pos.quantity.max(1.0);
        if (pos.quantity - fill.quantity).abs() > tolerance {
            return Err(LedgerError::QuantityMismatch {
                symbol: fill.symbol.clone(),
                open: pos.quantity,
                fill: fill.quantity,
            });
        }
        self.positions.remove(&fill.symbol);
        self.marks.remove(&fill.symbol);

        let gross = (fill.price - pos.entry_price) * pos.quantity * pos.side.sign();
        let fees = pos.entry_fee + fill.fee;
        let net = gross - fees;
        // The entry fee already left the balance when the position opened.
        self.balance += gross - fill.fee;
        fill.realized_pnl = net;

        info!(
            symbol = %fill.symbol,
            side = %pos.side,
            entry = pos.entry_price,
            exit = fill.price,
            pnl = net,
            "position closed"
        );

        Ok(TradeRecord {
            symbol: pos.symbol,
            side: pos.side,
            quantity: pos.quantity,
            entry_time: pos.opened_at,
            entry_price: pos.entry_price,
            exit_time: fill.timestamp,
            exit_price: fill.price,
            fees,
            net_pnl: net,
            exit_reason: fill.origin.into(),
            exit_order_id: fill.order_id.clone(),
        })
    }

    /// Re-marks the bar's symbol at its close. No fill is generated.
    ///
    /// A non-finite close leaves the previous mark in place.
    pub fn mark_to_market(&mut self, bar: &Bar) -> Result<AccountState, LedgerError> {
        if self.positions.contains_key(&bar.symbol) && bar.close.is_finite() && bar.close > 0.0 {
            self.marks.insert(bar.symbol.clone(), bar.close);
        }
        let acct = self.settle()?;
        debug!(
            symbol = %bar.symbol,
            equity = acct.equity,
            unrealized = acct.unrealized_pnl,
            "marked to market"
        );
        Ok(acct)
    }
}

fn validate(fill: &Fill) -> Result<(), LedgerError> {
    let reason = if !(fill.quantity.is_finite() && fill.quantity > 0.0) {
        Some("non-positive quantity")
    } else if !(fill.price.is_finite() && fill.price > 0.0) {
        Some("non-positive price")
    } else if !(fill.fee.is_finite() && fill.fee >= 0.0) {
        Some("negative fee")
    } else {
        None
    };
    match reason {
        Some(r) => Err(LedgerError::InvalidFill {
            order_id: fill.order_id.to_string(),
            reason: r.to_string(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExitReason, IntentOrigin, Liquidity, OrderId, Protection};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    fn fill(action: IntentAction, price: f64, qty: f64, fee: f64, h: i64) -> Fill {
        Fill {
            order_id: OrderId::sequential("SIM", h as u64 + 1),
            symbol: "BTC_JPY".into(),
            timestamp: t(h),
            acknowledged_at: None,
            side: action.order_side(),
            action,
            price,
            quantity: qty,
            fee,
            realized_pnl: 0.0,
            liquidity: if action.is_open() {
                Liquidity::Maker
            } else {
                Liquidity::Taker
            },
            origin: IntentOrigin::Signal,
            protection: Protection::default(),
        }
    }

    fn bar(close: f64, h: i64) -> Bar {
        Bar::new("BTC_JPY", t(h), close, close, close, close, 1.0)
    }

    fn ledger(capital: f64) -> PortfolioLedger {
        PortfolioLedger::with_config(LedgerConfig {
            initial_capital: capital,
            ..LedgerConfig::default()
        })
    }

    const OPEN_LONG: IntentAction = IntentAction::Open(PositionSide::Long);
    const CLOSE_LONG: IntentAction = IntentAction::Close(PositionSide::Long);

    #[test]
    fn long_round_trip_realizes_net_of_both_fees() {
        let mut l = ledger(1_000.0);
        l.apply(fill(OPEN_LONG, 100.0, 1.0, 0.5, 0)).unwrap();
        let up = l.apply(fill(CLOSE_LONG, 110.0, 1.0, 0.5, 1)).unwrap();
        assert!((up.fill.realized_pnl - 9.0).abs() < 1e-12);
        assert!((up.account.equity - 1_009.0).abs() < 1e-9);
        assert!(l.position("BTC_JPY").is_none());
        let trade = up.trade.unwrap();
        assert_eq!(trade.exit_reason, ExitReason::Signal);
        assert!((trade.fees - 1.0).abs() < 1e-12);
        assert_eq!(l.closed_trades().len(), 1);
        assert_eq!(l.fills().len(), 2);
        assert!((l.total_fees() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn short_round_trip_profits_when_price_falls() {
        let mut l = ledger(1_000.0);
        l.apply(fill(IntentAction::Open(PositionSide::Short), 100.0, 2.0, 0.0, 0))
            .unwrap();
        let up = l
            .apply(fill(IntentAction::Close(PositionSide::Short), 90.0, 2.0, 0.0, 1))
            .unwrap();
        assert!((up.fill.realized_pnl - 20.0).abs() < 1e-12);
    }

    #[test]
    fn second_open_is_duplicate() {
        let mut l = ledger(1_000.0);
        l.apply(fill(OPEN_LONG, 100.0, 1.0, 0.0, 0)).unwrap();
        let err = l.apply(fill(OPEN_LONG, 100.0, 1.0, 0.0, 1)).unwrap_err();
        assert_eq!(err, LedgerError::DuplicatePosition("BTC_JPY".into()));
    }

    #[test]
    fn close_requires_matching_side_and_quantity() {
        let mut l = ledger(1_000.0);
        assert!(matches!(
            l.apply(fill(CLOSE_LONG, 100.0, 1.0, 0.0, 0)),
            Err(LedgerError::NoPosition { .. })
        ));
        l.apply(fill(OPEN_LONG, 100.0, 1.0, 0.0, 0)).unwrap();
        assert!(matches!(
            l.apply(fill(CLOSE_LONG, 100.0, 0.5, 0.0, 1)),
            Err(LedgerError::QuantityMismatch { .. })
        ));
        assert!(l.position("BTC_JPY").is_some());
    }

    #[test]
    fn mark_to_market_moves_equity_and_peak() {
        let mut l = ledger(1_000.0);
        l.apply(fill(OPEN_LONG, 100.0, 1.0, 0.0, 0)).unwrap();
        let up = l.mark_to_market(&bar(150.0, 1)).unwrap();
        assert!((up.equity - 1_050.0).abs() < 1e-9);
        assert!((up.peak_equity - 1_050.0).abs() < 1e-9);
        let down = l.mark_to_market(&bar(120.0, 2)).unwrap();
        assert!((down.peak_equity - 1_050.0).abs() < 1e-9);
        assert!((down.drawdown() - 30.0 / 1_050.0).abs() < 1e-12);
        assert!((down.margin_level - 1_020.0 / 120.0).abs() < 1e-9);
    }

    #[test]
    fn margin_level_is_infinite_while_flat() {
        let l = ledger(1_000.0);
        assert!(l.account().margin_level.is_infinite());
    }

    #[test]
    fn equity_through_floor_raises_margin_call() {
        let mut l = PortfolioLedger::with_config(LedgerConfig {
            initial_capital: 100.0,
            leverage: 10.0,
            maintenance_equity: 10.0,
        });
        l.apply(fill(OPEN_LONG, 100.0, 10.0, 0.0, 0)).unwrap();
        let err = l.mark_to_market(&bar(90.0, 1)).unwrap_err();
        assert!(matches!(err, LedgerError::MarginCall { .. }));
        // State is preserved for inspection.
        assert!(l.position("BTC_JPY").is_some());
        assert!((l.account().equity - 0.0).abs() < 1e-9);
    }

    #[test]
    fn negative_fee_is_rejected() {
        let mut l = ledger(1_000.0);
        assert!(matches!(
            l.apply(fill(OPEN_LONG, 100.0, 1.0, -1.0, 0)),
            Err(LedgerError::InvalidFill { .. })
        ));
    }

    #[test]
    fn nan_close_keeps_previous_mark() {
        let mut l = ledger(1_000.0);
        l.apply(fill(OPEN_LONG, 100.0, 1.0, 0.0, 0)).unwrap();
        l.mark_to_market(&bar(110.0, 1)).unwrap();
        let acct = l.mark_to_market(&bar(f64::NAN, 2)).unwrap();
        assert!((acct.equity - 1_010.0).abs() < 1e-9);
    }
}
