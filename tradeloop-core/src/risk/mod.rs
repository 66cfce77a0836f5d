//! Risk manager: turns signals into sized, protected intents or vetoes.
//!
//! Checks run in a fixed order on every bar:
//!
//! 1. margin gating: below the margin floor every open position is closed
//!    (CLOSE_ALL), whatever the strategy said;
//! 2. protective exits: an open position whose stop-loss or take-profit was
//!    reached on this bar is closed at that level (stop wins ties);
//! 3. signal validation against the open position;
//! 4. position-count gating through the shared [`PositionGauge`];
//! 5. sizing, then protective prices;
//! 6. projected drawdown check.
//!
//! Vetoes are ordinary outcomes, never errors.

pub mod config;
pub mod gauge;
pub mod protection;
pub mod sizing;

pub use config::{RiskConfig, SizingPolicy, StopLossPolicy, TakeProfitPolicy};
pub use gauge::{PositionGauge, SlotGuard};
pub use protection::{check_triggers, round_to_tick, ProtectiveTrigger};
pub use sizing::{round_down_to_step, size_entry, TradeStats};

use crate::domain::{
    AccountState, Bar, Fill, Intent, IntentAction, IntentOrigin, Position, PositionSide,
    Protection, Rationale, Signal, SignalKind,
};
use crate::engine::EngineContext;
use chrono::NaiveDate;
use std::fmt;
use tracing::{debug, info, warn};

// ─── Decisions ───────────────────────────────────────────────────────

/// Why an actionable signal produced no intent.
#[derive(Debug, Clone, PartialEq)]
pub enum VetoReason {
    MarginFloor { margin_level: f64, floor: f64 },
    PositionAlreadyOpen,
    NoMatchingPosition,
    NoOpenPosition,
    MaxPositionsReached,
    MaxDailyTrades,
    InvalidPrice,
    SizeBelowMinimum { quantity: f64 },
    DrawdownLimit { projected: f64, limit: f64 },
}

impl fmt::Display for VetoReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VetoReason::MarginFloor {
                margin_level,
                floor,
            } => write!(f, "margin level {margin_level:.4} below floor {floor:.4}"),
            VetoReason::PositionAlreadyOpen => write!(f, "position already open"),
            VetoReason::NoMatchingPosition => write!(f, "no matching position"),
            VetoReason::NoOpenPosition => write!(f, "no open position"),
            VetoReason::MaxPositionsReached => write!(f, "max positions reached"),
            VetoReason::MaxDailyTrades => write!(f, "max daily trades reached"),
            VetoReason::InvalidPrice => write!(f, "invalid reference price"),
            VetoReason::SizeBelowMinimum { quantity } => {
                write!(f, "size below minimum ({quantity})")
            }
            VetoReason::DrawdownLimit { projected, limit } => write!(
                f,
                "projected drawdown {projected:.4} exceeds limit {limit:.4}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Veto {
    pub signal: SignalKind,
    pub reason: VetoReason,
}

/// An admitted intent plus, for entries, the reserved position slot.
#[derive(Debug)]
pub struct Admission {
    pub intent: Intent,
    pub slot: Option<SlotGuard>,
}

#[derive(Debug)]
pub enum Decision {
    Admit(Admission),
    Veto(Veto),
    /// HOLD with nothing to enforce.
    NoAction,
}

impl Decision {
    pub fn intent(&self) -> Option<&Intent> {
        match self {
            Decision::Admit(a) => Some(&a.intent),
            _ => None,
        }
    }
}

// ─── Risk manager ────────────────────────────────────────────────────

#[derive(Debug)]
pub struct RiskManager {
    config: RiskConfig,
    /// Fee rate assumed on both legs when projecting drawdown.
    fee_estimate: f64,
    gauge: PositionGauge,
    stats: TradeStats,
    daily: Option<(NaiveDate, usize)>,
}

impl RiskManager {
    pub fn new(ctx: &EngineContext, gauge: PositionGauge) -> Self {
        let lookback = match ctx.risk.sizing {
            SizingPolicy::Kelly { lookback, .. } => lookback,
            _ => 50,
        };
        Self {
            config: ctx.risk.clone(),
            fee_estimate: ctx.execution.taker_fee.max(0.0),
            gauge,
            stats: TradeStats::new(lookback),
            daily: None,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn gauge(&self) -> &PositionGauge {
        &self.gauge
    }

    pub fn trade_stats(&self) -> &TradeStats {
        &self.stats
    }

    /// Feeds a fill back: closing fills update trade statistics and free the
    /// gauge slot, opening fills count towards the daily limit.
    pub fn on_fill(&mut self, fill: &Fill) {
        if fill.is_closing() {
            self.record_outcome(fill.realized_pnl);
            self.gauge.release_open();
        } else {
            let day = fill.timestamp.date_naive();
            match &mut self.daily {
                Some((d, n)) if *d == day => *n += 1,
                _ => self.daily = Some((day, 1)),
            }
        }
    }

    /// Adds a closed trade's net pnl to the Kelly history.
    pub fn record_outcome(&mut self, realized_pnl: f64) {
        self.stats.record(realized_pnl);
    }

    fn trades_on(&self, day: NaiveDate) -> usize {
        match self.daily {
            Some((d, n)) if d == day => n,
            _ => 0,
        }
    }

    pub fn admit(
        &mut self,
        signal: &Signal,
        bar: &Bar,
        position: Option<&Position>,
        account: &AccountState,
    ) -> Decision {
        let veto = |reason: VetoReason| {
            warn!(signal = %signal.kind, reason = %reason, "signal vetoed");
            Decision::Veto(Veto {
                signal: signal.kind,
                reason,
            })
        };

        // (1) margin floor
        if account.margin_level < self.config.margin_call_level {
            if let Some(pos) = position {
                let rationale = Rationale::new("margin level below floor")
                    .with("margin_level", account.margin_level)
                    .with("floor", self.config.margin_call_level)
                    .with("equity", account.equity);
                info!(
                    margin_level = account.margin_level,
                    floor = self.config.margin_call_level,
                    "margin floor breached, closing all"
                );
                return self.close(pos, bar, IntentOrigin::MarginCall, None, rationale);
            }
            if signal.kind.is_entry() {
                return veto(VetoReason::MarginFloor {
                    margin_level: account.margin_level,
                    floor: self.config.margin_call_level,
                });
            }
        }

        // (2) protective exits on the open position
        if let Some(pos) = position {
            if let Some(trigger) = check_triggers(pos, bar) {
                let (origin, reason) = match trigger {
                    ProtectiveTrigger::StopLoss(_) => (IntentOrigin::StopLoss, "stop-loss hit"),
                    ProtectiveTrigger::TakeProfit(_) => {
                        (IntentOrigin::TakeProfit, "take-profit hit")
                    }
                };
                let rationale = Rationale::new(reason)
                    .with("level", trigger.level())
                    .with("low", bar.low)
                    .with("high", bar.high);
                info!(symbol = %pos.symbol, level = trigger.level(), reason, "protective exit");
                return self.close(pos, bar, origin, Some(trigger.level()), rationale);
            }
        }

        // (3) signal validation
        match signal.kind {
            SignalKind::Hold => Decision::NoAction,
            SignalKind::CloseLong | SignalKind::CloseShort | SignalKind::CloseAll => {
                let wanted = match signal.kind {
                    SignalKind::CloseLong => Some(PositionSide::Long),
                    SignalKind::CloseShort => Some(PositionSide::Short),
                    _ => None,
                };
                match (position, wanted) {
                    (None, None) => veto(VetoReason::NoOpenPosition),
                    (None, Some(_)) => veto(VetoReason::NoMatchingPosition),
                    (Some(pos), Some(side)) if pos.side != side => {
                        veto(VetoReason::NoMatchingPosition)
                    }
                    (Some(pos), _) => self.close(
                        pos,
                        bar,
                        IntentOrigin::Signal,
                        None,
                        signal.rationale.clone(),
                    ),
                }
            }
            SignalKind::Buy | SignalKind::Sell => {
                if position.is_some() {
                    return veto(VetoReason::PositionAlreadyOpen);
                }
                let side = if signal.kind == SignalKind::Buy {
                    PositionSide::Long
                } else {
                    PositionSide::Short
                };
                match self.open(side, signal, bar, account) {
                    Ok(admission) => Decision::Admit(admission),
                    Err(reason) => veto(reason),
                }
            }
        }
    }

    fn close(
        &self,
        pos: &Position,
        bar: &Bar,
        origin: IntentOrigin,
        trigger_price: Option<f64>,
        rationale: Rationale,
    ) -> Decision {
        Decision::Admit(Admission {
            intent: Intent {
                symbol: pos.symbol.clone(),
                action: IntentAction::Close(pos.side),
                quantity: pos.quantity,
                trigger_price,
                protection: Protection::default(),
                origin,
                created_at: bar.timestamp,
                rationale,
            },
            slot: None,
        })
    }

    /// Steps (4) to (6) for an entry.
    fn open(
        &mut self,
        side: PositionSide,
        signal: &Signal,
        bar: &Bar,
        account: &AccountState,
    ) -> Result<Admission, VetoReason> {
        let price = bar.close;
        if !(price.is_finite() && price > 0.0) {
            return Err(VetoReason::InvalidPrice);
        }

        // (4) position count and daily trade limits
        let slot = self
            .gauge
            .try_reserve()
            .ok_or(VetoReason::MaxPositionsReached)?;
        if self.trades_on(bar.timestamp.date_naive()) >= self.config.max_daily_trades {
            return Err(VetoReason::MaxDailyTrades);
        }

        // (5) sizing
        let sized = size_entry(&self.config.sizing, account.equity, price, &self.stats);
        let capped = sized.quantity.min(self.config.max_position_size);
        let quantity = round_down_to_step(capped, self.config.quantity_step);
        if !(quantity > 0.0) || quantity < self.config.min_order_size {
            return Err(VetoReason::SizeBelowMinimum { quantity });
        }

        let stop_loss = protection::stop_loss_price(
            &self.config.stop_loss,
            side,
            price,
            bar,
            self.config.tick_size,
        );
        let take_profit = protection::take_profit_price(
            &self.config.take_profit,
            side,
            price,
            stop_loss,
            self.config.tick_size,
        );

        // (6) projected drawdown if the stop is hit
        let worst_loss = stop_loss.map(|s| quantity * (price - s).abs()).unwrap_or(0.0);
        let fees = quantity * price * self.fee_estimate * 2.0;
        let projected_equity = account.equity - worst_loss - fees;
        let peak = account.peak_equity.max(account.equity);
        let projected = if peak > 0.0 {
            ((peak - projected_equity) / peak).max(0.0)
        } else {
            1.0
        };
        if projected > self.config.max_drawdown_percentage {
            return Err(VetoReason::DrawdownLimit {
                projected,
                limit: self.config.max_drawdown_percentage,
            });
        }

        let mut rationale = signal
            .rationale
            .clone()
            .with("quantity", quantity)
            .with("size_fraction", sized.fraction);
        if let Some(s) = stop_loss {
            rationale = rationale.with("stop_loss", s);
        }
        if let Some(t) = take_profit {
            rationale = rationale.with("take_profit", t);
        }
        debug!(
            sizing = self.config.sizing.name(),
            quantity,
            ?stop_loss,
            ?take_profit,
            "entry admitted"
        );

        Ok(Admission {
            intent: Intent {
                symbol: bar.symbol.clone(),
                action: IntentAction::Open(side),
                quantity,
                trigger_price: None,
                protection: Protection {
                    stop_loss,
                    take_profit,
                },
                origin: IntentOrigin::Signal,
                created_at: bar.timestamp,
                rationale,
            },
            slot: Some(slot),
        })
    }
}
