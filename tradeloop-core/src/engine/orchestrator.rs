//! The orchestrator: owns the iteration, not the data.

use super::context::EngineContext;
use super::state::{
    BarOutcome, BarRecord, BarStage, RunError, RunFailure, RunOutcome, RunState, StopSignal,
};
use crate::analysis::PerformanceAnalyzer;
use crate::domain::{Bar, EquityPoint, Signal, SignalKind};
use crate::execution::Executor;
use crate::feed::{FeedError, MarketFeed};
use crate::ledger::PortfolioLedger;
use crate::risk::{Decision, PositionGauge, RiskManager};
use crate::strategy::{Evaluation, Strategy, StrategyError};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// Per-bar failure: the stage it happened in plus the error.
type StepError = (BarStage, RunError);

pub struct Orchestrator<F: MarketFeed, E: Executor> {
    run_label: String,
    feed: F,
    strategy: Box<dyn Strategy>,
    risk: RiskManager,
    executor: E,
    ledger: PortfolioLedger,
    analyzer: PerformanceAnalyzer,
    state: RunState,
    bar_index: usize,
    equity: Vec<EquityPoint>,
    records: Vec<BarRecord>,
}

impl<F: MarketFeed, E: Executor> Orchestrator<F, E> {
    /// `gauge` is the cross-symbol open-position counter. Backtests pass a
    /// fresh one, live sessions share one across symbols.
    pub fn new(
        ctx: &EngineContext,
        feed: F,
        strategy: Box<dyn Strategy>,
        executor: E,
        gauge: PositionGauge,
    ) -> Self {
        Self {
            run_label: ctx.run_label.clone(),
            feed,
            strategy,
            risk: RiskManager::new(ctx, gauge),
            executor,
            ledger: PortfolioLedger::new(ctx),
            analyzer: PerformanceAnalyzer::new(ctx),
            state: RunState::Initializing,
            bar_index: 0,
            equity: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn ledger(&self) -> &PortfolioLedger {
        &self.ledger
    }

    fn transition(&mut self, next: RunState) {
        info!(from = %self.state, to = %next, "run state");
        self.state = next;
    }

    /// Runs until end of stream, a stop request or a fatal error.
    ///
    /// The stop flag is only consulted between bars, so an in-flight submit
    /// always resolves to a fill or a gateway error first.
    pub async fn run(self, stop: &StopSignal) -> RunOutcome {
        let span = info_span!(
            "run",
            run = %self.run_label,
            strategy = %self.strategy.name(),
            symbol = tracing::field::Empty
        );
        self.drive(stop).instrument(span).await
    }

    async fn drive(mut self, stop: &StopSignal) -> RunOutcome {
        if let Err(e) = self.initialize() {
            error!(error = %e, "initialization failed");
            let failure = RunFailure {
                kind: e.kind(),
                bar_index: None,
                stage: None,
                message: e.to_string(),
            };
            self.transition(RunState::Failed);
            return self.finish(Some(failure), false);
        }
        self.transition(RunState::Running);

        let mut stopped = false;
        loop {
            if stop.is_stopped() {
                info!(bars = self.bar_index, "stop requested");
                stopped = true;
                break;
            }
            match self.step().await {
                Ok(Some(record)) => {
                    self.records.push(record);
                    self.bar_index += 1;
                }
                Ok(None) => break,
                Err((stage, e)) => {
                    error!(bar = self.bar_index, ?stage, error = %e, "run failed");
                    let failure = RunFailure {
                        kind: e.kind(),
                        bar_index: Some(self.bar_index),
                        stage: Some(stage),
                        message: e.to_string(),
                    };
                    self.transition(RunState::Failed);
                    return self.finish(Some(failure), false);
                }
            }
        }
        self.transition(RunState::Completed);
        self.finish(None, stopped)
    }

    /// Every required indicator must be in the feed's schema.
    fn initialize(&mut self) -> Result<(), RunError> {
        let schema = self.feed.schema();
        for field in self.strategy.required_indicators() {
            if !schema.contains(&field) {
                return Err(StrategyError::MissingIndicator {
                    strategy: self.strategy.name().to_string(),
                    field,
                }
                .into());
            }
        }
        debug!(fields = schema.len(), "feed schema verified");
        Ok(())
    }

    /// One bar through the full pipeline. `Ok(None)` at end of stream.
    async fn step(&mut self) -> Result<Option<BarRecord>, StepError> {
        // FETCH
        let (bar, cold) = match self.feed.next_bar() {
            Ok(Some(bar)) => (bar, None),
            Ok(None) => return Ok(None),
            Err(FeedError::InsufficientData { bar, fields }) => (*bar, Some(fields)),
            Err(e) => return Err((BarStage::Fetch, e.into())),
        };
        if self.bar_index == 0 {
            Span::current().record("symbol", bar.symbol.as_str());
        }

        // SIGNAL
        let signal = match cold {
            Some(fields) => {
                Signal::hold(format!("indicator fields not warm: {}", fields.join(", ")))
            }
            None => self.evaluate(&bar)?,
        };
        if signal.kind != SignalKind::Hold {
            info!(
                strategy = %self.strategy.name(),
                kind = %signal.kind,
                reason = %signal.rationale.reason,
                "signal"
            );
        }

        let outcome = if bar.is_sane() {
            self.risk_and_execute(&signal, &bar).await?
        } else {
            BarOutcome::Hold(format!("invalid bar prices at {}", bar.timestamp))
        };

        // LEDGER_UPDATE (mark to market; any fill was applied above)
        let account = self
            .ledger
            .mark_to_market(&bar)
            .map_err(|e| (BarStage::LedgerUpdate, e.into()))?;

        // RECORD
        self.equity.push(EquityPoint {
            bar_index: self.bar_index,
            timestamp: bar.timestamp,
            price: bar.close,
            equity: account.equity,
            peak_equity: account.peak_equity,
            drawdown: account.drawdown(),
        });
        if let BarOutcome::Hold(reason) = &outcome {
            debug!(bar = self.bar_index, reason = %reason, "hold");
        }
        Ok(Some(BarRecord {
            index: self.bar_index,
            timestamp: bar.timestamp,
            signal: signal.kind,
            outcome,
        }))
    }

    fn evaluate(&mut self, bar: &Bar) -> Result<Signal, StepError> {
        let position = self.ledger.position(&bar.symbol);
        let account = self.ledger.account();
        match self.strategy.evaluate(bar, position, &account) {
            Ok(Evaluation::InvalidValue { field, rationale }) => {
                warn!(bar = self.bar_index, field = %field, "invalid numeric value, holding");
                Ok(Signal::new(SignalKind::Hold, rationale))
            }
            Ok(eval) => Ok(eval.signal()),
            // A field the feed declares but this bar lacks is a data gap.
            Err(StrategyError::MissingIndicator { field, .. })
                if self.feed.schema().contains(&field) =>
            {
                warn!(bar = self.bar_index, field = %field, "indicator missing on bar, holding");
                Ok(Signal::hold(format!("indicator '{field}' missing on this bar")))
            }
            Err(e) => Err((BarStage::Signal, e.into())),
        }
    }

    /// RISK, EXECUTE and the fill half of LEDGER_UPDATE.
    async fn risk_and_execute(
        &mut self,
        signal: &Signal,
        bar: &Bar,
    ) -> Result<BarOutcome, StepError> {
        let account = self.ledger.account();
        let position = self.ledger.position(&bar.symbol);
        let admission = match self.risk.admit(signal, bar, position, &account) {
            Decision::NoAction => return Ok(BarOutcome::Hold(signal.rationale.reason.clone())),
            Decision::Veto(veto) => return Ok(BarOutcome::Vetoed(veto.reason.to_string())),
            Decision::Admit(admission) => admission,
        };

        let intent = admission.intent;
        let fill = match self.executor.submit(&intent, bar).await {
            Ok(fill) => fill,
            Err(e) => {
                warn!(
                    bar = self.bar_index,
                    executor = self.executor.name(),
                    error = %e,
                    "submit failed"
                );
                // Dropping the slot guard returns a reserved position slot.
                return Ok(BarOutcome::GatewayFailed(e.to_string()));
            }
        };

        let update = self
            .ledger
            .apply(fill)
            .map_err(|e| (BarStage::LedgerUpdate, e.into()))?;
        if let Some(slot) = admission.slot {
            slot.commit();
        }
        self.risk.on_fill(&update.fill);
        info!(
            order_id = %update.fill.order_id,
            side = %update.fill.side,
            quantity = update.fill.quantity,
            price = update.fill.price,
            fee = update.fill.fee,
            pnl = update.fill.realized_pnl,
            "fill applied"
        );
        Ok(BarOutcome::Filled(update.fill.order_id.to_string()))
    }

    fn finish(self, failure: Option<RunFailure>, stopped: bool) -> RunOutcome {
        let fills = self.ledger.fills().to_vec();
        let report = self.analyzer.analyze(&fills, &self.equity);
        info!(
            state = %self.state,
            bars = self.bar_index,
            trades = report.total_trades,
            final_equity = report.final_equity,
            "run finished"
        );
        RunOutcome {
            run_label: self.run_label,
            state: self.state,
            bars_processed: self.bar_index,
            stopped,
            fills,
            equity_curve: self.equity,
            trades: self.ledger.closed_trades().to_vec(),
            open_positions: self.ledger.open_positions().cloned().collect(),
            records: self.records,
            report,
            failure,
        }
    }
}
