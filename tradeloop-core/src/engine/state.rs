//! Run state machine, per-bar records and run outcome types.

use crate::analysis::PerformanceReport;
use crate::domain::{EquityPoint, Fill, Position, SignalKind, TradeRecord};
use crate::feed::FeedError;
use crate::ledger::LedgerError;
use crate::strategy::StrategyError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Initializing,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Initializing => "INITIALIZING",
            RunState::Running => "RUNNING",
            RunState::Completed => "COMPLETED",
            RunState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Per-bar sub-step, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarStage {
    Fetch,
    Signal,
    Risk,
    Execute,
    LedgerUpdate,
    Record,
}

/// What happened on one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum BarOutcome {
    Hold(String),
    Vetoed(String),
    Filled(String),
    GatewayFailed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarRecord {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub signal: SignalKind,
    pub outcome: BarOutcome,
}

/// Fatal run errors. Recoverable conditions never reach this type.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Feed(#[from] FeedError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingIndicator,
    MarginCall,
    Ledger,
    Feed,
}

impl RunError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunError::Strategy(StrategyError::MissingIndicator { .. }) => ErrorKind::MissingIndicator,
            RunError::Ledger(LedgerError::MarginCall { .. }) => ErrorKind::MarginCall,
            RunError::Ledger(_) => ErrorKind::Ledger,
            RunError::Feed(_) => ErrorKind::Feed,
        }
    }
}

/// Why and where a run stopped early. `bar_index` and `stage` are absent
/// for failures during initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: ErrorKind,
    pub bar_index: Option<usize>,
    pub stage: Option<BarStage>,
    pub message: String,
}

/// Everything a finished (or failed) run leaves behind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_label: String,
    pub state: RunState,
    pub bars_processed: usize,
    /// True when the run ended on a stop request rather than end of stream.
    pub stopped: bool,
    pub fills: Vec<Fill>,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<TradeRecord>,
    pub open_positions: Vec<Position>,
    pub records: Vec<BarRecord>,
    pub report: PerformanceReport,
    pub failure: Option<RunFailure>,
}

impl RunOutcome {
    pub fn is_failed(&self) -> bool {
        self.state == RunState::Failed
    }
}

/// Cooperative stop flag, checked between bars only.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
