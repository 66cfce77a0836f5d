//! Run-wide settings, built once and passed by reference into components.

use crate::analysis::AnalysisConfig;
use crate::execution::ExecutionConfig;
use crate::ledger::LedgerConfig;
use crate::risk::RiskConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineContext {
    /// Label attached to the run's tracing span and outputs.
    pub run_label: String,
    pub risk: RiskConfig,
    pub execution: ExecutionConfig,
    pub ledger: LedgerConfig,
    pub analysis: AnalysisConfig,
}

impl EngineContext {
    pub fn new(run_label: impl Into<String>) -> Self {
        Self {
            run_label: run_label.into(),
            ..Self::default()
        }
    }

    pub fn with_capital(mut self, capital: f64) -> Self {
        self.ledger.initial_capital = capital;
        self
    }
}
