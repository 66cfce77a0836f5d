//! Backtest runner: wires configuration, bars and the orchestrator together.
//!
//! Two entry points:
//! - `run_from_config()`: loads bars (CSV or synthetic), then runs. Used by the CLI.
//! - `run_backtest()`: takes pre-loaded bars. Used by sweeps and tests.

use futures::executor::block_on;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use tradeloop_core::analysis::PerformanceReport;
use tradeloop_core::domain::Bar;
use tradeloop_core::engine::{Orchestrator, RunOutcome, StopSignal};
use tradeloop_core::execution::SimulatedExecutor;
use tradeloop_core::feed::{FeedError, VecFeed};
use tradeloop_core::risk::PositionGauge;
use tradeloop_core::strategy::StrategyRegistry;

use crate::config::{ConfigError, RunConfig};
use crate::csv_feed::CsvFeed;
use crate::indicators::{annotate, IndicatorError};
use crate::synthetic::{generate, SyntheticSpec};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),
    #[error("indicator error: {0}")]
    Indicator(#[from] IndicatorError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: String,
    pub symbol: String,
    pub strategy: String,
    pub bar_count: usize,
    pub has_synthetic: bool,
    pub config: RunConfig,
    pub outcome: RunOutcome,
}

impl BacktestResult {
    pub fn report(&self) -> &PerformanceReport {
        &self.outcome.report
    }

    /// Sharpe for ranking; runs without one sort last.
    pub fn sharpe_or_min(&self) -> f64 {
        self.outcome.report.sharpe.unwrap_or(f64::NEG_INFINITY)
    }
}

/// Bars plus where they came from.
#[derive(Debug, Clone)]
pub struct LoadedBars {
    pub bars: Vec<Bar>,
    pub has_synthetic: bool,
}

/// Reads the configured CSV feed, or generates a synthetic walk when none is set.
pub fn load_bars(config: &RunConfig) -> Result<LoadedBars, RunnerError> {
    match &config.run.feed {
        Some(path) => {
            let bars = CsvFeed::open(path, config.run.symbol.clone())?.read_all()?;
            info!(path = %path.display(), bars = bars.len(), "loaded csv feed");
            Ok(LoadedBars {
                bars,
                has_synthetic: false,
            })
        }
        None => {
            let spec = SyntheticSpec::hourly(
                config.run.symbol.clone(),
                config.run.synthetic_bars,
                config.run.seed,
            );
            warn!(symbol = %spec.symbol, bars = spec.bars, "no feed configured, using synthetic bars");
            Ok(LoadedBars {
                bars: generate(&spec),
                has_synthetic: true,
            })
        }
    }
}

pub fn run_from_config(config: &RunConfig) -> Result<BacktestResult, RunnerError> {
    let loaded = load_bars(config)?;
    let mut result = run_backtest(config, loaded.bars)?;
    result.has_synthetic = loaded.has_synthetic;
    Ok(result)
}

/// Runs one backtest with the built-in strategies.
pub fn run_backtest(config: &RunConfig, bars: Vec<Bar>) -> Result<BacktestResult, RunnerError> {
    run_backtest_with(config, &StrategyRegistry::with_builtins(), bars)
}

/// Runs one backtest against a caller-supplied registry.
///
/// Missing indicator columns are computed before the run; warm-up bars
/// reach the orchestrator as recoverable `InsufficientData`.
pub fn run_backtest_with(
    config: &RunConfig,
    registry: &StrategyRegistry,
    mut bars: Vec<Bar>,
) -> Result<BacktestResult, RunnerError> {
    config.validate()?;
    let ctx = config.engine_context();
    let strategy = config.build_strategy(registry)?;
    let fields = config.indicator_fields(strategy.as_ref());
    annotate(&mut bars, &fields)?;
    let warm = strategy.required_indicators();
    let bar_count = bars.len();

    info!(
        run = %ctx.run_label,
        strategy = %config.strategy.name,
        bars = bar_count,
        "starting backtest"
    );
    let orchestrator = Orchestrator::new(
        &ctx,
        VecFeed::new(bars).with_warm_fields(warm),
        strategy,
        SimulatedExecutor::new(&ctx),
        PositionGauge::new(ctx.risk.max_open_positions),
    );
    let outcome = block_on(orchestrator.run(&StopSignal::new()));
    info!(
        run = %ctx.run_label,
        state = %outcome.state,
        fills = outcome.fills.len(),
        final_equity = outcome.report.final_equity,
        "backtest finished"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id: config.run_id(),
        symbol: config.run.symbol.clone(),
        strategy: config.strategy.name.clone(),
        bar_count,
        has_synthetic: false,
        config: config.clone(),
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradeloop_core::engine::RunState;

    fn synthetic_config(strategy: &str) -> RunConfig {
        let mut cfg = RunConfig::default();
        cfg.strategy.name = strategy.to_string();
        cfg.run.synthetic_bars = 600;
        cfg
    }

    #[test]
    fn every_builtin_runs_on_synthetic_bars() {
        for name in StrategyRegistry::with_builtins().names() {
            let result = run_from_config(&synthetic_config(&name)).unwrap();
            assert!(result.has_synthetic);
            assert_eq!(result.bar_count, 600);
            assert_eq!(result.outcome.state, RunState::Completed, "{name}");
            assert_eq!(result.outcome.equity_curve.len(), 600, "{name}");
        }
    }

    #[test]
    fn identical_configs_replay_identically() {
        let cfg = synthetic_config("ma_crossover");
        let a = run_from_config(&cfg).unwrap();
        let b = run_from_config(&cfg).unwrap();
        assert_eq!(a.run_id, b.run_id);
        assert_eq!(a.outcome.fills, b.outcome.fills);
        assert_eq!(a.outcome.equity_curve, b.outcome.equity_curve);
    }

    #[test]
    fn invalid_config_is_rejected_before_running() {
        let mut cfg = synthetic_config("grid");
        cfg.risk.max_open_positions = 0;
        assert!(matches!(
            run_from_config(&cfg),
            Err(RunnerError::Config(ConfigError::Invalid { .. }))
        ));
    }
}
