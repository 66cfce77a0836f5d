//! Parameter sweeps: cartesian grids over strategy parameters, run with rayon.

use std::collections::HashMap;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

use tradeloop_core::domain::Bar;
use tradeloop_core::strategy::StrategyRegistry;

use crate::config::RunConfig;
use crate::runner::{run_backtest_with, BacktestResult, RunnerError};

#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("expected name=v1,v2,... but got '{0}'")]
    Syntax(String),
    #[error("parameter '{name}': '{value}' is not a number")]
    Value { name: String, value: String },
}

/// Parameter grid: each axis is a parameter name and the values to try.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamGrid {
    axes: Vec<(String, Vec<f64>)>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn axis(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.axes.push((name.into(), values));
        self
    }

    /// Parses CLI specs of the form `fast_period=5,7,9`.
    pub fn parse<S: AsRef<str>>(specs: &[S]) -> Result<Self, GridError> {
        let mut grid = Self::new();
        for spec in specs {
            let spec = spec.as_ref();
            let (name, values) = spec
                .split_once('=')
                .ok_or_else(|| GridError::Syntax(spec.to_string()))?;
            let name = name.trim();
            if name.is_empty() || values.trim().is_empty() {
                return Err(GridError::Syntax(spec.to_string()));
            }
            let values = values
                .split(',')
                .map(|v| {
                    v.trim().parse::<f64>().map_err(|_| GridError::Value {
                        name: name.to_string(),
                        value: v.trim().to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            grid = grid.axis(name, values);
        }
        Ok(grid)
    }

    /// Total number of combinations.
    pub fn size(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.iter().map(|(_, v)| v.len()).product()
    }

    /// Cartesian product applied on top of `base`, first axis slowest.
    pub fn generate_configs(&self, base: &RunConfig) -> Vec<RunConfig> {
        if self.axes.is_empty() {
            return Vec::new();
        }
        let mut configs = vec![base.clone()];
        for (name, values) in &self.axes {
            configs = configs
                .iter()
                .flat_map(|cfg| values.iter().map(move |&v| cfg.with_param(name, v)))
                .collect();
        }
        configs
    }
}

/// Runs every grid configuration against the same bars in parallel.
///
/// Combinations the strategy factory rejects (e.g. fast period not below
/// slow period) are skipped. Any other error aborts the sweep.
pub fn run_sweep(
    base: &RunConfig,
    grid: &ParamGrid,
    bars: &[Bar],
) -> Result<SweepResults, RunnerError> {
    let registry = StrategyRegistry::with_builtins();
    let configs = grid.generate_configs(base);
    info!(combinations = configs.len(), "starting sweep");

    let outcomes: Vec<Result<BacktestResult, RunnerError>> = configs
        .par_iter()
        .map(|cfg| run_backtest_with(cfg, &registry, bars.to_vec()))
        .collect();

    let mut results = Vec::with_capacity(outcomes.len());
    let mut skipped = 0;
    for outcome in outcomes {
        match outcome {
            Ok(r) => results.push(r),
            Err(RunnerError::Config(crate::config::ConfigError::Strategy(e))) => {
                warn!(error = %e, "skipping combination");
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    info!(completed = results.len(), skipped, "sweep finished");
    Ok(SweepResults::new(results, skipped))
}

/// Results from a parameter sweep, ranked by Sharpe.
#[derive(Debug)]
pub struct SweepResults {
    results: Vec<BacktestResult>,
    by_run_id: HashMap<String, usize>,
    skipped: usize,
}

impl SweepResults {
    fn new(mut results: Vec<BacktestResult>, skipped: usize) -> Self {
        results.sort_by(|a, b| b.sharpe_or_min().total_cmp(&a.sharpe_or_min()));
        let by_run_id = results
            .iter()
            .enumerate()
            .map(|(i, r)| (r.run_id.clone(), i))
            .collect();
        Self {
            results,
            by_run_id,
            skipped,
        }
    }

    /// All results, best Sharpe first.
    pub fn ranked(&self) -> &[BacktestResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn get(&self, run_id: &str) -> Option<&BacktestResult> {
        self.by_run_id.get(run_id).map(|&i| &self.results[i])
    }

    pub fn best(&self) -> Option<&BacktestResult> {
        self.results.first()
    }

    pub fn top_n(&self, n: usize) -> &[BacktestResult] {
        &self.results[..n.min(self.results.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{generate, SyntheticSpec};

    #[test]
    fn parse_accepts_cli_specs() {
        let grid = ParamGrid::parse(&["fast_period=5,7", "slow_period = 20, 25, 30"]).unwrap();
        assert_eq!(grid.size(), 6);
    }

    #[test]
    fn parse_rejects_bad_specs() {
        assert_eq!(
            ParamGrid::parse(&["fast_period"]),
            Err(GridError::Syntax("fast_period".into()))
        );
        assert!(matches!(
            ParamGrid::parse(&["fast_period=5,x"]),
            Err(GridError::Value { .. })
        ));
    }

    #[test]
    fn generate_configs_is_cartesian() {
        let grid = ParamGrid::new()
            .axis("fast_period", vec![5.0, 7.0])
            .axis("slow_period", vec![20.0, 30.0, 40.0]);
        let configs = grid.generate_configs(&RunConfig::default());
        assert_eq!(configs.len(), 6);
        assert_eq!(configs[0].strategy.params["fast_period"], 5.0);
        assert_eq!(configs[0].strategy.params["slow_period"], 20.0);
        assert_eq!(configs[5].strategy.params["fast_period"], 7.0);
        assert_eq!(configs[5].strategy.params["slow_period"], 40.0);
    }

    #[test]
    fn empty_grid_generates_nothing() {
        assert_eq!(ParamGrid::new().size(), 0);
        assert!(ParamGrid::new().generate_configs(&RunConfig::default()).is_empty());
    }

    #[test]
    fn sweep_ranks_by_sharpe_and_skips_invalid_combinations() {
        let bars = generate(&SyntheticSpec::hourly("BTC_JPY", 400, 3));
        let grid = ParamGrid::new()
            .axis("fast_period", vec![5.0, 30.0])
            .axis("slow_period", vec![20.0, 40.0]);
        let results = run_sweep(&RunConfig::default(), &grid, &bars).unwrap();

        // fast=30, slow=20 is rejected by the factory.
        assert_eq!(results.skipped(), 1);
        assert_eq!(results.len(), 3);
        let sharpes: Vec<f64> = results.ranked().iter().map(|r| r.sharpe_or_min()).collect();
        assert!(sharpes.windows(2).all(|w| w[0] >= w[1]));
        let best = results.best().unwrap();
        assert!(results.get(&best.run_id).is_some());
    }
}
