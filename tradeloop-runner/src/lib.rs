//! tradeloop runner: configuration, feeds, backtests, sweeps, paper sessions.
//!
//! This crate builds on `tradeloop-core` to provide:
//! - TOML run configuration with a content-addressed run id
//! - CSV and seeded synthetic bar sources, with indicator annotation
//! - Single backtests and parallel parameter sweeps
//! - Multi-symbol paper sessions over the live executor path
//! - Artifact export (fill ledger, equity curve, report)

pub mod config;
pub mod csv_feed;
pub mod export;
pub mod indicators;
pub mod paper;
pub mod runner;
pub mod sweep;
pub mod synthetic;

pub use config::{ConfigError, RunConfig, RunId};
pub use csv_feed::CsvFeed;
pub use export::{load_artifacts, save_artifacts};
pub use paper::{run_paper, stop_on_ctrl_c, PaperGateway, SymbolFeed};
pub use runner::{
    load_bars, run_backtest, run_backtest_with, run_from_config, BacktestResult, LoadedBars,
    RunnerError, SCHEMA_VERSION,
};
pub use sweep::{run_sweep, GridError, ParamGrid, SweepResults};
pub use synthetic::SyntheticSpec;
