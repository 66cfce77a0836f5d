//! tradeloop CLI: backtests, parameter sweeps and paper sessions.
//!
//! Commands:
//! - `run`: execute a backtest from a TOML config file
//! - `sweep`: run a parameter grid over the same bars and rank by Sharpe
//! - `paper`: drive the live executor against the in-process paper gateway
//! - `strategies`: list registered strategy names

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tradeloop_core::analysis::PerformanceReport;
use tradeloop_core::engine::{RunOutcome, StopSignal};
use tradeloop_core::strategy::StrategyRegistry;
use tradeloop_runner::runner::{load_bars, run_from_config};
use tradeloop_runner::{
    run_paper, run_sweep, save_artifacts, stop_on_ctrl_c, BacktestResult, ParamGrid, RunConfig,
    SymbolFeed,
};

#[derive(Parser)]
#[command(name = "tradeloop", about = "tradeloop: bar-driven trading pipeline")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest from a TOML config file.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// CSV feed overriding `run.feed`.
        #[arg(long)]
        feed: Option<PathBuf>,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        out: PathBuf,

        /// Print the performance report as JSON instead of a summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Sweep strategy parameters over one data set.
    Sweep {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Parameter axis, e.g. `fast_period=5,7,9`. Repeatable.
        #[arg(long = "param", required = true)]
        params: Vec<String>,

        /// Number of ranked results to print.
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Run a paper session, one pipeline per symbol.
    Paper {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Symbol feed as `SYMBOL=path.csv`. Repeatable.
        #[arg(long = "feed", required = true)]
        feeds: Vec<String>,

        /// Simulated gateway latency, overriding `live.latency_ms`.
        #[arg(long)]
        latency_ms: Option<u64>,
    },
    /// List registered strategies.
    Strategies,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Commands::Run {
            config,
            feed,
            out,
            json,
        } => {
            let mut cfg = RunConfig::load(&config)?;
            if feed.is_some() {
                cfg.run.feed = feed;
            }
            let result = run_from_config(&cfg)?;
            if json {
                println!("{}", serde_json::to_string_pretty(result.report())?);
            } else {
                print_summary(&result);
            }
            let dir = save_artifacts(&result, &out)?;
            println!("\nArtifacts saved to: {}", dir.display());
            if result.outcome.is_failed() {
                bail!("run failed: {}", failure_message(&result.outcome));
            }
        }
        Commands::Sweep {
            config,
            params,
            top,
        } => {
            let cfg = RunConfig::load(&config)?;
            let grid = ParamGrid::parse(&params)?;
            let loaded = load_bars(&cfg)?;
            println!(
                "Sweeping {} combinations of '{}' over {} bars...",
                grid.size(),
                cfg.strategy.name,
                loaded.bars.len()
            );
            let results = run_sweep(&cfg, &grid, &loaded.bars)?;
            print_sweep(results.top_n(top), results.skipped());
            if loaded.has_synthetic {
                println!("\nWARNING: Results based on SYNTHETIC data");
            }
        }
        Commands::Paper {
            config,
            feeds,
            latency_ms,
        } => {
            let mut cfg = RunConfig::load(&config)?;
            if let Some(ms) = latency_ms {
                cfg.live.latency_ms = ms;
            }
            let feeds = feeds
                .iter()
                .map(|s| SymbolFeed::parse(s))
                .collect::<Result<Vec<_>>>()?;
            let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
            let outcomes = runtime.block_on(async {
                let stop = StopSignal::new();
                let watcher = stop_on_ctrl_c(stop.clone());
                let outcomes = run_paper(&cfg, &feeds, stop).await;
                watcher.abort();
                outcomes
            })?;
            for (sf, outcome) in feeds.iter().zip(&outcomes) {
                print_outcome(&sf.symbol, outcome);
            }
            let failed = outcomes.iter().filter(|o| o.is_failed()).count();
            if failed > 0 {
                bail!("{failed} of {} paper pipelines failed", outcomes.len());
            }
        }
        Commands::Strategies => {
            for name in StrategyRegistry::with_builtins().names() {
                println!("{name}");
            }
        }
    }

    Ok(())
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn failure_message(outcome: &RunOutcome) -> String {
    match &outcome.failure {
        Some(f) => match f.bar_index {
            Some(i) => format!("{} at bar {i}", f.message),
            None => f.message.clone(),
        },
        None => "unknown failure".to_string(),
    }
}

fn print_report(report: &PerformanceReport) {
    println!("--- Performance ---");
    println!("Initial Capital: {:.0}", report.initial_capital);
    println!("Final Equity:    {:.0}", report.final_equity);
    println!("Total Return:    {:.2}%", report.total_return_pct);
    println!("Benchmark:       {:.2}%", report.benchmark_return * 100.0);
    println!("Excess Return:   {:.2}%", report.excess_return * 100.0);
    match report.sharpe {
        Some(s) => println!("Sharpe:          {s:.3}"),
        None => println!("Sharpe:          n/a"),
    }
    println!("Max Drawdown:    {:.2}%", report.max_drawdown * 100.0);
    println!(
        "Trades:          {} ({} won, {} lost)",
        report.total_trades, report.winning_trades, report.losing_trades
    );
    println!("Win Rate:        {:.1}%", report.win_rate * 100.0);
    println!("Profit Factor:   {:.2}", report.profit_factor);
    println!("Avg Win/Loss:    {:.0} / {:.0}", report.avg_win, report.avg_loss);
    println!("Max Consec Loss: {}", report.max_consecutive_losses);
    println!("Total Fees:      {:.0}", report.total_fees);
}

fn print_summary(result: &BacktestResult) {
    println!();
    println!("=== Backtest Result ===");
    println!("Run:            {}", result.outcome.run_label);
    println!("Symbol:         {}", result.symbol);
    println!("Strategy:       {}", result.strategy);
    println!(
        "Bars:           {} of {} processed",
        result.outcome.bars_processed, result.bar_count
    );
    println!("State:          {}", result.outcome.state);
    println!("Fills:          {}", result.outcome.fills.len());
    println!();
    print_report(result.report());
    if result.has_synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    if result.outcome.is_failed() {
        println!("ERROR: {}", failure_message(&result.outcome));
    }
}

fn print_sweep(ranked: &[BacktestResult], skipped: usize) {
    println!();
    println!(
        "{:<4} {:<14} {:>9} {:>10} {:>9} {:>7}  params",
        "#", "run", "sharpe", "return%", "maxdd%", "trades"
    );
    for (i, r) in ranked.iter().enumerate() {
        let report = r.report();
        let sharpe = report
            .sharpe
            .map(|s| format!("{s:.3}"))
            .unwrap_or_else(|| "n/a".to_string());
        let params = r
            .config
            .strategy
            .params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "{:<4} {:<14} {:>9} {:>10.2} {:>9.2} {:>7}  {}",
            i + 1,
            r.config.short_id(),
            sharpe,
            report.total_return_pct,
            report.max_drawdown * 100.0,
            report.total_trades,
            params
        );
    }
    if skipped > 0 {
        println!("\n{skipped} combinations rejected by the strategy factory");
    }
}

fn print_outcome(symbol: &str, outcome: &RunOutcome) {
    println!();
    println!("=== Paper Session: {symbol} ===");
    println!("State:          {}", outcome.state);
    println!("Bars:           {}", outcome.bars_processed);
    if outcome.stopped {
        println!("Stopped:        on request");
    }
    println!("Fills:          {}", outcome.fills.len());
    println!("Open Positions: {}", outcome.open_positions.len());
    println!();
    print_report(&outcome.report);
    if outcome.is_failed() {
        println!("ERROR: {}", failure_message(outcome));
    }
}
