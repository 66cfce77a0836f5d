//! Serializable run configuration, loaded from TOML.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tradeloop_core::analysis::AnalysisConfig;
use tradeloop_core::engine::EngineContext;
use tradeloop_core::execution::ExecutionConfig;
use tradeloop_core::ledger::LedgerConfig;
use tradeloop_core::risk::{RiskConfig, SizingPolicy, StopLossPolicy};
use tradeloop_core::strategy::{FactoryError, Strategy, StrategyParams, StrategyRegistry};

/// Content-addressable run identifier (blake3 hex).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {field} {reason}")]
    Invalid { field: String, reason: String },
    #[error(transparent)]
    Strategy(#[from] FactoryError),
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.into(),
    }
}

// ─── Sections ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub symbol: String,
    pub initial_capital: f64,
    pub leverage: f64,
    /// Equity at or below this is a margin call that fails the run.
    pub maintenance_equity: f64,
    /// Annualization factor for Sharpe.
    pub bars_per_year: f64,
    /// CSV feed path. Synthetic bars are generated when absent.
    pub feed: Option<PathBuf>,
    pub synthetic_bars: usize,
    pub seed: u64,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            symbol: "BTC_JPY".to_string(),
            initial_capital: 1_000_000.0,
            leverage: 1.0,
            maintenance_equity: 0.0,
            bars_per_year: 8760.0,
            feed: None,
            synthetic_bars: 2_000,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategySection {
    pub name: String,
    pub params: StrategyParams,
}

impl Default for StrategySection {
    fn default() -> Self {
        Self {
            name: "ma_crossover".to_string(),
            params: StrategyParams::new(),
        }
    }
}

/// Paper/live session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveSection {
    pub ack_timeout_ms: u64,
    /// Simulated gateway round-trip for paper sessions.
    pub latency_ms: u64,
    pub client_prefix: String,
}

impl Default for LiveSection {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 5_000,
            latency_ms: 50,
            client_prefix: "PAPER".to_string(),
        }
    }
}

// ─── RunConfig ───────────────────────────────────────────────────────

/// Everything needed to reproduce a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub run: RunSection,
    pub strategy: StrategySection,
    pub risk: RiskConfig,
    pub execution: ExecutionConfig,
    pub live: LiveSection,
}

impl RunConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let run = &self.run;
        if !(run.initial_capital.is_finite() && run.initial_capital > 0.0) {
            return Err(invalid("run.initial_capital", "must be > 0"));
        }
        if !(run.leverage.is_finite() && run.leverage > 0.0) {
            return Err(invalid("run.leverage", "must be > 0"));
        }
        if !(run.maintenance_equity.is_finite() && run.maintenance_equity >= 0.0) {
            return Err(invalid("run.maintenance_equity", "must be >= 0"));
        }
        if run.maintenance_equity >= run.initial_capital {
            return Err(invalid(
                "run.maintenance_equity",
                "must be below run.initial_capital",
            ));
        }
        if !(run.bars_per_year > 0.0) {
            return Err(invalid("run.bars_per_year", "must be > 0"));
        }

        let exec = &self.execution;
        if exec.maker_fee < 0.0 || exec.taker_fee < 0.0 {
            return Err(invalid("execution", "fees must be >= 0"));
        }

        let risk = &self.risk;
        match risk.sizing {
            SizingPolicy::FixedPercentage { risk_per_trade } => {
                fraction("risk.sizing.risk_per_trade", risk_per_trade)?
            }
            SizingPolicy::FixedAmount { amount } => {
                if !(amount > 0.0) {
                    return Err(invalid("risk.sizing.amount", "must be > 0"));
                }
            }
            SizingPolicy::Kelly {
                max_fraction,
                fallback_fraction,
                ..
            } => {
                fraction("risk.sizing.max_fraction", max_fraction)?;
                fraction("risk.sizing.fallback_fraction", fallback_fraction)?;
            }
        }
        fraction("risk.max_drawdown_percentage", risk.max_drawdown_percentage)?;
        fraction("risk.margin_call_level", risk.margin_call_level)?;
        if risk.max_open_positions == 0 {
            return Err(invalid("risk.max_open_positions", "must be >= 1"));
        }
        if !(risk.max_position_size > 0.0) {
            return Err(invalid("risk.max_position_size", "must be > 0"));
        }
        if risk.min_order_size < 0.0 || risk.quantity_step < 0.0 {
            return Err(invalid("risk", "order size increments must be >= 0"));
        }
        Ok(())
    }

    /// Deterministic blake3 hash of the canonical JSON form.
    ///
    /// Two runs with identical configs share a RunId.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }

    /// Short form of [`run_id`](Self::run_id) used in labels and directory names.
    pub fn short_id(&self) -> String {
        self.run_id().chars().take(12).collect()
    }

    pub fn engine_context(&self) -> EngineContext {
        EngineContext {
            run_label: format!("{}-{}", self.strategy.name, self.short_id()),
            risk: self.risk.clone(),
            execution: self.execution.clone(),
            ledger: LedgerConfig {
                initial_capital: self.run.initial_capital,
                leverage: self.run.leverage,
                maintenance_equity: self.run.maintenance_equity,
            },
            analysis: AnalysisConfig {
                bars_per_year: self.run.bars_per_year,
            },
        }
    }

    pub fn build_strategy(
        &self,
        registry: &StrategyRegistry,
    ) -> Result<Box<dyn Strategy>, ConfigError> {
        Ok(registry.create(&self.strategy.name, &self.strategy.params)?)
    }

    /// Indicator fields a raw-OHLCV feed must be annotated with.
    pub fn indicator_fields(&self, strategy: &dyn Strategy) -> Vec<String> {
        let mut fields = strategy.required_indicators();
        if let StopLossPolicy::Atr { field, .. } = &self.risk.stop_loss {
            fields.push(field.clone());
        }
        if self.strategy.name == "grid" {
            fields.push("atr".to_string());
        }
        fields.sort();
        fields.dedup();
        fields
    }

    /// Copy with one strategy parameter replaced.
    pub fn with_param(&self, name: &str, value: f64) -> Self {
        let mut next = self.clone();
        next.strategy.params.insert(name.to_string(), value);
        next
    }
}

fn fraction(field: &str, v: f64) -> Result<(), ConfigError> {
    if v > 0.0 && v <= 1.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be in (0, 1], got {v}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[run]
symbol = "BTC_JPY"
initial_capital = 1000000.0
bars_per_year = 8760

[strategy]
name = "ma_crossover"
params = { fast_period = 7, slow_period = 25, confirmation_bars = 1 }

[risk]
sizing = { type = "fixed_percentage", risk_per_trade = 0.02 }
stop_loss = { type = "percentage", pct = 0.02 }
take_profit = { type = "risk_reward", ratio = 2.0 }
max_position_size = 0.1
max_open_positions = 3
max_drawdown_percentage = 0.20
margin_call_level = 0.05

[execution]
maker_fee = 0.0005
taker_fee = 0.0009
slippage = { type = "percentage", value = 0.0001 }
reference_price = "close"
"#;

    #[test]
    fn parses_full_sample() {
        let cfg = RunConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.run.symbol, "BTC_JPY");
        assert_eq!(cfg.run.bars_per_year, 8760.0);
        assert_eq!(cfg.strategy.params.get("fast_period"), Some(&7.0));
        assert_eq!(cfg.risk.max_open_positions, 3);
        assert_eq!(cfg.execution.taker_fee, 0.0009);
        assert_eq!(cfg.live, LiveSection::default());
    }

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = RunConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, RunConfig::default());
    }

    #[test]
    fn test_run_id_deterministic() {
        let cfg = RunConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.run_id(), cfg.clone().run_id());
        assert_eq!(cfg.run_id().len(), 64);
    }

    #[test]
    fn test_run_id_changes_with_params() {
        let cfg = RunConfig::from_toml_str(SAMPLE).unwrap();
        let other = cfg.with_param("fast_period", 9.0);
        assert_ne!(cfg.run_id(), other.run_id());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = RunConfig::default();
        cfg.execution.maker_fee = -0.001;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { .. })));

        let mut cfg = RunConfig::default();
        cfg.risk.sizing = SizingPolicy::FixedPercentage { risk_per_trade: 1.5 };
        assert!(cfg.validate().is_err());

        let mut cfg = RunConfig::default();
        cfg.risk.max_open_positions = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = RunConfig::default();
        cfg.run.initial_capital = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = RunConfig::default();
        cfg.run.maintenance_equity = -1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = RunConfig::default();
        cfg.run.maintenance_equity = cfg.run.initial_capital;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn maintenance_equity_reaches_the_ledger() {
        let cfg = RunConfig::from_toml_str(
            r#"
[run]
initial_capital = 500000.0
leverage = 2.0
maintenance_equity = 250000.0
"#,
        )
        .unwrap();
        let ledger = cfg.engine_context().ledger;
        assert_eq!(ledger.maintenance_equity, 250_000.0);
        assert_eq!(ledger.leverage, 2.0);
        assert_eq!(RunConfig::default().engine_context().ledger.maintenance_equity, 0.0);
    }

    #[test]
    fn context_carries_sections() {
        let cfg = RunConfig::from_toml_str(SAMPLE).unwrap();
        let ctx = cfg.engine_context();
        assert_eq!(ctx.ledger.initial_capital, 1_000_000.0);
        assert_eq!(ctx.analysis.bars_per_year, 8760.0);
        assert!(ctx.run_label.starts_with("ma_crossover-"));
    }

    #[test]
    fn indicator_fields_follow_strategy_and_stop() {
        let mut cfg = RunConfig::default();
        cfg.risk.stop_loss = StopLossPolicy::Atr {
            multiplier: 2.0,
            field: "atr_14".into(),
        };
        let strategy = cfg.build_strategy(&StrategyRegistry::with_builtins()).unwrap();
        assert_eq!(
            cfg.indicator_fields(strategy.as_ref()),
            vec!["atr_14", "sma_25", "sma_7"]
        );
    }

    #[test]
    fn unknown_strategy_surfaces_factory_error() {
        let mut cfg = RunConfig::default();
        cfg.strategy.name = "nope".into();
        assert!(matches!(
            cfg.build_strategy(&StrategyRegistry::with_builtins()),
            Err(ConfigError::Strategy(_))
        ));
    }
}
