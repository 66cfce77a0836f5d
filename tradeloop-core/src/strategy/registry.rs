//! Strategy registry: maps names to factories.
//!
//! The orchestrator only ever sees `Box<dyn Strategy>`, so new variants are
//! added by registering a factory, never by touching the engine.

use super::{
    param, param_bool, param_usize, ChannelBreakout, GridTrading, LearnedModel, MaCrossover,
    MaType, MacdRsi, MultiTimeframe, Strategy, StrategyParams,
};
use super::learned::LearnedParams;
use std::collections::BTreeMap;
use std::sync::Arc;

// ─── Error type ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FactoryError {
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },
}

pub type StrategyFactory =
    Arc<dyn Fn(&StrategyParams) -> Result<Box<dyn Strategy>, FactoryError> + Send + Sync>;

/// Name → factory table. Cheap to clone and safe to share across threads.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    factories: BTreeMap<String, StrategyFactory>,
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with every built-in strategy.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register("ma_crossover", create_ma_crossover);
        reg.register("macd_rsi", create_macd_rsi);
        reg.register("breakout", create_breakout);
        reg.register("grid", create_grid);
        reg.register("multi_timeframe", create_multi_timeframe);
        reg.register("learned_model", create_learned_model);
        reg
    }

    /// Adds or replaces the factory for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&StrategyParams) -> Result<Box<dyn Strategy>, FactoryError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn create(
        &self,
        name: &str,
        params: &StrategyParams,
    ) -> Result<Box<dyn Strategy>, FactoryError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| FactoryError::UnknownStrategy(name.to_string()))?;
        factory(params)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> FactoryError {
    FactoryError::InvalidParam {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn positive(params: &StrategyParams, name: &str, default: f64) -> Result<f64, FactoryError> {
    let v = param(params, name, default);
    if v.is_finite() && v > 0.0 {
        Ok(v)
    } else {
        Err(invalid(name, format!("must be > 0, got {v}")))
    }
}

// ─── Built-in factories ──────────────────────────────────────────────

fn create_ma_crossover(p: &StrategyParams) -> Result<Box<dyn Strategy>, FactoryError> {
    let fast = param_usize(p, "fast_period", 7);
    let slow = param_usize(p, "slow_period", 25);
    if fast == 0 {
        return Err(invalid("fast_period", "must be >= 1"));
    }
    if slow <= fast {
        return Err(invalid("slow_period", "must be > fast_period"));
    }
    let ma_type = if param(p, "ma_type", 0.0) == 1.0 {
        MaType::Ema
    } else {
        MaType::Sma
    };
    let confirmation = param_usize(p, "confirmation_bars", 1);
    Ok(Box::new(MaCrossover::new(fast, slow, ma_type, confirmation)))
}

fn create_macd_rsi(p: &StrategyParams) -> Result<Box<dyn Strategy>, FactoryError> {
    let oversold = param(p, "rsi_oversold", 30.0);
    let overbought = param(p, "rsi_overbought", 70.0);
    if oversold >= overbought {
        return Err(invalid("rsi_oversold", "must be below rsi_overbought"));
    }
    let threshold = param(p, "macd_threshold", 0.0);
    Ok(Box::new(MacdRsi::new(oversold, overbought, threshold)))
}

fn create_breakout(p: &StrategyParams) -> Result<Box<dyn Strategy>, FactoryError> {
    let lookback = param_usize(p, "lookback", 20);
    if lookback == 0 {
        return Err(invalid("lookback", "must be >= 1"));
    }
    Ok(Box::new(ChannelBreakout::new(lookback)))
}

fn create_grid(p: &StrategyParams) -> Result<Box<dyn Strategy>, FactoryError> {
    let count = param_usize(p, "grid_count", 10);
    if count < 2 {
        return Err(invalid("grid_count", "must be >= 2"));
    }
    Ok(Box::new(GridTrading::new(
        count,
        positive(p, "grid_spacing_pct", 1.0)?,
        positive(p, "rebalance_threshold_pct", 5.0)?,
        param_bool(p, "volatility_adjustment", true),
    )))
}

fn create_multi_timeframe(p: &StrategyParams) -> Result<Box<dyn Strategy>, FactoryError> {
    let tf = param_usize(p, "tf_minutes", 240);
    if tf == 0 {
        return Err(invalid("tf_minutes", "must be >= 1"));
    }
    let fast = param_usize(p, "ma_fast", 20).max(1);
    let slow = param_usize(p, "ma_slow", 50).max(1);
    let trend = param_usize(p, "ma_trend", 200).max(1);
    Ok(Box::new(MultiTimeframe::new(
        tf as i64,
        fast,
        slow,
        trend,
        param(p, "min_trend_strength", 0.3),
    )))
}

fn create_learned_model(p: &StrategyParams) -> Result<Box<dyn Strategy>, FactoryError> {
    let d = LearnedParams::default();
    let threshold = param(p, "prediction_threshold", d.prediction_threshold);
    if !(0.5..1.0).contains(&threshold) {
        return Err(invalid("prediction_threshold", "must be in [0.5, 1.0)"));
    }
    Ok(Box::new(LearnedModel::new(LearnedParams {
        lookahead: param_usize(p, "lookahead", d.lookahead).max(1),
        prediction_threshold: threshold,
        min_data_points: param_usize(p, "min_data_points", d.min_data_points).max(2),
        retrain_interval: param_usize(p, "retrain_interval", d.retrain_interval).max(1),
        learning_rate: positive(p, "learning_rate", d.learning_rate)?,
        epochs: param_usize(p, "epochs", d.epochs),
        max_training_rows: param_usize(p, "max_training_rows", d.max_training_rows).max(2),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, f64)]) -> StrategyParams {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn builtins_are_registered_sorted() {
        let reg = StrategyRegistry::with_builtins();
        assert_eq!(
            reg.names(),
            vec![
                "breakout",
                "grid",
                "learned_model",
                "ma_crossover",
                "macd_rsi",
                "multi_timeframe"
            ]
        );
    }

    #[test]
    fn every_builtin_builds_with_defaults() {
        let reg = StrategyRegistry::with_builtins();
        for name in reg.names() {
            let s = reg.create(&name, &StrategyParams::new()).unwrap();
            assert_eq!(s.name(), name);
        }
    }

    #[test]
    fn unknown_strategy_errors() {
        let reg = StrategyRegistry::with_builtins();
        assert_eq!(
            reg.create("nope", &StrategyParams::new()).err().unwrap(),
            FactoryError::UnknownStrategy("nope".into())
        );
    }

    #[test]
    fn params_flow_into_required_fields() {
        let reg = StrategyRegistry::with_builtins();
        let s = reg
            .create("ma_crossover", &params(&[("fast_period", 5.0), ("slow_period", 20.0)]))
            .unwrap();
        assert_eq!(s.required_indicators(), vec!["sma_5", "sma_20"]);
    }

    #[test]
    fn invalid_params_are_rejected() {
        let reg = StrategyRegistry::with_builtins();
        let err = reg
            .create("ma_crossover", &params(&[("fast_period", 30.0), ("slow_period", 20.0)]))
            .err().unwrap();
        assert!(matches!(err, FactoryError::InvalidParam { ref name, .. } if name == "slow_period"));
    }

    #[test]
    fn custom_factory_can_be_registered() {
        let mut reg = StrategyRegistry::new();
        reg.register("my_grid", |_p: &StrategyParams| -> Result<Box<dyn Strategy>, FactoryError> {
            Ok(Box::new(GridTrading::default_params()))
        });
        assert!(reg.contains("my_grid"));
        assert_eq!(reg.create("my_grid", &StrategyParams::new()).unwrap().name(), "grid");
    }
}
