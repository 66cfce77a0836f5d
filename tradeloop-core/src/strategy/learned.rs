//! Learned-model strategy: logistic regression retrained on its own history.
//!
//! Each bar becomes a feature row. A row is labelled once `lookahead` more
//! bars have arrived (1 if the close rose over that span), so training never
//! sees the future relative to the bar being predicted. The model is fitted
//! with full-batch gradient descent from zero weights, which keeps replays
//! deterministic.

use super::{check_prices, read_fields, Evaluation, Fields, Strategy, StrategyError};
use crate::domain::{AccountState, Bar, Position, PositionSide, Rationale, SignalKind};
use std::collections::VecDeque;
use tracing::debug;

const N_FEATURES: usize = 6;
const FEATURE_NAMES: [&str; N_FEATURES] = [
    "return_1",
    "return_5",
    "rsi_norm",
    "macd_hist_pct",
    "high_low_range",
    "close_position",
];

type Row = [f64; N_FEATURES];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearnedParams {
    pub lookahead: usize,
    pub prediction_threshold: f64,
    pub min_data_points: usize,
    pub retrain_interval: usize,
    pub learning_rate: f64,
    pub epochs: usize,
    pub max_training_rows: usize,
}

impl Default for LearnedParams {
    fn default() -> Self {
        Self {
            lookahead: 5,
            prediction_threshold: 0.6,
            min_data_points: 100,
            retrain_interval: 1000,
            learning_rate: 0.5,
            epochs: 200,
            max_training_rows: 5000,
        }
    }
}

/// Standardised logistic model.
#[derive(Debug, Clone, PartialEq)]
struct Model {
    mean: Row,
    scale: Row,
    weights: Row,
    bias: f64,
}

impl Model {
    fn standardize(&self, x: &Row) -> Row {
        let mut z = [0.0; N_FEATURES];
        for i in 0..N_FEATURES {
            z[i] = if self.scale[i] > 1e-12 {
                (x[i] - self.mean[i]) / self.scale[i]
            } else {
                0.0
            };
        }
        z
    }

    fn predict(&self, x: &Row) -> f64 {
        let z = self.standardize(x);
        let logit: f64 = self.bias + z.iter().zip(&self.weights).map(|(a, w)| a * w).sum::<f64>();
        sigmoid(logit)
    }

    fn fit(rows: &[(Row, f64)], learning_rate: f64, epochs: usize) -> Self {
        let n = rows.len().max(1) as f64;
        let mut mean = [0.0; N_FEATURES];
        let mut scale = [0.0; N_FEATURES];
        for (x, _) in rows {
            for i in 0..N_FEATURES {
                mean[i] += x[i] / n;
            }
        }
        for (x, _) in rows {
            for i in 0..N_FEATURES {
                scale[i] += (x[i] - mean[i]).powi(2) / n;
            }
        }
        for s in &mut scale {
            *s = s.sqrt();
        }

        let mut model = Model {
            mean,
            scale,
            weights: [0.0; N_FEATURES],
            bias: 0.0,
        };
        let standardized: Vec<(Row, f64)> =
            rows.iter().map(|(x, y)| (model.standardize(x), *y)).collect();

        for _ in 0..epochs {
            let mut grad_w = [0.0; N_FEATURES];
            let mut grad_b = 0.0;
            for (z, y) in &standardized {
                let logit = model.bias
                    + z.iter().zip(&model.weights).map(|(a, w)| a * w).sum::<f64>();
                let err = sigmoid(logit) - y;
                for i in 0..N_FEATURES {
                    grad_w[i] += err * z[i] / n;
                }
                grad_b += err / n;
            }
            for i in 0..N_FEATURES {
                model.weights[i] -= learning_rate * grad_w[i];
            }
            model.bias -= learning_rate * grad_b;
        }
        model
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[derive(Debug, Clone)]
pub struct LearnedModel {
    pub params: LearnedParams,
    closes: VecDeque<f64>,
    pending: VecDeque<(Row, f64)>,
    training: VecDeque<(Row, f64)>,
    model: Option<Model>,
    bars_since_train: usize,
}

impl LearnedModel {
    pub fn new(params: LearnedParams) -> Self {
        Self {
            params,
            closes: VecDeque::with_capacity(6),
            pending: VecDeque::new(),
            training: VecDeque::new(),
            model: None,
            bars_since_train: 0,
        }
    }

    pub fn default_params() -> Self {
        Self::new(LearnedParams::default())
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    fn features(&self, bar: &Bar, rsi: f64, hist: f64) -> Option<Row> {
        let n = self.closes.len();
        if n < 5 {
            return None;
        }
        let prev = self.closes[n - 1];
        let back5 = self.closes[n - 5];
        let range = bar.high - bar.low;
        Some([
            bar.close / prev - 1.0,
            bar.close / back5 - 1.0,
            (rsi - 50.0) / 50.0,
            hist / bar.close * 100.0,
            bar.high / bar.low - 1.0,
            if range > 0.0 {
                (bar.close - bar.low) / range - 0.5
            } else {
                0.0
            },
        ])
    }

    /// Labels pending rows whose lookahead window has completed.
    ///
    /// With the newest row at the back, the row `lookahead` places behind the
    /// front closes the front row's window.
    fn label_pending(&mut self) {
        let k = self.params.lookahead.max(1);
        while self.pending.len() > k {
            let exit_close = self.pending[k].1;
            let Some((row, entry_close)) = self.pending.pop_front() else {
                break;
            };
            let label = if exit_close > entry_close { 1.0 } else { 0.0 };
            self.training.push_back((row, label));
            if self.training.len() > self.params.max_training_rows {
                self.training.pop_front();
            }
        }
    }

    fn maybe_retrain(&mut self) {
        self.bars_since_train += 1;
        let due = match self.model {
            None => self.training.len() >= self.params.min_data_points,
            Some(_) => self.bars_since_train >= self.params.retrain_interval,
        };
        if !due {
            return;
        }
        let rows: Vec<(Row, f64)> = self.training.iter().copied().collect();
        self.model = Some(Model::fit(&rows, self.params.learning_rate, self.params.epochs));
        self.bars_since_train = 0;
        debug!(rows = rows.len(), "learned model retrained");
    }
}

impl Strategy for LearnedModel {
    fn name(&self) -> &str {
        "learned_model"
    }

    fn required_indicators(&self) -> Vec<String> {
        vec!["rsi".to_string(), "macd_histogram".to_string()]
    }

    fn evaluate(
        &mut self,
        bar: &Bar,
        position: Option<&Position>,
        _account: &AccountState,
    ) -> Result<Evaluation, StrategyError> {
        if let Some(invalid) = check_prices(bar) {
            return Ok(invalid);
        }
        let v = match read_fields(self.name(), bar, &["rsi", "macd_histogram"])? {
            Fields::Ready(v) => v,
            Fields::Invalid(eval) => return Ok(eval),
        };

        let row = self.features(bar, v[0], v[1]);
        self.closes.push_back(bar.close);
        if self.closes.len() > 5 {
            self.closes.pop_front();
        }
        let Some(row) = row else {
            return Ok(Evaluation::insufficient("not enough closes for features"));
        };

        self.pending.push_back((row, bar.close));
        self.label_pending();
        self.maybe_retrain();

        let Some(model) = &self.model else {
            return Ok(Evaluation::InsufficientData {
                rationale: Rationale::new("model not trained")
                    .with("labelled_rows", self.training.len() as f64)
                    .with("needed", self.params.min_data_points as f64),
            });
        };

        let p_up = model.predict(&row);
        let p_down = 1.0 - p_up;
        let threshold = self.params.prediction_threshold;
        let rationale = |reason: &str| {
            let mut r = Rationale::new(reason)
                .with("p_up", p_up)
                .with("threshold", threshold);
            for (name, value) in FEATURE_NAMES.iter().zip(row.iter()) {
                r = r.with(*name, *value);
            }
            r
        };

        let decision = match position.map(|p| p.side) {
            Some(PositionSide::Long) if p_down >= threshold => {
                Evaluation::decided(SignalKind::CloseLong, rationale("model predicts decline"))
            }
            Some(PositionSide::Short) if p_up >= threshold => {
                Evaluation::decided(SignalKind::CloseShort, rationale("model predicts rise"))
            }
            Some(_) => Evaluation::hold("prediction supports open position"),
            None if p_up >= threshold => {
                Evaluation::decided(SignalKind::Buy, rationale("model predicts rise"))
            }
            None if p_down >= threshold => {
                Evaluation::decided(SignalKind::Sell, rationale("model predicts decline"))
            }
            None => Evaluation::hold("prediction below threshold"),
        };
        Ok(decision)
    }
}
