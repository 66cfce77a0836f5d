//! Donchian channel breakout.
//!
//! Compares the close against the channel as it stood on the previous bar,
//! so the current bar's own high/low never define the level it breaks.

use super::{check_prices, read_fields, Evaluation, Fields, Strategy, StrategyError};
use crate::domain::{AccountState, Bar, Position, PositionSide, Rationale, SignalKind};

#[derive(Debug, Clone)]
pub struct ChannelBreakout {
    pub lookback: usize,
    upper_key: String,
    lower_key: String,
    prev_channel: Option<(f64, f64)>,
}

impl ChannelBreakout {
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback,
            upper_key: format!("donchian_upper_{lookback}"),
            lower_key: format!("donchian_lower_{lookback}"),
            prev_channel: None,
        }
    }

    pub fn default_params() -> Self {
        Self::new(20)
    }
}

impl Strategy for ChannelBreakout {
    fn name(&self) -> &str {
        "breakout"
    }

    fn required_indicators(&self) -> Vec<String> {
        vec![self.upper_key.clone(), self.lower_key.clone()]
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
        let v = match read_fields(self.name(), bar, &[&self.upper_key, &self.lower_key])? {
            Fields::Ready(v) => v,
            Fields::Invalid(eval) => return Ok(eval),
        };
        let Some((upper, lower)) = self.prev_channel.replace((v[0], v[1])) else {
            return Ok(Evaluation::insufficient("no previous channel"));
        };

        let close = bar.close;
        let rationale = |reason: &str| {
            Rationale::new(reason)
                .with("close", close)
                .with("channel_upper", upper)
                .with("channel_lower", lower)
        };

        let above = close > upper;
        let below = close < lower;
        let decision = match (position.map(|p| p.side), above, below) {
            (None, true, _) => Evaluation::decided(SignalKind::Buy, rationale("upper channel breakout")),
            (None, _, true) => Evaluation::decided(SignalKind::Sell, rationale("lower channel breakdown")),
            (Some(PositionSide::Long), _, true) => {
                Evaluation::decided(SignalKind::CloseLong, rationale("lower channel breach"))
            }
            (Some(PositionSide::Short), true, _) => {
                Evaluation::decided(SignalKind::CloseShort, rationale("upper channel breach"))
            }
            _ => Evaluation::hold("inside channel"),
        };
        Ok(decision)
    }
}
