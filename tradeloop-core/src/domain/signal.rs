//! Signal: the decision a strategy proposes for the current bar.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    Buy,
    Sell,
    CloseLong,
    CloseShort,
    CloseAll,
    Hold,
}

impl SignalKind {
    /// True for signals that would open a new position.
    pub fn is_entry(self) -> bool {
        matches!(self, SignalKind::Buy | SignalKind::Sell)
    }

    pub fn is_exit(self) -> bool {
        matches!(
            self,
            SignalKind::CloseLong | SignalKind::CloseShort | SignalKind::CloseAll
        )
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalKind::Buy => "BUY",
            SignalKind::Sell => "SELL",
            SignalKind::CloseLong => "CLOSE_LONG",
            SignalKind::CloseShort => "CLOSE_SHORT",
            SignalKind::CloseAll => "CLOSE_ALL",
            SignalKind::Hold => "HOLD",
        };
        f.write_str(s)
    }
}

/// Human-readable reason plus the numbers that drove the decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
    pub reason: String,
    pub values: BTreeMap<String, f64>,
}

impl Rationale {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.values.insert(key.into(), value);
        self
    }
}

impl fmt::Display for Rationale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)?;
        for (k, v) in &self.values {
            write!(f, " {k}={v:.4}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub rationale: Rationale,
}

impl Signal {
    pub fn new(kind: SignalKind, rationale: Rationale) -> Self {
        Self { kind, rationale }
    }

    pub fn hold(reason: impl Into<String>) -> Self {
        Self::new(SignalKind::Hold, Rationale::new(reason))
    }
}
