use serde::{Deserialize, Serialize};
use std::fmt;

/// Order ID, assigned by the executor that handled the intent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Zero-padded sequential id, e.g. `SIM-000042`.
    pub fn sequential(prefix: &str, n: u64) -> Self {
        Self(format!("{prefix}-{n:06}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
