//! Market data feed contract.
//!
//! A feed hands out bars one at a time in strictly increasing timestamp order.
//! Indicator arithmetic happens upstream; the feed only carries the values and
//! declares which indicator fields it can supply (its schema).

pub mod resample;

pub use resample::Resampler;

use crate::domain::Bar;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("bar at {current} is not after previous bar at {previous}")]
    OutOfOrder {
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    /// Recoverable: the bar is delivered but its warm-up fields are not yet defined.
    #[error("indicator fields not warm at {}: {}", .bar.timestamp, .fields.join(", "))]
    InsufficientData { bar: Box<Bar>, fields: Vec<String> },

    #[error("malformed feed record {record}: {message}")]
    Malformed { record: usize, message: String },
}

impl FeedError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FeedError::InsufficientData { .. })
    }
}

pub trait MarketFeed: Send {
    /// Indicator fields this feed can supply.
    fn schema(&self) -> &[String];

    /// Next bar, or `Ok(None)` at end of stream.
    fn next_bar(&mut self) -> Result<Option<Bar>, FeedError>;
}

impl<T: MarketFeed + ?Sized> MarketFeed for Box<T> {
    fn schema(&self) -> &[String] {
        (**self).schema()
    }

    fn next_bar(&mut self) -> Result<Option<Bar>, FeedError> {
        (**self).next_bar()
    }
}

// ─── Ordering guard ──────────────────────────────────────────────────

/// Tracks the last emitted timestamp and rejects anything not strictly after it.
#[derive(Debug, Default, Clone)]
pub struct OrderGuard {
    last: Option<DateTime<Utc>>,
}

impl OrderGuard {
    pub fn check(&mut self, ts: DateTime<Utc>) -> Result<(), FeedError> {
        if let Some(previous) = self.last {
            if ts <= previous {
                return Err(FeedError::OutOfOrder {
                    previous,
                    current: ts,
                });
            }
        }
        self.last = Some(ts);
        Ok(())
    }
}

/// Returns the fields of `names` that are NaN/inf on `bar`.
pub fn cold_fields(bar: &Bar, names: &[String]) -> Vec<String> {
    names
        .iter()
        .filter(|n| matches!(bar.indicator(n), Some(v) if !v.is_finite()))
        .cloned()
        .collect()
}

// ─── In-memory feed ──────────────────────────────────────────────────

/// Feed over a pre-loaded vector of bars.
///
/// Optional `warm_fields` make the feed report `InsufficientData` for bars
/// on which any of those fields is still undefined.
#[derive(Debug, Clone)]
pub struct VecFeed {
    bars: VecDeque<Bar>,
    schema: Vec<String>,
    warm_fields: Vec<String>,
    guard: OrderGuard,
}

impl VecFeed {
    pub fn new(bars: Vec<Bar>) -> Self {
        let schema: BTreeSet<String> = bars
            .iter()
            .flat_map(|b| b.indicators.keys().cloned())
            .collect();
        Self {
            bars: bars.into(),
            schema: schema.into_iter().collect(),
            warm_fields: Vec::new(),
            guard: OrderGuard::default(),
        }
    }

    pub fn with_warm_fields(mut self, fields: Vec<String>) -> Self {
        self.warm_fields = fields;
        self
    }

    pub fn remaining(&self) -> usize {
        self.bars.len()
    }
}

impl MarketFeed for VecFeed {
    fn schema(&self) -> &[String] {
        &self.schema
    }

    fn next_bar(&mut self) -> Result<Option<Bar>, FeedError> {
        let Some(bar) = self.bars.pop_front() else {
            return Ok(None);
        };
        self.guard.check(bar.timestamp)?;
        let cold = cold_fields(&bar, &self.warm_fields);
        if !cold.is_empty() {
            return Err(FeedError::InsufficientData {
                bar: Box::new(bar),
                fields: cold,
            });
        }
        Ok(Some(bar))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn bar_at(hour: i64, close: f64) -> Bar {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour);
        Bar::new("BTC_JPY", ts, close, close, close, close, 1.0)
    }

    #[test]
    fn vec_feed_yields_in_order_then_end() {
        let mut feed = VecFeed::new(vec![bar_at(0, 1.0), bar_at(1, 2.0)]);
        assert_eq!(feed.next_bar().unwrap().unwrap().close, 1.0);
        assert_eq!(feed.next_bar().unwrap().unwrap().close, 2.0);
        assert!(feed.next_bar().unwrap().is_none());
    }

    #[test]
    fn vec_feed_rejects_non_increasing_timestamps() {
        let mut feed = VecFeed::new(vec![bar_at(1, 1.0), bar_at(1, 2.0)]);
        feed.next_bar().unwrap();
        assert!(matches!(
            feed.next_bar(),
            Err(FeedError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn schema_is_union_of_indicator_names() {
        let feed = VecFeed::new(vec![
            bar_at(0, 1.0).with_indicator("rsi", 50.0),
            bar_at(1, 1.0).with_indicator("atr", 2.0),
        ]);
        assert_eq!(feed.schema(), &["atr".to_string(), "rsi".to_string()]);
    }

    #[test]
    fn cold_warm_fields_report_insufficient_data_with_bar() {
        let mut feed = VecFeed::new(vec![
            bar_at(0, 1.0).with_indicator("sma_25", f64::NAN),
            bar_at(1, 2.0).with_indicator("sma_25", 1.5),
        ])
        .with_warm_fields(vec!["sma_25".into()]);

        let err = feed.next_bar().unwrap_err();
        assert!(err.is_recoverable());
        match err {
            FeedError::InsufficientData { bar, fields } => {
                assert_eq!(bar.close, 1.0);
                assert_eq!(fields, vec!["sma_25".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(feed.next_bar().unwrap().is_some());
    }
}
