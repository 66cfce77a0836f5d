//! Incremental higher-timeframe aggregation.
//!
//! The resampler is fed the primary bars one at a time and behaves as a
//! second feed: completed higher-timeframe bars are queued and drained with
//! [`MarketFeed::next_bar`]. Buckets are aligned to the Unix epoch.

use super::{FeedError, MarketFeed};
use crate::domain::Bar;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct Resampler {
    interval_secs: i64,
    current: Option<Bar>,
    bucket_start: Option<i64>,
    completed: VecDeque<Bar>,
}

impl Resampler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_secs: interval.num_seconds().max(1),
            current: None,
            bucket_start: None,
            completed: VecDeque::new(),
        }
    }

    pub fn minutes(minutes: i64) -> Self {
        Self::new(Duration::minutes(minutes))
    }

    fn bucket_of(&self, ts: DateTime<Utc>) -> i64 {
        ts.timestamp().div_euclid(self.interval_secs) * self.interval_secs
    }

    /// Folds one primary bar in. Returns true when a higher-timeframe bar completed.
    pub fn push(&mut self, bar: &Bar) -> bool {
        let bucket = self.bucket_of(bar.timestamp);
        let rolled = match (self.bucket_start, self.current.take()) {
            (Some(start), Some(partial)) if start != bucket => {
                self.completed.push_back(partial);
                self.current = Some(self.open_bucket(bar, bucket));
                true
            }
            (_, Some(mut partial)) => {
                partial.high = partial.high.max(bar.high);
                partial.low = partial.low.min(bar.low);
                partial.close = bar.close;
                partial.volume += bar.volume;
                self.current = Some(partial);
                false
            }
            (_, None) => {
                self.current = Some(self.open_bucket(bar, bucket));
                false
            }
        };
        self.bucket_start = Some(bucket);
        rolled
    }

    fn open_bucket(&self, bar: &Bar, bucket: i64) -> Bar {
        let ts = DateTime::<Utc>::from_timestamp(bucket, 0).unwrap_or(bar.timestamp);
        Bar::new(
            bar.symbol.clone(),
            ts,
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume,
        )
    }

    /// The partially built bar for the bucket in progress.
    pub fn partial(&self) -> Option<&Bar> {
        self.current.as_ref()
    }
}

impl MarketFeed for Resampler {
    fn schema(&self) -> &[String] {
        &[]
    }

    fn next_bar(&mut self) -> Result<Option<Bar>, FeedError> {
        Ok(self.completed.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hourly(hour: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour);
        Bar::new("BTC_JPY", ts, open, high, low, close, 1.0)
    }

    #[test]
    fn four_hour_bucket_aggregates_ohlcv() {
        let mut rs = Resampler::minutes(240);
        assert!(!rs.push(&hourly(0, 10.0, 12.0, 9.0, 11.0)));
        assert!(!rs.push(&hourly(1, 11.0, 15.0, 10.0, 14.0)));
        assert!(!rs.push(&hourly(2, 14.0, 14.5, 8.0, 9.0)));
        assert!(!rs.push(&hourly(3, 9.0, 10.0, 8.5, 9.5)));
        assert!(rs.next_bar().unwrap().is_none());

        assert!(rs.push(&hourly(4, 9.5, 9.6, 9.4, 9.5)));
        let done = rs.next_bar().unwrap().unwrap();
        assert_eq!(done.open, 10.0);
        assert_eq!(done.high, 15.0);
        assert_eq!(done.low, 8.0);
        assert_eq!(done.close, 9.5);
        assert_eq!(done.volume, 4.0);
        assert_eq!(done.timestamp, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        let partial = rs.partial().unwrap();
        assert_eq!(partial.open, 9.5);
    }

    #[test]
    fn skipped_buckets_still_roll_once() {
        let mut rs = Resampler::minutes(60);
        rs.push(&hourly(0, 1.0, 1.0, 1.0, 1.0));
        assert!(rs.push(&hourly(5, 2.0, 2.0, 2.0, 2.0)));
        assert_eq!(rs.next_bar().unwrap().unwrap().close, 1.0);
        assert!(rs.next_bar().unwrap().is_none());
    }
}
