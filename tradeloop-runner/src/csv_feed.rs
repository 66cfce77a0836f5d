//! CSV market feed.
//!
//! Expected header: `timestamp,open,high,low,close,volume,<indicator...>`.
//! Every column after `volume` is an indicator field. Empty cells and `NaN`
//! parse as NaN. Timestamps are RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC), or
//! Unix seconds.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use tradeloop_core::domain::Bar;
use tradeloop_core::feed::{FeedError, MarketFeed, OrderGuard};

const OHLCV: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

/// Streams bars from any CSV reader.
pub struct CsvFeed<R: Read> {
    reader: csv::Reader<R>,
    symbol: String,
    schema: Vec<String>,
    record: csv::StringRecord,
    line: usize,
    guard: OrderGuard,
}

impl CsvFeed<File> {
    pub fn open(path: &Path, symbol: impl Into<String>) -> Result<Self, FeedError> {
        let file = File::open(path).map_err(|e| FeedError::Malformed {
            record: 0,
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_reader(file, symbol)
    }
}

impl<R: Read> CsvFeed<R> {
    pub fn from_reader(rdr: R, symbol: impl Into<String>) -> Result<Self, FeedError> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
        let headers = reader.headers().map_err(|e| malformed(0, e))?.clone();
        for (i, expected) in OHLCV.iter().enumerate() {
            let got = headers.get(i).unwrap_or("");
            if !got.eq_ignore_ascii_case(expected) {
                return Err(FeedError::Malformed {
                    record: 0,
                    message: format!("column {i} must be '{expected}', found '{got}'"),
                });
            }
        }
        let schema = headers.iter().skip(OHLCV.len()).map(str::to_string).collect();
        Ok(Self {
            reader,
            symbol: symbol.into(),
            schema,
            record: csv::StringRecord::new(),
            line: 0,
            guard: OrderGuard::default(),
        })
    }

    /// Drains the remaining records into memory.
    pub fn read_all(mut self) -> Result<Vec<Bar>, FeedError>
    where
        R: Send,
    {
        let mut bars = Vec::new();
        while let Some(bar) = self.next_bar()? {
            bars.push(bar);
        }
        Ok(bars)
    }

    fn parse_record(&self) -> Result<Bar, FeedError> {
        let r = &self.record;
        let line = self.line;
        let timestamp = parse_timestamp(r.get(0).unwrap_or(""))
            .ok_or_else(|| malformed(line, format!("bad timestamp '{}'", r.get(0).unwrap_or(""))))?;
        let num = |i: usize| parse_number(r.get(i).unwrap_or("")).map_err(|m| malformed(line, m));

        let mut bar = Bar::new(
            self.symbol.clone(),
            timestamp,
            num(1)?,
            num(2)?,
            num(3)?,
            num(4)?,
            num(5)?,
        );
        for (offset, name) in self.schema.iter().enumerate() {
            bar.indicators.insert(name.clone(), num(OHLCV.len() + offset)?);
        }
        Ok(bar)
    }
}

impl<R: Read + Send> MarketFeed for CsvFeed<R> {
    fn schema(&self) -> &[String] {
        &self.schema
    }

    fn next_bar(&mut self) -> Result<Option<Bar>, FeedError> {
        let more = self
            .reader
            .read_record(&mut self.record)
            .map_err(|e| malformed(self.line + 1, e))?;
        if !more {
            return Ok(None);
        }
        self.line += 1;
        let bar = self.parse_record()?;
        self.guard.check(bar.timestamp)?;
        Ok(Some(bar))
    }
}

fn malformed(record: usize, message: impl ToString) -> FeedError {
    FeedError::Malformed {
        record,
        message: message.to_string(),
    }
}

fn parse_number(cell: &str) -> Result<f64, String> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    cell.parse::<f64>()
        .map_err(|_| format!("'{cell}' is not a number"))
}

fn parse_timestamp(cell: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(cell) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(cell, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    cell.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}
