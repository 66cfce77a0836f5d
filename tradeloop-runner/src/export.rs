//! Run artifacts: fill ledger and equity curve as CSV, report and manifest as JSON.
//!
//! CSV numbers use the shortest representation that parses back to the same
//! `f64`. All persisted JSON carries a `schema_version`; unknown versions are
//! rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tradeloop_core::domain::{EquityPoint, Fill, TradeRecord};

use crate::runner::{BacktestResult, SCHEMA_VERSION};

// ─── JSON ───────────────────────────────────────────────────────────

pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV ────────────────────────────────────────────────────────────

/// One row per fill.
///
/// Columns: timestamp, symbol, side, quantity, price, fee, realized_pnl, order_id
pub fn export_fills_csv(fills: &[Fill]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "timestamp",
        "symbol",
        "side",
        "quantity",
        "price",
        "fee",
        "realized_pnl",
        "order_id",
    ])?;
    for f in fills {
        wtr.write_record([
            &f.timestamp.to_rfc3339(),
            &f.symbol,
            &f.side.to_string(),
            &f.quantity.to_string(),
            &f.price.to_string(),
            &f.fee.to_string(),
            &f.realized_pnl.to_string(),
            &f.order_id.to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// One row per completed round trip.
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "symbol",
        "side",
        "quantity",
        "entry_time",
        "entry_price",
        "exit_time",
        "exit_price",
        "fees",
        "net_pnl",
        "exit_reason",
    ])?;
    for t in trades {
        wtr.write_record([
            &t.symbol,
            &t.side.to_string(),
            &t.quantity.to_string(),
            &t.entry_time.to_rfc3339(),
            &t.entry_price.to_string(),
            &t.exit_time.to_rfc3339(),
            &t.exit_price.to_string(),
            &t.fees.to_string(),
            &t.net_pnl.to_string(),
            &format!("{:?}", t.exit_reason),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn export_equity_csv(curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["bar_index", "timestamp", "price", "equity", "peak_equity", "drawdown"])?;
    for p in curve {
        wtr.write_record([
            &p.bar_index.to_string(),
            &p.timestamp.to_rfc3339(),
            &p.price.to_string(),
            &p.equity.to_string(),
            &p.peak_equity.to_string(),
            &p.drawdown.to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Writes the artifact set for one run under `output_dir/{run id prefix}/`:
/// - `manifest.json`: the full `BacktestResult`
/// - `report.json`: the performance report alone
/// - `trades.csv`: fill ledger
/// - `round_trips.csv`: completed trades
/// - `equity.csv`: bar-by-bar equity curve
///
/// Returns the created directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(result.config.short_id());
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let write = |name: &str, body: String| -> Result<()> {
        let path = run_dir.join(name);
        std::fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))
    };

    write("manifest.json", export_json(result)?)?;
    write(
        "report.json",
        serde_json::to_string_pretty(result.report()).context("failed to serialize report")?,
    )?;
    write("trades.csv", export_fills_csv(&result.outcome.fills)?)?;
    write("round_trips.csv", export_trades_csv(&result.outcome.trades)?)?;
    write("equity.csv", export_equity_csv(&result.outcome.equity_curve)?)?;

    Ok(run_dir)
}

/// Loads a `BacktestResult` from an artifact directory's manifest.json.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::runner::run_from_config;

    fn sample_result() -> BacktestResult {
        let mut cfg = RunConfig::default();
        cfg.run.synthetic_bars = 300;
        cfg.strategy.name = "grid".into();
        run_from_config(&cfg).unwrap()
    }

    #[test]
    fn json_roundtrip() {
        let original = sample_result();
        let restored = import_json(&export_json(&original).unwrap()).unwrap();
        assert_eq!(restored.run_id, original.run_id);
        let ids = |r: &BacktestResult| -> Vec<String> {
            r.outcome.fills.iter().map(|f| f.order_id.to_string()).collect()
        };
        assert_eq!(ids(&restored), ids(&original));
        assert_eq!(restored.outcome.equity_curve.len(), original.outcome.equity_curve.len());
    }

    #[test]
    fn json_rejects_unknown_version() {
        let mut result = sample_result();
        result.schema_version = 99;
        let json = export_json(&result).unwrap();
        let msg = import_json(&json).unwrap_err().to_string();
        assert!(msg.contains("unsupported schema version 99"));
    }

    #[test]
    fn fills_csv_has_one_row_per_fill() {
        let result = sample_result();
        let csv = export_fills_csv(&result.outcome.fills).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "timestamp,symbol,side,quantity,price,fee,realized_pnl,order_id"
        );
        assert_eq!(lines.len(), result.outcome.fills.len() + 1);
    }

    #[test]
    fn fills_csv_keeps_full_precision() {
        use chrono::{TimeZone, Utc};
        use tradeloop_core::domain::{
            IntentAction, IntentOrigin, Liquidity, OrderId, OrderSide, PositionSide, Protection,
        };

        let fill = Fill {
            order_id: OrderId::new("SIM-000001"),
            symbol: "DOGE_JPY".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            acknowledged_at: None,
            side: OrderSide::Buy,
            action: IntentAction::Open(PositionSide::Long),
            price: 0.000_123_456_789,
            quantity: 12_345.678_9,
            fee: 0.000_000_4,
            realized_pnl: -0.003_3,
            liquidity: Liquidity::Taker,
            origin: IntentOrigin::Signal,
            protection: Protection::default(),
        };
        let csv = export_fills_csv(std::slice::from_ref(&fill)).unwrap();
        let mut rdr = csv::Reader::from_reader(csv.as_bytes());
        let row = rdr.records().next().unwrap().unwrap();
        let num = |i: usize| row[i].parse::<f64>().unwrap();
        assert_eq!(num(3), fill.quantity);
        assert_eq!(num(4), fill.price);
        assert_eq!(num(5), fill.fee);
        assert_eq!(num(6), fill.realized_pnl);
    }

    #[test]
    fn empty_inputs_produce_header_only() {
        assert_eq!(export_fills_csv(&[]).unwrap().lines().count(), 1);
        assert_eq!(export_trades_csv(&[]).unwrap().lines().count(), 1);
        assert_eq!(export_equity_csv(&[]).unwrap().lines().count(), 1);
    }

    #[test]
    fn save_load_artifacts_roundtrip() {
        let result = sample_result();
        let dir = tempfile::tempdir().unwrap();
        let run_dir = save_artifacts(&result, dir.path()).unwrap();

        for name in ["manifest.json", "report.json", "trades.csv", "round_trips.csv", "equity.csv"] {
            assert!(run_dir.join(name).exists(), "{name}");
        }
        let loaded = load_artifacts(&run_dir).unwrap();
        assert_eq!(loaded.run_id, result.run_id);
        assert_eq!(loaded.schema_version, SCHEMA_VERSION);
    }
}
