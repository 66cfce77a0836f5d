//! Paper trading: the live executor path against an in-process gateway.
//!
//! Each symbol runs its own orchestrator on a tokio task. All tasks share one
//! [`PaperGateway`] and one [`PositionGauge`], so the open-position limit is
//! enforced across symbols. Market orders fill at the last quote the gateway
//! saw for the symbol, after a simulated round-trip latency.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use tradeloop_core::domain::{Bar, Liquidity};
use tradeloop_core::engine::{Orchestrator, RunOutcome, StopSignal};
use tradeloop_core::execution::{
    ExecutionConfig, GatewayAck, GatewayError, LiveExecutor, OrderGateway, OrderKind, OrderRequest,
};
use tradeloop_core::feed::{FeedError, MarketFeed, VecFeed};
use tradeloop_core::risk::PositionGauge;
use tradeloop_core::strategy::StrategyRegistry;

use crate::config::RunConfig;
use crate::csv_feed::CsvFeed;
use crate::indicators::annotate;

// ─── Gateway ─────────────────────────────────────────────────────────

/// In-process exchange stand-in.
pub struct PaperGateway {
    latency: Duration,
    config: ExecutionConfig,
    quotes: Mutex<HashMap<String, f64>>,
    cancelled: Mutex<BTreeSet<String>>,
    next_order: AtomicU64,
}

impl PaperGateway {
    pub fn new(latency: Duration, config: ExecutionConfig) -> Self {
        Self {
            latency,
            config,
            quotes: Mutex::new(HashMap::new()),
            cancelled: Mutex::new(BTreeSet::new()),
            next_order: AtomicU64::new(1),
        }
    }

    fn quotes(&self) -> MutexGuard<'_, HashMap<String, f64>> {
        self.quotes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the latest traded price for `symbol`.
    pub fn quote(&self, symbol: &str, price: f64) {
        if price.is_finite() && price > 0.0 {
            self.quotes().insert(symbol.to_string(), price);
        }
    }

    pub fn last_quote(&self, symbol: &str) -> Option<f64> {
        self.quotes().get(symbol).copied()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn submit(&self, request: OrderRequest) -> Result<GatewayAck, GatewayError> {
        tokio::time::sleep(self.latency).await;

        if !(request.quantity > 0.0) {
            return Err(GatewayError::Rejected(format!(
                "order {} has non-positive quantity",
                request.client_id
            )));
        }
        let reference = match (request.kind, request.price) {
            (OrderKind::Stop, Some(level)) => level,
            _ => self.last_quote(&request.symbol).ok_or_else(|| {
                GatewayError::Unfilled(format!("no quote for {}", request.symbol))
            })?,
        };
        let price = self.config.slippage.apply(reference, request.side);
        let fee = self.config.fee(Liquidity::Taker, price * request.quantity);
        let n = self.next_order.fetch_add(1, Ordering::Relaxed);
        Ok(GatewayAck {
            order_id: format!("PAPER-{n:06}"),
            filled_quantity: request.quantity,
            average_price: price,
            fee,
            timestamp: Some(Utc::now()),
        })
    }

    async fn cancel(&self, order_id: &str) -> Result<(), GatewayError> {
        self.cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(order_id.to_string());
        Ok(())
    }
}

// ─── Quoting feed ────────────────────────────────────────────────────

/// Passes bars through and publishes each close to the gateway first.
pub struct QuotingFeed<F> {
    inner: F,
    gateway: Arc<PaperGateway>,
}

impl<F: MarketFeed> QuotingFeed<F> {
    pub fn new(inner: F, gateway: Arc<PaperGateway>) -> Self {
        Self { inner, gateway }
    }
}

impl<F: MarketFeed> MarketFeed for QuotingFeed<F> {
    fn schema(&self) -> &[String] {
        self.inner.schema()
    }

    fn next_bar(&mut self) -> Result<Option<Bar>, FeedError> {
        let next = self.inner.next_bar();
        match &next {
            Ok(Some(bar)) => self.gateway.quote(&bar.symbol, bar.close),
            Err(FeedError::InsufficientData { bar, .. }) => {
                self.gateway.quote(&bar.symbol, bar.close)
            }
            _ => {}
        }
        next
    }
}

// ─── Session ─────────────────────────────────────────────────────────

/// One symbol's data source for a paper session.
#[derive(Debug, Clone)]
pub struct SymbolFeed {
    pub symbol: String,
    pub path: PathBuf,
}

impl SymbolFeed {
    /// Parses `SYMBOL=path`.
    pub fn parse(spec: &str) -> Result<Self> {
        let (symbol, path) = spec
            .split_once('=')
            .with_context(|| format!("expected SYMBOL=path, got '{spec}'"))?;
        Ok(Self {
            symbol: symbol.trim().to_string(),
            path: PathBuf::from(path.trim()),
        })
    }
}

/// Opens a CSV feed, streaming it when it already carries every field and
/// annotating it in memory otherwise.
fn open_feed(
    path: &Path,
    symbol: &str,
    fields: &[String],
    warm: Vec<String>,
) -> Result<Box<dyn MarketFeed>> {
    let feed = CsvFeed::open(path, symbol)
        .with_context(|| format!("failed to open feed {}", path.display()))?;
    if fields.iter().all(|f| feed.schema().contains(f)) {
        return Ok(Box::new(feed));
    }
    let mut bars = feed
        .read_all()
        .with_context(|| format!("failed to read feed {}", path.display()))?;
    annotate(&mut bars, fields).context("failed to compute indicator columns")?;
    Ok(Box::new(VecFeed::new(bars).with_warm_fields(warm)))
}

/// Runs one orchestrator per symbol until every feed ends or `stop` is raised.
pub async fn run_paper(
    config: &RunConfig,
    feeds: &[SymbolFeed],
    stop: StopSignal,
) -> Result<Vec<RunOutcome>> {
    config.validate()?;
    let registry = StrategyRegistry::with_builtins();
    let gateway = Arc::new(PaperGateway::new(
        Duration::from_millis(config.live.latency_ms),
        config.execution.clone(),
    ));
    let gauge = PositionGauge::new(config.risk.max_open_positions);
    let ack_timeout = Duration::from_millis(config.live.ack_timeout_ms);

    let mut handles = Vec::with_capacity(feeds.len());
    for sf in feeds {
        let mut ctx = config.engine_context();
        ctx.run_label = format!("{}-{}", ctx.run_label, sf.symbol);
        let strategy = config.build_strategy(&registry)?;
        let fields = config.indicator_fields(strategy.as_ref());
        let feed = open_feed(&sf.path, &sf.symbol, &fields, strategy.required_indicators())?;
        let executor = LiveExecutor::new(gateway.clone(), ack_timeout, ctx.execution.clone())
            .with_client_prefix(format!("{}-{}", config.live.client_prefix, sf.symbol));

        let orchestrator = Orchestrator::new(
            &ctx,
            QuotingFeed::new(feed, gateway.clone()),
            strategy,
            executor,
            gauge.clone(),
        );
        let stop = stop.clone();
        let symbol = sf.symbol.clone();
        info!(symbol = %symbol, "starting paper pipeline");
        handles.push((
            symbol,
            tokio::spawn(async move { orchestrator.run(&stop).await }),
        ));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (symbol, handle) in handles {
        let outcome = handle
            .await
            .with_context(|| format!("paper pipeline for {symbol} panicked"))?;
        if outcome.is_failed() {
            warn!(symbol = %symbol, failure = ?outcome.failure, "paper pipeline failed");
        }
        outcomes.push(outcome);
    }
    let cancelled = gateway.cancelled();
    if !cancelled.is_empty() {
        warn!(count = cancelled.len(), "orders cancelled after ack timeout");
    }
    Ok(outcomes)
}

/// Raises `stop` on Ctrl-C. Pipelines finish their current bar first.
pub fn stop_on_ctrl_c(stop: StopSignal) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, stopping after the current bar");
            stop.stop();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradeloop_core::domain::OrderSide;
    use tradeloop_core::execution::SlippageModel;

    fn gateway() -> PaperGateway {
        PaperGateway::new(
            Duration::from_millis(1),
            ExecutionConfig {
                slippage: SlippageModel::Percentage(0.0),
                ..ExecutionConfig::default()
            },
        )
    }

    fn market(symbol: &str, qty: f64) -> OrderRequest {
        OrderRequest {
            client_id: "C-1".into(),
            symbol: symbol.into(),
            side: OrderSide::Buy,
            quantity: qty,
            price: None,
            kind: OrderKind::Market,
        }
    }

    #[tokio::test]
    async fn market_order_fills_at_last_quote() {
        let gw = gateway();
        gw.quote("BTC_JPY", 5_000_000.0);
        let ack = gw.submit(market("BTC_JPY", 0.01)).await.unwrap();
        assert_eq!(ack.average_price, 5_000_000.0);
        assert_eq!(ack.filled_quantity, 0.01);
        assert!((ack.fee - 5_000_000.0 * 0.01 * 0.0009).abs() < 1e-9);
    }

    #[tokio::test]
    async fn market_order_without_quote_is_unfilled() {
        let gw = gateway();
        let err = gw.submit(market("ETH_JPY", 1.0)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unfilled(_)));
    }

    #[tokio::test]
    async fn stop_order_fills_at_level() {
        let gw = gateway();
        gw.quote("BTC_JPY", 5_000_000.0);
        let mut req = market("BTC_JPY", 0.01);
        req.kind = OrderKind::Stop;
        req.price = Some(4_900_000.0);
        let ack = gw.submit(req).await.unwrap();
        assert_eq!(ack.average_price, 4_900_000.0);
    }

    #[tokio::test]
    async fn cancel_is_recorded() {
        let gw = gateway();
        gw.cancel("C-9").await.unwrap();
        assert_eq!(gw.cancelled(), vec!["C-9".to_string()]);
    }

    #[test]
    fn symbol_feed_parses() {
        let sf = SymbolFeed::parse("BTC_JPY=data/btc.csv").unwrap();
        assert_eq!(sf.symbol, "BTC_JPY");
        assert_eq!(sf.path, PathBuf::from("data/btc.csv"));
        assert!(SymbolFeed::parse("nopath").is_err());
    }

    #[test]
    fn invalid_quotes_are_ignored() {
        let gw = gateway();
        gw.quote("BTC_JPY", f64::NAN);
        assert_eq!(gw.last_quote("BTC_JPY"), None);
    }
}
