//! Tradeloop Core: signal engine, risk gating, execution and accounting.
//!
//! One deterministic pipeline serves both historical replay and live runs:
//! - Domain types (bars, signals, intents, fills, positions, trades)
//! - Feed contract with an incremental higher-timeframe resampler
//! - Strategy variants behind a name-keyed registry
//! - Risk manager: sizing, protective prices, limits, margin gating
//! - Simulated and gateway-backed executors sharing one async contract
//! - Portfolio ledger as the single writer of positions and account state
//! - Run-end performance analysis
//! - Orchestrator state machine driving the fixed per-bar sequence

pub mod analysis;
pub mod domain;
pub mod engine;
pub mod execution;
pub mod feed;
pub mod ledger;
pub mod risk;
pub mod strategy;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything a per-symbol task moves across threads
    /// is Send, and shared state is Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::Intent>();
        require_sync::<domain::Intent>();
        require_send::<domain::Fill>();
        require_sync::<domain::Fill>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::AccountState>();
        require_sync::<domain::AccountState>();
        require_send::<domain::TradeRecord>();
        require_sync::<domain::TradeRecord>();

        require_send::<risk::PositionGauge>();
        require_sync::<risk::PositionGauge>();
        require_send::<risk::SlotGuard>();
        require_send::<risk::RiskManager>();
        require_send::<ledger::PortfolioLedger>();
        require_send::<execution::SimulatedExecutor>();
        require_send::<engine::StopSignal>();
        require_sync::<engine::StopSignal>();
        require_send::<engine::RunOutcome>();
        require_send::<engine::EngineContext>();
        require_sync::<engine::EngineContext>();

        require_send::<Box<dyn strategy::Strategy>>();
        require_send::<
            engine::Orchestrator<feed::VecFeed, execution::SimulatedExecutor>,
        >();
    }
}
