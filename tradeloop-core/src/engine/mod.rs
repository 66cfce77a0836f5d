//! Orchestration: drives one bar at a time through the fixed pipeline:
//!
//! 1. Fetch: next bar from the feed
//! 2. Signal: strategy evaluation
//! 3. Risk: admission, veto or forced exit
//! 4. Execute: submit the admitted intent (the only suspension point)
//! 5. Ledger update: apply the fill, then mark to market
//! 6. Record: equity point and bar record
//!
//! Bars are never reordered, reprocessed or evaluated against later data.

pub mod context;
pub mod orchestrator;
pub mod state;

pub use context::EngineContext;
pub use orchestrator::Orchestrator;
pub use state::{
    BarOutcome, BarRecord, BarStage, ErrorKind, RunError, RunFailure, RunOutcome, RunState,
    StopSignal,
};
