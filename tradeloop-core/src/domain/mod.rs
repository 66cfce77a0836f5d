//! Domain types shared by every stage of the pipeline.

pub mod account;
pub mod bar;
pub mod equity;
pub mod fill;
pub mod ids;
pub mod intent;
pub mod position;
pub mod side;
pub mod signal;
pub mod trade;

pub use account::AccountState;
pub use bar::Bar;
pub use equity::EquityPoint;
pub use fill::{Fill, Liquidity};
pub use ids::OrderId;
pub use intent::{Intent, IntentAction, IntentOrigin, Protection};
pub use position::Position;
pub use side::{OrderSide, PositionSide};
pub use signal::{Rationale, Signal, SignalKind};
pub use trade::{ExitReason, TradeRecord};

/// Symbol type alias
pub type Symbol = String;
