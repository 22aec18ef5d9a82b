// Swing trade: plan, leg discovery and the controller that runs it
pub mod discovery;
pub mod plan;
pub mod swing;

pub use discovery::{classify, Resumption};
pub use plan::{Sizing, SwingTradePlan, DEFAULT_POLL_INTERVAL};
pub use swing::{SwingTradeController, TradePhase, TradeReport};
