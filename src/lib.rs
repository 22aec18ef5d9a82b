// Core modules
pub mod config;
pub mod error;
pub mod exchange;
pub mod execution;
pub mod models;
pub mod notify;
pub mod strategy;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use error::{ConfigError, GatewayError, SwingError, SwingResult};
pub use exchange::ExchangeGateway;
pub use models::*;
pub use strategy::{Sizing, SwingTradeController, SwingTradePlan};
