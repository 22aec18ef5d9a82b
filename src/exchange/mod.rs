// Exchange connectivity
pub mod binance;
pub mod paper;
pub mod registry;
pub mod retry;

pub use binance::BinanceGateway;
pub use paper::{PaperExchange, PriceFeed, ScriptedPrices};
pub use registry::{build_gateway, Credentials, ExchangeKind};
pub use retry::{with_retry, RetryConfig, RetryingGateway};

use async_trait::async_trait;

use crate::error::GatewayResult;
use crate::models::{normalize_symbol, Balances, Order, OrderStatus, Side};

/// The capability set the swing trade needs from a venue.
///
/// One implementation per supported exchange; all of them speak for a single account.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Free balance per currency
    async fn balances(&self) -> GatewayResult<Balances>;

    /// Price of the last trade on `symbol`
    async fn last_price(&self, symbol: &str) -> GatewayResult<f64>;

    /// Every open order on the account
    async fn open_orders(&self) -> GatewayResult<Vec<Order>>;

    /// Place a good-till-cancelled limit order
    async fn create_limit_order(
        &self,
        symbol: &str,
        side: Side,
        amount: f64,
        price: f64,
    ) -> GatewayResult<Order>;

    /// Current status of an order
    async fn order_status(&self, symbol: &str, order_id: &str) -> GatewayResult<OrderStatus>;

    /// Cancel an order. Returns whether the venue acknowledged it.
    async fn cancel_order(&self, symbol: &str, order_id: &str) -> GatewayResult<bool>;
}

/// Cancel every open order, or only those on `symbol`. Returns the ids the
/// venue acknowledged.
pub async fn cancel_all(
    gateway: &dyn ExchangeGateway,
    symbol: Option<&str>,
) -> GatewayResult<Vec<String>> {
    let wanted = symbol.map(normalize_symbol);
    let mut canceled = Vec::new();

    for order in gateway.open_orders().await? {
        if let Some(wanted) = &wanted {
            if normalize_symbol(&order.symbol) != *wanted {
                continue;
            }
        }
        if gateway.cancel_order(&order.symbol, &order.id).await? {
            tracing::info!(order_id = %order.id, symbol = %order.symbol, "Order canceled");
            canceled.push(order.id);
        } else {
            tracing::warn!(order_id = %order.id, "Cancel not acknowledged");
        }
    }

    Ok(canceled)
}
