use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::ExchangeGateway;
use crate::error::{GatewayError, GatewayResult};
use crate::models::{normalize_symbol, split_symbol, Balances, Order, OrderStatus, Side};

/// Where the paper exchange gets its market prices
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn price(&self, symbol: &str) -> GatewayResult<f64>;
}

/// Replays a fixed price path; the last price repeats forever
#[derive(Debug)]
pub struct ScriptedPrices {
    path: Mutex<(VecDeque<f64>, Option<f64>)>,
}

impl ScriptedPrices {
    pub fn new(path: impl IntoIterator<Item = f64>) -> Self {
        Self {
            path: Mutex::new((path.into_iter().collect(), None)),
        }
    }
}

#[async_trait]
impl PriceFeed for ScriptedPrices {
    async fn price(&self, _symbol: &str) -> GatewayResult<f64> {
        let mut guard = self
            .path
            .lock()
            .map_err(|_| GatewayError::Malformed("price path poisoned".into()))?;
        let (path, last) = &mut *guard;
        if let Some(next) = path.pop_front() {
            *last = Some(next);
        }
        last.ok_or_else(|| GatewayError::Malformed("empty price path".into()))
    }
}

#[derive(Debug, Default)]
struct PaperBook {
    balances: Balances,
    orders: Vec<Order>,
    next_id: u64,
}

/// In-memory venue for dry runs.
///
/// Every price observation (last price or status check) settles resting
/// orders on that symbol: buys fill at or below their limit, sells at or
/// above. Funds are reserved when an order is placed and released on cancel.
pub struct PaperExchange {
    feed: Arc<dyn PriceFeed>,
    book: Mutex<PaperBook>,
}

impl PaperExchange {
    pub fn new(feed: Arc<dyn PriceFeed>, balances: Balances) -> Self {
        Self {
            feed,
            book: Mutex::new(PaperBook {
                balances,
                ..Default::default()
            }),
        }
    }

    fn book(&self) -> GatewayResult<std::sync::MutexGuard<'_, PaperBook>> {
        self.book
            .lock()
            .map_err(|_| GatewayError::Malformed("paper book poisoned".into()))
    }

    /// Fill whatever the observed price crosses
    fn settle(&self, symbol: &str, price: f64) -> GatewayResult<()> {
        let symbol = normalize_symbol(symbol);
        let mut book = self.book()?;
        let PaperBook {
            balances, orders, ..
        } = &mut *book;

        for order in orders.iter_mut() {
            if order.status != OrderStatus::Open || normalize_symbol(&order.symbol) != symbol {
                continue;
            }
            let crossed = match order.side {
                Side::Buy => price <= order.price,
                Side::Sell => price >= order.price,
            };
            if !crossed {
                continue;
            }

            let (base, quote) = legs(&order.symbol)?;
            match order.side {
                Side::Buy => credit(balances, base, order.amount),
                Side::Sell => credit(balances, quote, order.amount * order.price),
            }
            order.status = OrderStatus::Closed;
            order.filled = Some(order.amount);

            tracing::info!(
                order_id = %order.id,
                side = %order.side,
                price = order.price,
                amount = order.amount,
                "Paper order filled"
            );
        }
        Ok(())
    }
}

fn legs(symbol: &str) -> GatewayResult<(&str, &str)> {
    split_symbol(symbol).ok_or_else(|| GatewayError::Rejected {
        code: -1121,
        message: format!("paper exchange needs BASE/QUOTE symbols, got `{}`", symbol),
    })
}

fn credit(balances: &mut Balances, currency: &str, amount: f64) {
    *balances.entry(currency.to_string()).or_insert(0.0) += amount;
}

fn debit(balances: &mut Balances, currency: &str, amount: f64) -> GatewayResult<()> {
    let available = balances.get(currency).copied().unwrap_or(0.0);
    if available < amount {
        return Err(GatewayError::Rejected {
            code: -2010,
            message: format!(
                "insufficient {} balance: need {}, have {}",
                currency, amount, available
            ),
        });
    }
    balances.insert(currency.to_string(), available - amount);
    Ok(())
}

#[async_trait]
impl ExchangeGateway for PaperExchange {
    async fn balances(&self) -> GatewayResult<Balances> {
        Ok(self.book()?.balances.clone())
    }

    async fn last_price(&self, symbol: &str) -> GatewayResult<f64> {
        let price = self.feed.price(symbol).await?;
        self.settle(symbol, price)?;
        Ok(price)
    }

    async fn open_orders(&self) -> GatewayResult<Vec<Order>> {
        Ok(self
            .book()?
            .orders
            .iter()
            .filter(|o| o.status == OrderStatus::Open)
            .cloned()
            .collect())
    }

    async fn create_limit_order(
        &self,
        symbol: &str,
        side: Side,
        amount: f64,
        price: f64,
    ) -> GatewayResult<Order> {
        if !(amount > 0.0 && price > 0.0) {
            return Err(GatewayError::Rejected {
                code: -1013,
                message: format!("invalid amount {} or price {}", amount, price),
            });
        }

        let (base, quote) = legs(symbol)?;
        let mut book = self.book()?;
        match side {
            Side::Buy => debit(&mut book.balances, quote, amount * price)?,
            Side::Sell => debit(&mut book.balances, base, amount)?,
        }

        book.next_id += 1;
        let order = Order {
            id: format!("paper-{}", book.next_id),
            symbol: symbol.to_string(),
            side,
            price,
            amount,
            filled: Some(0.0),
            status: OrderStatus::Open,
            created_at: Some(Utc::now()),
        };
        book.orders.push(order.clone());

        Ok(order)
    }

    async fn order_status(&self, symbol: &str, order_id: &str) -> GatewayResult<OrderStatus> {
        let price = self.feed.price(symbol).await?;
        self.settle(symbol, price)?;

        self.book()?
            .orders
            .iter()
            .find(|o| o.id == order_id)
            .map(|o| o.status.clone())
            .ok_or_else(|| GatewayError::Rejected {
                code: -2013,
                message: format!("order {} does not exist", order_id),
            })
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> GatewayResult<bool> {
        let mut book = self.book()?;
        let PaperBook {
            balances, orders, ..
        } = &mut *book;

        let Some(order) = orders
            .iter_mut()
            .find(|o| o.id == order_id && o.status == OrderStatus::Open)
        else {
            return Ok(false);
        };

        let (base, quote) = legs(&order.symbol)?;
        match order.side {
            Side::Buy => credit(balances, quote, order.amount * order.price),
            Side::Sell => credit(balances, base, order.amount),
        }
        order.status = OrderStatus::Canceled;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(path: &[f64]) -> PaperExchange {
        PaperExchange::new(
            Arc::new(ScriptedPrices::new(path.iter().copied())),
            Balances::from([("USDC".to_string(), 1000.0), ("BTC".to_string(), 0.01)]),
        )
    }

    #[tokio::test]
    async fn test_scripted_prices_repeat_last() {
        let feed = ScriptedPrices::new([1.0, 2.0]);
        assert_eq!(feed.price("X/Y").await.unwrap(), 1.0);
        assert_eq!(feed.price("X/Y").await.unwrap(), 2.0);
        assert_eq!(feed.price("X/Y").await.unwrap(), 2.0);
    }

    #[tokio::test]
    async fn test_buy_fills_when_price_drops_to_limit() {
        let paper = exchange(&[67100.0, 66900.0]);
        let order = paper
            .create_limit_order("BTC/USDC", Side::Buy, 0.001, 67000.0)
            .await
            .unwrap();

        let balances = paper.balances().await.unwrap();
        assert!((balances["USDC"] - 933.0).abs() < 1e-9);

        assert_eq!(
            paper.order_status("BTC/USDC", &order.id).await.unwrap(),
            OrderStatus::Open
        );
        assert_eq!(
            paper.order_status("BTC/USDC", &order.id).await.unwrap(),
            OrderStatus::Closed
        );

        let balances = paper.balances().await.unwrap();
        assert!((balances["BTC"] - 0.011).abs() < 1e-12);
        assert!(paper.open_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sell_fills_when_price_rises_to_limit() {
        let paper = exchange(&[70500.0]);
        paper
            .create_limit_order("BTC/USDC", Side::Sell, 0.01, 70000.0)
            .await
            .unwrap();

        paper.last_price("BTC/USDC").await.unwrap();

        let balances = paper.balances().await.unwrap();
        assert!((balances["USDC"] - 1700.0).abs() < 1e-9);
        assert!(balances["BTC"].abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_insufficient_balance_rejected() {
        let paper = exchange(&[67000.0]);
        let err = paper
            .create_limit_order("BTC/USDC", Side::Buy, 1.0, 67000.0)
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Rejected { code: -2010, .. }));
        assert!(paper.open_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_releases_reservation() {
        let paper = exchange(&[67000.0]);
        let order = paper
            .create_limit_order("BTC/USDC", Side::Buy, 0.001, 60000.0)
            .await
            .unwrap();

        assert!(paper.cancel_order("BTC/USDC", &order.id).await.unwrap());
        assert!(!paper.cancel_order("BTC/USDC", &order.id).await.unwrap());

        let balances = paper.balances().await.unwrap();
        assert!((balances["USDC"] - 1000.0).abs() < 1e-9);
        assert_eq!(
            paper.order_status("BTC/USDC", &order.id).await.unwrap(),
            OrderStatus::Canceled
        );
    }

    #[tokio::test]
    async fn test_symbol_without_quote_rejected() {
        let paper = exchange(&[67000.0]);
        let err = paper
            .create_limit_order("BTCUSDC", Side::Buy, 0.001, 67000.0)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { code: -1121, .. }));
    }
}
