use async_trait::async_trait;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Duration;

use super::ExchangeGateway;
use crate::error::{GatewayError, GatewayResult};
use crate::execution::Poller;
use crate::models::{Balances, Order, OrderStatus, Side};

/// Backoff for transient gateway failures
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 2000, // Start with 2 seconds
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
        }
    }
}

/// Run `f`, retrying transient errors with exponential backoff.
/// Anything [`GatewayError::is_transient`] rejects is returned at once.
///
/// Backoff waits go through `poller`, so a shutdown ends the retry chain
/// with [`GatewayError::Interrupted`].
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    poller: &Poller,
    operation: &str,
    mut f: F,
) -> GatewayResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = GatewayResult<T>>,
{
    let mut attempt = 0;
    let mut delay_ms = config.initial_delay_ms;

    loop {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!("✓ {} succeeded after {} retries", operation, attempt);
                }
                return Ok(value);
            }
            Err(err) => {
                attempt += 1;

                if !err.is_transient() {
                    return Err(err);
                }
                if attempt > config.max_retries {
                    tracing::warn!(
                        "{} failed after {} attempts: {}",
                        operation,
                        attempt,
                        err
                    );
                    return Err(err);
                }

                tracing::warn!(
                    "Attempt {}/{} of {} failed: {}. Retrying in {}ms...",
                    attempt,
                    config.max_retries,
                    operation,
                    err,
                    delay_ms
                );
                if poller.wait(Duration::from_millis(delay_ms)).await.is_err() {
                    tracing::warn!("{} abandoned: shutdown during backoff", operation);
                    return Err(GatewayError::Interrupted);
                }

                delay_ms = ((delay_ms as f64 * config.backoff_factor) as u64).min(config.max_delay_ms);
            }
        }
    }
}

/// Wraps a gateway so idempotent calls survive network blips and rate limits.
///
/// Order creation is passed straight through: a lost response would
/// otherwise turn one retry into two resting orders.
pub struct RetryingGateway {
    inner: Arc<dyn ExchangeGateway>,
    config: RetryConfig,
    poller: Poller,
}

impl RetryingGateway {
    pub fn new(inner: Arc<dyn ExchangeGateway>, config: RetryConfig, poller: Poller) -> Self {
        Self {
            inner,
            config,
            poller,
        }
    }
}

#[async_trait]
impl ExchangeGateway for RetryingGateway {
    async fn balances(&self) -> GatewayResult<Balances> {
        with_retry(&self.config, &self.poller, "balances", || {
            self.inner.balances()
        })
        .await
    }

    async fn last_price(&self, symbol: &str) -> GatewayResult<f64> {
        with_retry(&self.config, &self.poller, "last_price", || {
            self.inner.last_price(symbol)
        })
        .await
    }

    async fn open_orders(&self) -> GatewayResult<Vec<Order>> {
        with_retry(&self.config, &self.poller, "open_orders", || {
            self.inner.open_orders()
        })
        .await
    }

    async fn create_limit_order(
        &self,
        symbol: &str,
        side: Side,
        amount: f64,
        price: f64,
    ) -> GatewayResult<Order> {
        self.inner
            .create_limit_order(symbol, side, amount, price)
            .await
    }

    async fn order_status(&self, symbol: &str, order_id: &str) -> GatewayResult<OrderStatus> {
        with_retry(&self.config, &self.poller, "order_status", || {
            self.inner.order_status(symbol, order_id)
        })
        .await
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> GatewayResult<bool> {
        with_retry(&self.config, &self.poller, "cancel_order", || {
            self.inner.cancel_order(symbol, order_id)
        })
        .await
    }
}
