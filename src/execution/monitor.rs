use std::sync::Arc;
use tokio::time::Duration;

use super::Poller;
use crate::error::{SwingError, SwingResult};
use crate::exchange::ExchangeGateway;
use crate::models::OrderStatus;

/// Watches a single order until it fills
pub struct OrderMonitor {
    gateway: Arc<dyn ExchangeGateway>,
    poller: Poller,
}

impl OrderMonitor {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, poller: Poller) -> Self {
        Self { gateway, poller }
    }

    /// Block until the order reports `closed`.
    ///
    /// Canceled, expired and rejected orders will never fill, so they end the
    /// wait with [`SwingError::StaleOrder`] instead of polling forever.
    pub async fn wait_until_closed(
        &self,
        symbol: &str,
        order_id: &str,
        poll_interval: Duration,
    ) -> SwingResult<()> {
        self.poller
            .poll_until(poll_interval, || async move {
                let status = self.gateway.order_status(symbol, order_id).await?;
                match status {
                    OrderStatus::Closed => Ok(Some(())),
                    OrderStatus::Open => {
                        tracing::debug!(order_id, "Order still open");
                        Ok(None)
                    }
                    dead if dead.is_dead() => Err(SwingError::StaleOrder {
                        order_id: order_id.to_string(),
                        status: dead,
                    }),
                    other => {
                        tracing::warn!(order_id, status = %other, "Unrecognised order status, still waiting");
                        Ok(None)
                    }
                }
            })
            .await
    }
}
