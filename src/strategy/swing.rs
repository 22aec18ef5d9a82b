use std::sync::Arc;

use super::discovery::{classify, Resumption};
use super::SwingTradePlan;
use crate::error::{GatewayError, SwingError, SwingResult};
use crate::exchange::ExchangeGateway;
use crate::execution::trigger::{distance_pct, should_submit};
use crate::execution::{OrderMonitor, Poller};
use crate::models::{Order, Side};
use crate::notify::{Notifier, TradeEvent};

/// Where the controller is in the round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradePhase {
    DiscoverLegs,
    AwaitEntryFillIfExisting,
    AwaitExitFillIfExisting,
    WaitEntryTrigger,
    SubmitEntry,
    AwaitEntryFill,
    WaitExitTrigger,
    SubmitExit,
    AwaitExitFill,
    Complete,
}

/// What a finished run did
#[derive(Debug, Clone, PartialEq)]
pub struct TradeReport {
    pub resumed_from: &'static str,
    pub entry_order_id: Option<String>,
    pub exit_order_id: String,
    pub amount: Option<f64>,
    pub phases: Vec<TradePhase>,
}

/// Drives a [`SwingTradePlan`] to completion: discover what is already
/// placed, then trigger, submit and monitor whatever legs remain.
pub struct SwingTradeController {
    gateway: Arc<dyn ExchangeGateway>,
    monitor: OrderMonitor,
    poller: Poller,
    notifier: Notifier,
    phase: TradePhase,
    phases: Vec<TradePhase>,
}

impl SwingTradeController {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, poller: Poller, notifier: Notifier) -> Self {
        Self {
            monitor: OrderMonitor::new(gateway.clone(), poller.clone()),
            gateway,
            poller,
            notifier,
            phase: TradePhase::DiscoverLegs,
            phases: Vec::new(),
        }
    }

    pub fn phase(&self) -> TradePhase {
        self.phase
    }

    /// Run the plan until both legs have filled.
    ///
    /// Both legs open at once is refused with [`SwingError::ConflictingOrders`]
    /// before anything is waited on or submitted.
    pub async fn run(&mut self, plan: &SwingTradePlan) -> SwingResult<TradeReport> {
        plan.validate()?;
        self.phases.clear();
        if plan.entry_price >= plan.exit_price {
            tracing::warn!(
                entry = plan.entry_price,
                exit = plan.exit_price,
                "Exit price is not above entry price; this round trip loses money"
            );
        }

        self.notifier
            .emit(TradeEvent::Started {
                symbol: plan.symbol.clone(),
                entry_price: plan.entry_price,
                exit_price: plan.exit_price,
            })
            .await;

        self.enter(TradePhase::DiscoverLegs);
        let resumption = self.discover(plan).await?;
        let resumed_from = resumption.label();

        let (entry_order_id, exit_order_id, amount) = match resumption {
            Resumption::Conflicting { entry, exit } => {
                return Err(SwingError::ConflictingOrders {
                    entry_id: entry.id,
                    exit_id: exit.id,
                });
            }
            Resumption::ExitOpen(exit) => {
                self.resume_exit(plan, &exit).await?;
                (None, exit.id, None)
            }
            Resumption::EntryOpen(entry) => {
                let exit = self.resume_entry(plan, &entry).await?;
                (Some(entry.id), exit.id, Some(entry.amount))
            }
            Resumption::Fresh => {
                let (entry, exit) = self.fresh_start(plan).await?;
                (Some(entry.id), exit.id, Some(entry.amount))
            }
        };

        self.enter(TradePhase::Complete);
        self.notifier
            .emit(TradeEvent::Completed {
                symbol: plan.symbol.clone(),
            })
            .await;

        Ok(TradeReport {
            resumed_from,
            entry_order_id,
            exit_order_id,
            amount,
            phases: self.phases.clone(),
        })
    }

    async fn discover(&self, plan: &SwingTradePlan) -> SwingResult<Resumption> {
        let orders = self.gateway.open_orders().await?;
        let resumption = classify(&orders, plan);

        tracing::info!(
            symbol = %plan.symbol,
            open_orders = orders.len(),
            resumption = resumption.label(),
            "Discovered existing legs"
        );

        Ok(resumption)
    }

    /// Exit is already resting from an earlier run: just see it through
    async fn resume_exit(&mut self, plan: &SwingTradePlan, exit: &Order) -> SwingResult<()> {
        self.notifier
            .emit(TradeEvent::ExitAlreadyOpen {
                order_id: exit.id.clone(),
            })
            .await;

        self.enter(TradePhase::AwaitExitFillIfExisting);
        self.await_fill(plan, Side::Sell, &exit.id).await
    }

    /// Entry is resting: wait for it, then place and wait for the exit
    async fn resume_entry(&mut self, plan: &SwingTradePlan, entry: &Order) -> SwingResult<Order> {
        self.notifier
            .emit(TradeEvent::EntryAlreadyOpen {
                order_id: entry.id.clone(),
                amount: entry.amount,
            })
            .await;

        self.enter(TradePhase::AwaitEntryFillIfExisting);
        self.await_fill(plan, Side::Buy, &entry.id).await?;

        self.exit_leg(plan, entry.amount).await
    }

    async fn fresh_start(&mut self, plan: &SwingTradePlan) -> SwingResult<(Order, Order)> {
        self.enter(TradePhase::WaitEntryTrigger);

        // Sized once from this sample; later samples only feed the trigger
        let reference_price = if plan.needs_reference_price() {
            Some(self.sample_price(&plan.symbol).await?)
        } else {
            None
        };
        let amount = plan.base_amount(reference_price.unwrap_or(plan.entry_price));
        if let Some(reference_price) = reference_price {
            self.notifier
                .emit(TradeEvent::EntrySized {
                    amount,
                    reference_price,
                })
                .await;
        }

        self.wait_for_trigger(plan, Side::Buy, plan.entry_price, reference_price)
            .await?;

        self.enter(TradePhase::SubmitEntry);
        let entry = self.submit(plan, Side::Buy, amount, plan.entry_price).await?;

        self.enter(TradePhase::AwaitEntryFill);
        self.await_fill(plan, Side::Buy, &entry.id).await?;

        let exit = self.exit_leg(plan, entry.amount).await?;
        Ok((entry, exit))
    }

    /// Trigger, submit and monitor the sell side for `amount`
    async fn exit_leg(&mut self, plan: &SwingTradePlan, amount: f64) -> SwingResult<Order> {
        self.enter(TradePhase::WaitExitTrigger);
        self.wait_for_trigger(plan, Side::Sell, plan.exit_price, None)
            .await?;

        self.enter(TradePhase::SubmitExit);
        let exit = self.submit(plan, Side::Sell, amount, plan.exit_price).await?;

        self.enter(TradePhase::AwaitExitFill);
        self.await_fill(plan, Side::Sell, &exit.id).await?;

        Ok(exit)
    }

    /// Poll the last price until it sits within tolerance of `target`.
    /// `seed` is checked first, before any new sample is taken.
    async fn wait_for_trigger(
        &self,
        plan: &SwingTradePlan,
        side: Side,
        target: f64,
        seed: Option<f64>,
    ) -> SwingResult<f64> {
        let mut seed = seed;
        let price = self
            .poller
            .poll_until(plan.poll_interval, || {
                let seeded = seed.take();
                async move {
                    let price = match seeded {
                        Some(price) => price,
                        None => self.sample_price(&plan.symbol).await?,
                    };

                    if should_submit(price, target, plan.tolerance) {
                        Ok(Some(price))
                    } else {
                        tracing::debug!(
                            side = %side,
                            price,
                            target,
                            distance_pct = distance_pct(price, target),
                            "Price outside trigger band"
                        );
                        Ok(None)
                    }
                }
            })
            .await?;

        self.notifier
            .emit(TradeEvent::TriggerReached {
                side,
                price,
                target,
            })
            .await;

        Ok(price)
    }

    async fn sample_price(&self, symbol: &str) -> SwingResult<f64> {
        let price = self.gateway.last_price(symbol).await?;
        if !price.is_finite() || price <= 0.0 {
            return Err(GatewayError::Malformed(format!(
                "non-positive last price {} for {}",
                price, symbol
            ))
            .into());
        }
        Ok(price)
    }

    async fn submit(
        &self,
        plan: &SwingTradePlan,
        side: Side,
        amount: f64,
        price: f64,
    ) -> SwingResult<Order> {
        let order = self
            .gateway
            .create_limit_order(&plan.symbol, side, amount, price)
            .await?;

        self.notifier
            .emit(TradeEvent::OrderCreated {
                side,
                order_id: order.id.clone(),
                price: order.price,
                amount: order.amount,
            })
            .await;

        Ok(order)
    }

    async fn await_fill(&self, plan: &SwingTradePlan, side: Side, order_id: &str) -> SwingResult<()> {
        self.notifier
            .emit(TradeEvent::AwaitingFill {
                side,
                order_id: order_id.to_string(),
            })
            .await;

        self.monitor
            .wait_until_closed(&plan.symbol, order_id, plan.poll_interval)
            .await?;

        self.notifier
            .emit(TradeEvent::OrderFilled {
                side,
                order_id: order_id.to_string(),
            })
            .await;
        Ok(())
    }

    fn enter(&mut self, phase: TradePhase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "Phase transition");
        self.phase = phase;
        self.phases.push(phase);
    }
}
