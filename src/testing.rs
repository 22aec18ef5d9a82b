//! Scripted exchange double shared by unit tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::error::{GatewayError, GatewayResult};
use crate::exchange::ExchangeGateway;
use crate::models::{Balances, Order, OrderStatus, Side};

#[derive(Default)]
struct State {
    prices: VecDeque<f64>,
    last_price: Option<f64>,
    price_calls: usize,
    price_failures: VecDeque<GatewayError>,
    statuses: HashMap<String, VecDeque<OrderStatus>>,
    status_calls: HashMap<String, usize>,
    status_failure: Option<GatewayError>,
    open: Vec<Order>,
    created: Vec<Order>,
    canceled: Vec<String>,
    next_id: usize,
}

/// Replays scripted prices and statuses and records every submission.
///
/// The last scripted price repeats once the script runs dry; orders with no
/// scripted statuses report `closed`.
#[derive(Default)]
pub struct ScriptedGateway {
    state: Mutex<State>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prices(prices: &[f64]) -> Self {
        let gateway = Self::new();
        gateway.state.lock().unwrap().prices = prices.iter().copied().collect();
        gateway
    }

    pub fn with_open_orders(self, orders: Vec<Order>) -> Self {
        self.state.lock().unwrap().open = orders;
        self
    }

    pub fn script_statuses(&self, order_id: &str, statuses: Vec<OrderStatus>) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(order_id.to_string(), statuses.into());
    }

    pub fn fail_next_price_with(&self, err: GatewayError) {
        self.state.lock().unwrap().price_failures.push_back(err);
    }

    pub fn fail_status_with(&self, err: GatewayError) {
        self.state.lock().unwrap().status_failure = Some(err);
    }

    pub fn created(&self) -> Vec<Order> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn canceled(&self) -> Vec<String> {
        self.state.lock().unwrap().canceled.clone()
    }

    pub fn price_calls(&self) -> usize {
        self.state.lock().unwrap().price_calls
    }

    pub fn status_calls(&self, order_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .status_calls
            .get(order_id)
            .copied()
            .unwrap_or(0)
    }
}

pub fn open_order(id: &str, symbol: &str, side: Side, price: f64, amount: f64) -> Order {
    Order {
        id: id.to_string(),
        symbol: symbol.to_string(),
        side,
        price,
        amount,
        filled: None,
        status: OrderStatus::Open,
        created_at: None,
    }
}

#[async_trait]
impl ExchangeGateway for ScriptedGateway {
    async fn balances(&self) -> GatewayResult<Balances> {
        Ok(Balances::from([("USDC".to_string(), 10_000.0), ("BTC".to_string(), 1.0)]))
    }

    async fn last_price(&self, _symbol: &str) -> GatewayResult<f64> {
        let mut state = self.state.lock().unwrap();
        state.price_calls += 1;
        if let Some(err) = state.price_failures.pop_front() {
            return Err(err);
        }
        if let Some(price) = state.prices.pop_front() {
            state.last_price = Some(price);
        }
        state
            .last_price
            .ok_or_else(|| GatewayError::Malformed("no price scripted".into()))
    }

    async fn open_orders(&self) -> GatewayResult<Vec<Order>> {
        Ok(self.state.lock().unwrap().open.clone())
    }

    async fn create_limit_order(
        &self,
        symbol: &str,
        side: Side,
        amount: f64,
        price: f64,
    ) -> GatewayResult<Order> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let order = open_order(&format!("ord-{}", state.next_id), symbol, side, price, amount);
        state.created.push(order.clone());
        Ok(order)
    }

    async fn order_status(&self, _symbol: &str, order_id: &str) -> GatewayResult<OrderStatus> {
        let mut state = self.state.lock().unwrap();
        *state.status_calls.entry(order_id.to_string()).or_insert(0) += 1;
        if let Some(err) = state.status_failure.clone() {
            return Err(err);
        }
        let status = match state.statuses.get_mut(order_id) {
            Some(script) if script.len() > 1 => script.pop_front(),
            Some(script) => script.front().cloned(),
            None => None,
        };
        Ok(status.unwrap_or(OrderStatus::Closed))
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> GatewayResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.open.retain(|o| o.id != order_id);
        state.canceled.push(order_id.to_string());
        Ok(true)
    }
}
