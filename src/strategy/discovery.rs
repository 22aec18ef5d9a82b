use std::cmp::Ordering;

use super::SwingTradePlan;
use crate::models::{normalize_symbol, Order, Side};

/// Which legs of a plan are already resting on the exchange
#[derive(Debug, Clone, PartialEq)]
pub enum Resumption {
    /// Nothing placed yet
    Fresh,
    /// Entry placed by an earlier run, exit not yet
    EntryOpen(Order),
    /// Exit placed by an earlier run; the entry already filled
    ExitOpen(Order),
    /// Both legs open at once. Never resumed automatically.
    Conflicting { entry: Order, exit: Order },
}

impl Resumption {
    pub fn label(&self) -> &'static str {
        match self {
            Resumption::Fresh => "fresh",
            Resumption::EntryOpen(_) => "entry-open",
            Resumption::ExitOpen(_) => "exit-open",
            Resumption::Conflicting { .. } => "conflicting",
        }
    }
}

/// Classify open orders against the plan.
///
/// A leg matches on symbol, side and limit price. When several orders match
/// the same leg the earliest created wins (see [`earliest`]).
pub fn classify(orders: &[Order], plan: &SwingTradePlan) -> Resumption {
    let entry = find_leg(orders, &plan.symbol, Side::Buy, plan.entry_price);
    let exit = find_leg(orders, &plan.symbol, Side::Sell, plan.exit_price);

    match (entry, exit) {
        (None, None) => Resumption::Fresh,
        (Some(entry), None) => Resumption::EntryOpen(entry.clone()),
        (None, Some(exit)) => Resumption::ExitOpen(exit.clone()),
        (Some(entry), Some(exit)) => Resumption::Conflicting {
            entry: entry.clone(),
            exit: exit.clone(),
        },
    }
}

fn find_leg<'a>(orders: &'a [Order], symbol: &str, side: Side, price: f64) -> Option<&'a Order> {
    let symbol = normalize_symbol(symbol);
    let matches: Vec<&Order> = orders
        .iter()
        .filter(|o| o.side == side && prices_match(o.price, price))
        .filter(|o| normalize_symbol(&o.symbol) == symbol)
        .collect();

    if matches.len() > 1 {
        tracing::warn!(
            side = %side,
            price,
            count = matches.len(),
            "Several open orders match one leg, picking the earliest"
        );
    }

    earliest(matches)
}

/// Deterministic tie-break: earliest `created_at` first, undated orders last,
/// then the smallest id. Listing order never matters.
pub fn earliest<'a>(candidates: impl IntoIterator<Item = &'a Order>) -> Option<&'a Order> {
    candidates.into_iter().min_by(|a, b| creation_order(a, b))
}

fn creation_order(a: &Order, b: &Order) -> Ordering {
    match (a.created_at, b.created_at) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id))
}

/// Limit prices are compared exactly, up to float representation noise
pub fn prices_match(a: f64, b: f64) -> bool {
    (a - b).abs() <= f64::EPSILON * a.abs().max(b.abs()).max(1.0)
}
