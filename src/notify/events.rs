use serde::Serialize;
use std::fmt;

use crate::models::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Info,
    Error,
}

/// Progress and failure events emitted by the swing trade
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TradeEvent {
    Started {
        symbol: String,
        entry_price: f64,
        exit_price: f64,
    },
    ExitAlreadyOpen {
        order_id: String,
    },
    EntryAlreadyOpen {
        order_id: String,
        amount: f64,
    },
    EntrySized {
        amount: f64,
        reference_price: f64,
    },
    TriggerReached {
        side: Side,
        price: f64,
        target: f64,
    },
    OrderCreated {
        side: Side,
        order_id: String,
        price: f64,
        amount: f64,
    },
    AwaitingFill {
        side: Side,
        order_id: String,
    },
    OrderFilled {
        side: Side,
        order_id: String,
    },
    Completed {
        symbol: String,
    },
    Fatal {
        message: String,
    },
}

/// ENTRY for buys, EXIT for sells
pub fn leg_label(side: Side) -> &'static str {
    match side {
        Side::Buy => "ENTRY",
        Side::Sell => "EXIT",
    }
}

impl TradeEvent {
    pub fn severity(&self) -> Severity {
        match self {
            TradeEvent::Fatal { .. } => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for TradeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeEvent::Started {
                symbol,
                entry_price,
                exit_price,
            } => write!(
                f,
                "swing trade on {}: entry {} / exit {}",
                symbol, entry_price, exit_price
            ),
            TradeEvent::ExitAlreadyOpen { order_id } => {
                write!(f, "---EXIT order already exists--- ({})", order_id)
            }
            TradeEvent::EntryAlreadyOpen { order_id, amount } => write!(
                f,
                "---ENTRY order already exists--- ({}, amount {})",
                order_id, amount
            ),
            TradeEvent::EntrySized {
                amount,
                reference_price,
            } => write!(f, "entry sized at {:.8} from price {}", amount, reference_price),
            TradeEvent::TriggerReached {
                side,
                price,
                target,
            } => write!(
                f,
                "{} trigger reached: price {} within tolerance of {}",
                leg_label(*side),
                price,
                target
            ),
            TradeEvent::OrderCreated {
                side,
                order_id,
                price,
                amount,
            } => write!(
                f,
                "{} order created ({}: {:.8} @ {})",
                leg_label(*side),
                order_id,
                amount,
                price
            ),
            TradeEvent::AwaitingFill { side, .. } => {
                write!(f, "waiting for {} order to be filled", leg_label(*side))
            }
            TradeEvent::OrderFilled { side, .. } => {
                write!(f, "---{} order filled!---", leg_label(*side))
            }
            TradeEvent::Completed { symbol } => write!(f, "swing trade on {} complete", symbol),
            TradeEvent::Fatal { message } => write!(f, "fatal: {}", message),
        }
    }
}
