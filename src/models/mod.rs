use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Order side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Order lifecycle as reported by the venue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Closed,
    Canceled,
    Expired,
    Rejected,
    /// Anything the venue reports that we don't recognise
    Unknown(String),
}

impl OrderStatus {
    /// Parse the loose status vocabulary used across venues
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" | "new" | "partially_filled" | "pending" => OrderStatus::Open,
            "closed" | "filled" | "done" => OrderStatus::Closed,
            "canceled" | "cancelled" | "pending_cancel" => OrderStatus::Canceled,
            "expired" | "expired_in_match" => OrderStatus::Expired,
            "rejected" => OrderStatus::Rejected,
            other => OrderStatus::Unknown(other.to_string()),
        }
    }

    /// The order will never fill
    pub fn is_dead(&self) -> bool {
        matches!(
            self,
            OrderStatus::Canceled | OrderStatus::Expired | OrderStatus::Rejected
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Open => write!(f, "open"),
            OrderStatus::Closed => write!(f, "closed"),
            OrderStatus::Canceled => write!(f, "canceled"),
            OrderStatus::Expired => write!(f, "expired"),
            OrderStatus::Rejected => write!(f, "rejected"),
            OrderStatus::Unknown(raw) => write!(f, "{}", raw),
        }
    }
}

/// A limit order resting on (or known to) the exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub amount: f64, // Base currency
    pub filled: Option<f64>,
    pub status: OrderStatus,
    pub created_at: Option<DateTime<Utc>>,
}

/// Account balances keyed by currency code
pub type Balances = HashMap<String, f64>;

/// Canonical form of a trading pair: separators dropped, upper-cased.
///
/// `BTC/USDC`, `btc-usdc` and `BTCUSDC` all become `BTCUSDC`.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Split `BASE/QUOTE` into its parts
pub fn split_symbol(symbol: &str) -> Option<(&str, &str)> {
    let (base, quote) = symbol.split_once(['/', '-'])?;
    if base.is_empty() || quote.is_empty() {
        return None;
    }
    Some((base, quote))
}
