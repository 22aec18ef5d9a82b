use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::error::ConfigError;
use crate::execution::DEFAULT_TOLERANCE;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// How big the entry order is
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sizing {
    /// Quote currency to spend, converted at a sampled price
    Notional(f64),
    /// Base currency amount, used as-is
    Amount(f64),
}

/// One entry/exit round trip, fixed for the whole run
#[derive(Debug, Clone, PartialEq)]
pub struct SwingTradePlan {
    pub symbol: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub sizing: Sizing,
    pub poll_interval: Duration,
    pub tolerance: f64,
}

impl SwingTradePlan {
    /// Build a plan with the default 3s interval and 5% tolerance
    pub fn new(
        symbol: impl Into<String>,
        entry_price: f64,
        exit_price: f64,
        sizing: Sizing,
    ) -> Result<Self, ConfigError> {
        let plan = Self {
            symbol: symbol.into(),
            entry_price,
            exit_price,
            sizing,
            poll_interval: DEFAULT_POLL_INTERVAL,
            tolerance: DEFAULT_TOLERANCE,
        };
        plan.validate()?;
        Ok(plan)
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Result<Self, ConfigError> {
        self.tolerance = tolerance;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::Missing("symbol"));
        }
        positive("entry_price", self.entry_price)?;
        positive("exit_price", self.exit_price)?;
        match self.sizing {
            Sizing::Notional(notional) => positive("notional", notional)?,
            Sizing::Amount(amount) => positive("amount", amount)?,
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ConfigError::Invalid {
                field: "tolerance",
                reason: format!("must be a non-negative fraction, got {}", self.tolerance),
            });
        }
        Ok(())
    }

    /// Base amount to buy given a sampled reference price
    pub fn base_amount(&self, reference_price: f64) -> f64 {
        match self.sizing {
            Sizing::Notional(notional) => notional / reference_price,
            Sizing::Amount(amount) => amount,
        }
    }

    /// Whether sizing needs a price sample at all
    pub fn needs_reference_price(&self) -> bool {
        matches!(self.sizing, Sizing::Notional(_))
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("must be a positive number, got {}", value),
        })
    }
}
