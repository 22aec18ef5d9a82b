use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokio::time::Duration;

use crate::error::ConfigError;
use crate::exchange::RetryConfig;
use crate::execution::DEFAULT_TOLERANCE;
use crate::strategy::{Sizing, SwingTradePlan};

/// Looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "swingbot.toml";

/// Everything the binary reads before it touches an exchange.
///
/// Layers, lowest first: built-in defaults, the TOML file, then
/// `SWINGBOT__SECTION__KEY` environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub exchange: ExchangeSettings,
    pub plan: PlanSettings,
    pub retry: RetryConfig,
    pub notify: NotifySettings,
    pub paper: PaperSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub name: String,
    pub base_url: Option<String>,
    pub recv_window_ms: u64,
    pub requests_per_second: u32,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            name: "paper".to_string(),
            base_url: None,
            recv_window_ms: 5000,
            requests_per_second: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlanSettings {
    pub symbol: Option<String>,
    pub entry_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub notional: Option<f64>,
    pub amount: Option<f64>,
    pub poll_interval_secs: f64,
    pub tolerance: f64,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            symbol: None,
            entry_price: None,
            exit_price: None,
            notional: None,
            amount: None,
            poll_interval_secs: 3.0,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub telegram: Option<TelegramSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub chat_id: String,
}

/// Dry-run venue: a scripted price path (empty means live public prices)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaperSettings {
    pub prices: Vec<f64>,
    pub balances: HashMap<String, f64>,
}

impl Default for PaperSettings {
    fn default() -> Self {
        Self {
            prices: Vec::new(),
            balances: HashMap::from([("USDC".to_string(), 1000.0)]),
        }
    }
}

/// Plan fields given on the command line; each one beats the config layers
#[derive(Debug, Clone, Default)]
pub struct PlanOverrides {
    pub symbol: Option<String>,
    pub entry_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub notional: Option<f64>,
    pub amount: Option<f64>,
    pub poll_interval_secs: Option<f64>,
    pub tolerance: Option<f64>,
}

impl Settings {
    /// Load defaults, then `path` (or `swingbot.toml` if present), then env
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let builder = Config::builder();

        let builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false)),
        };

        builder
            .add_source(env_source())
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Parse settings from a TOML string (no env layer)
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Merge CLI overrides over the `[plan]` section and validate
    pub fn resolve_plan(&self, overrides: &PlanOverrides) -> Result<SwingTradePlan, ConfigError> {
        let plan = &self.plan;

        let symbol = overrides
            .symbol
            .clone()
            .or_else(|| plan.symbol.clone())
            .ok_or(ConfigError::Missing("symbol"))?;
        let entry_price = overrides
            .entry_price
            .or(plan.entry_price)
            .ok_or(ConfigError::Missing("entry_price"))?;
        let exit_price = overrides
            .exit_price
            .or(plan.exit_price)
            .ok_or(ConfigError::Missing("exit_price"))?;

        // A sizing given on the command line replaces the configured one whole
        let sizing = if overrides.notional.is_some() || overrides.amount.is_some() {
            sizing(overrides.notional, overrides.amount)?
        } else {
            sizing(plan.notional, plan.amount)?
        };

        let interval_secs = overrides.poll_interval_secs.unwrap_or(plan.poll_interval_secs);
        if !interval_secs.is_finite() || interval_secs <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_secs",
                reason: format!("must be greater than zero, got {}", interval_secs),
            });
        }

        SwingTradePlan::new(symbol, entry_price, exit_price, sizing)?
            .with_poll_interval(Duration::from_secs_f64(interval_secs))
            .with_tolerance(overrides.tolerance.unwrap_or(plan.tolerance))
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("SWINGBOT")
        .prefix_separator("__")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("paper.prices")
        .try_parsing(true)
}

fn sizing(notional: Option<f64>, amount: Option<f64>) -> Result<Sizing, ConfigError> {
    match (notional, amount) {
        (Some(notional), None) => Ok(Sizing::Notional(notional)),
        (None, Some(amount)) => Ok(Sizing::Amount(amount)),
        (Some(_), Some(_)) => Err(ConfigError::Invalid {
            field: "sizing",
            reason: "give either notional or amount, not both".to_string(),
        }),
        (None, None) => Err(ConfigError::Missing("notional or amount")),
    }
}
