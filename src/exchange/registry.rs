use serde::Deserialize;
use std::fmt;
use std::num::NonZeroU32;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use super::binance::{BinanceGateway, BINANCE_API_BASE, BINANCE_TESTNET_API_BASE};
use super::paper::{PaperExchange, PriceFeed, ScriptedPrices};
use super::retry::RetryingGateway;
use super::ExchangeGateway;
use crate::config::Settings;
use crate::error::ConfigError;
use crate::execution::Poller;
use crate::models::Balances;

/// Supported venues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Binance,
    BinanceTestnet,
    Paper,
}

impl ExchangeKind {
    pub fn needs_credentials(&self) -> bool {
        !matches!(self, ExchangeKind::Paper)
    }

    /// Key used for this venue in a secrets file
    pub fn secrets_key(&self) -> &'static str {
        match self {
            ExchangeKind::Binance => "binance",
            ExchangeKind::BinanceTestnet => "binance-testnet",
            ExchangeKind::Paper => "paper",
        }
    }
}

impl FromStr for ExchangeKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(ExchangeKind::Binance),
            "binance-testnet" | "binance_testnet" => Ok(ExchangeKind::BinanceTestnet),
            "paper" => Ok(ExchangeKind::Paper),
            other => Err(ConfigError::UnknownExchange(other.to_string())),
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.secrets_key())
    }
}

/// API key pair. Never printed.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub key: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &"<redacted>")
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
struct SecretsEntry {
    dev_key: Credentials,
}

impl Credentials {
    /// `SWINGBOT_API_KEY` / `SWINGBOT_API_SECRET`
    pub fn from_env() -> Option<Self> {
        let key = std::env::var("SWINGBOT_API_KEY").ok()?;
        let secret = std::env::var("SWINGBOT_API_SECRET").ok()?;
        Some(Self { key, secret })
    }

    /// Read `{ "<exchange>": { "dev_key": { "key": .., "secret": .. } } }`
    pub fn from_secrets_file(path: &Path, exchange: ExchangeKind) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_secrets_json(&raw, exchange)
    }

    pub fn from_secrets_json(raw: &str, exchange: ExchangeKind) -> Result<Self, ConfigError> {
        let mut entries: std::collections::HashMap<String, SecretsEntry> =
            serde_json::from_str(raw).map_err(|e| ConfigError::Load(format!("secrets: {}", e)))?;

        entries
            .remove(exchange.secrets_key())
            .map(|entry| entry.dev_key)
            .ok_or(ConfigError::Missing("secrets.<exchange>.dev_key"))
    }
}

/// Build the gateway the settings ask for, wrapped in the retry policy.
/// Retry backoff waits on `poller`, so shutdown cuts it short.
pub fn build_gateway(
    settings: &Settings,
    credentials: Option<Credentials>,
    poller: Poller,
) -> Result<Arc<dyn ExchangeGateway>, ConfigError> {
    let kind: ExchangeKind = settings.exchange.name.parse()?;

    let inner: Arc<dyn ExchangeGateway> = match kind {
        ExchangeKind::Binance | ExchangeKind::BinanceTestnet => {
            let credentials = credentials.ok_or(ConfigError::Missing("api credentials"))?;
            Arc::new(binance_client(settings, kind, credentials)?)
        }
        ExchangeKind::Paper => {
            let feed: Arc<dyn PriceFeed> = if settings.paper.prices.is_empty() {
                // Live public prices, simulated fills
                Arc::new(binance_client(
                    settings,
                    ExchangeKind::Binance,
                    Credentials {
                        key: String::new(),
                        secret: String::new(),
                    },
                )?)
            } else {
                Arc::new(ScriptedPrices::new(settings.paper.prices.iter().copied()))
            };
            let balances: Balances = settings
                .paper
                .balances
                .iter()
                .map(|(currency, amount)| (currency.to_ascii_uppercase(), *amount))
                .collect();
            Arc::new(PaperExchange::new(feed, balances))
        }
    };

    tracing::info!(exchange = %kind, "Exchange gateway ready");
    Ok(Arc::new(RetryingGateway::new(
        inner,
        settings.retry.clone(),
        poller,
    )))
}

fn binance_client(
    settings: &Settings,
    kind: ExchangeKind,
    credentials: Credentials,
) -> Result<BinanceGateway, ConfigError> {
    let default_base = match kind {
        ExchangeKind::BinanceTestnet => BINANCE_TESTNET_API_BASE,
        _ => BINANCE_API_BASE,
    };
    let base_url = settings
        .exchange
        .base_url
        .as_deref()
        .unwrap_or(default_base);

    let rps = NonZeroU32::new(settings.exchange.requests_per_second).ok_or(
        ConfigError::Invalid {
            field: "exchange.requests_per_second",
            reason: "must be at least 1".to_string(),
        },
    )?;

    let client = BinanceGateway::new(base_url, credentials.key, credentials.secret)
        .map_err(|e| ConfigError::Load(e.to_string()))?
        .with_recv_window(settings.exchange.recv_window_ms)
        .with_rate_limit(rps);
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{InstantClock, Shutdown};

    fn poller() -> Poller {
        Poller::new(Arc::new(InstantClock::new()), Shutdown::never())
    }

    #[test]
    fn test_parse_exchange_kind() {
        assert_eq!("binance".parse::<ExchangeKind>().unwrap(), ExchangeKind::Binance);
        assert_eq!(
            "Binance-Testnet".parse::<ExchangeKind>().unwrap(),
            ExchangeKind::BinanceTestnet
        );
        assert_eq!("paper".parse::<ExchangeKind>().unwrap(), ExchangeKind::Paper);
        assert_eq!(
            "coinbase".parse::<ExchangeKind>().unwrap_err(),
            ConfigError::UnknownExchange("coinbase".into())
        );
    }

    #[test]
    fn test_secrets_file_layout() {
        let raw = r#"{
            "binance": { "dev_key": { "key": "abc", "secret": "xyz" } },
            "paper": { "dev_key": { "key": "", "secret": "" } }
        }"#;

        let creds = Credentials::from_secrets_json(raw, ExchangeKind::Binance).unwrap();
        assert_eq!(creds.key, "abc");
        assert_eq!(creds.secret, "xyz");

        let err = Credentials::from_secrets_json(raw, ExchangeKind::BinanceTestnet).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials {
            key: "abc".into(),
            secret: "xyz".into(),
        };
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("abc"));
        assert!(!printed.contains("xyz"));
    }

    #[test]
    fn test_binance_requires_credentials() {
        let mut settings = Settings::default();
        settings.exchange.name = "binance".into();

        let result = build_gateway(&settings, None, poller());
        assert!(matches!(result, Err(ConfigError::Missing("api credentials"))));
    }

    #[tokio::test]
    async fn test_builds_paper_gateway_from_settings() {
        let mut settings = Settings::default();
        settings.paper.prices = vec![67000.0];

        let gateway = build_gateway(&settings, None, poller()).unwrap();

        assert_eq!(gateway.last_price("BTC/USDC").await.unwrap(), 67000.0);
        assert!(gateway.open_orders().await.unwrap().is_empty());
    }

    #[test]
    fn test_unknown_exchange_rejected() {
        let mut settings = Settings::default();
        settings.exchange.name = "kraken".into();

        let result = build_gateway(&settings, None, poller());
        assert!(matches!(result, Err(ConfigError::UnknownExchange(_))));
    }
}
