use thiserror::Error;

use crate::models::OrderStatus;

/// Failures coming back from an exchange gateway
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    /// Timeout, DNS, connection reset
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by exchange")]
    RateLimited,

    /// 5xx from the venue
    #[error("exchange server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Venue understood the request and refused it
    #[error("request rejected (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    /// Shutdown fired while a retry was backing off
    #[error("interrupted by shutdown")]
    Interrupted,
}

impl GatewayError {
    /// Whether backing off and trying again can help
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Network(_) | GatewayError::RateLimited | GatewayError::Server { .. }
        )
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Malformed(err.to_string())
        } else if err.is_timeout() {
            GatewayError::Network("request timed out".to_string())
        } else if err.is_connect() {
            GatewayError::Network("connection failed".to_string())
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

/// Invalid or missing configuration, raised before any trading action
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("unknown exchange `{0}`")]
    UnknownExchange(String),

    #[error("failed to load configuration: {0}")]
    Load(String),
}

/// Everything that can end a swing trade run early
#[derive(Debug, Error)]
pub enum SwingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Gateway(GatewayError),

    /// A monitored order died instead of filling; needs an operator
    #[error("order {order_id} ended as {status} instead of filling")]
    StaleOrder {
        order_id: String,
        status: OrderStatus,
    },

    /// Both legs are resting at once; refusing to guess which one to honour
    #[error("entry order {entry_id} and exit order {exit_id} are both open")]
    ConflictingOrders { entry_id: String, exit_id: String },

    #[error("shutdown requested")]
    Cancelled,
}

impl From<GatewayError> for SwingError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Interrupted => SwingError::Cancelled,
            other => SwingError::Gateway(other),
        }
    }
}

pub type SwingResult<T> = std::result::Result<T, SwingError>;
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
