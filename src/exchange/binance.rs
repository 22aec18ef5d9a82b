use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::num::NonZeroU32;
use std::sync::Arc;

use super::paper::PriceFeed;
use super::ExchangeGateway;
use crate::error::{GatewayError, GatewayResult};
use crate::models::{normalize_symbol, Balances, Order, OrderStatus, Side};

// Binance Spot REST API
// Docs: https://developers.binance.com/docs/binance-spot-api-docs/rest-api
pub const BINANCE_API_BASE: &str = "https://api.binance.com";
pub const BINANCE_TESTNET_API_BASE: &str = "https://testnet.binance.vision";
const DEFAULT_RECV_WINDOW_MS: u64 = 5000;
const DEFAULT_REQUESTS_PER_SECOND: u32 = 10;

type HmacSha256 = Hmac<Sha256>;

// Type alias for the rate limiter to simplify signatures
type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Binance spot account over signed REST
#[derive(Clone)]
pub struct BinanceGateway {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    recv_window_ms: u64,
    rate_limiter: Arc<BinanceRateLimiter>,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balances: Vec<AssetBalance>,
}

#[derive(Debug, Deserialize)]
struct AssetBalance {
    asset: String,
    free: String,
    locked: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    symbol: String,
    order_id: i64,
    price: String,
    orig_qty: String,
    #[serde(default)]
    executed_qty: Option<String>,
    status: String,
    side: String,
    #[serde(default)]
    time: Option<i64>,
    #[serde(default)]
    transact_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    code: i64,
    msg: String,
}

impl BinanceGateway {
    pub fn new(base_url: &str, api_key: String, api_secret: String) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::Network(format!("failed to build HTTP client: {}", e)))?;

        let rps = NonZeroU32::new(DEFAULT_REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_secret,
            recv_window_ms: DEFAULT_RECV_WINDOW_MS,
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        })
    }

    pub fn with_recv_window(mut self, recv_window_ms: u64) -> Self {
        self.recv_window_ms = recv_window_ms;
        self
    }

    pub fn with_rate_limit(mut self, requests_per_second: NonZeroU32) -> Self {
        self.rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(requests_per_second)));
        self
    }

    /// HMAC-SHA256 of the query string, hex encoded
    fn sign(&self, query: &str) -> GatewayResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| GatewayError::Authentication(format!("unusable API secret: {}", e)))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn public_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> GatewayResult<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}?{}", self.base_url, path, encode_params(params));
        let response = self.client.get(&url).send().await?;
        Self::parse(response).await
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(&str, String)>,
    ) -> GatewayResult<T> {
        self.rate_limiter.until_ready().await;

        params.push(("recvWindow", self.recv_window_ms.to_string()));
        params.push(("timestamp", Utc::now().timestamp_millis().to_string()));
        let query = encode_params(&params);
        let signature = self.sign(&query)?;

        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);
        tracing::debug!(method = %method, path, "Binance signed request");

        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> GatewayResult<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(map_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| GatewayError::Malformed(e.to_string()))
    }
}

/// Map an HTTP failure from Binance onto a gateway error kind
pub fn map_error(status: u16, body: &str) -> GatewayError {
    let parsed = serde_json::from_str::<ErrorResponse>(body).ok();

    if status == 429 || status == 418 || matches!(parsed, Some(ErrorResponse { code: -1003, .. })) {
        return GatewayError::RateLimited;
    }

    if status >= 500 {
        return GatewayError::Server {
            status,
            body: body.to_string(),
        };
    }

    match parsed {
        // Invalid key, bad signature, key lacks permission
        Some(ErrorResponse { code, msg }) if matches!(code, -2014 | -2015 | -1022 | -2008) => {
            GatewayError::Authentication(msg)
        }
        Some(ErrorResponse { code, msg }) => GatewayError::Rejected { code, message: msg },
        None if status == 401 || status == 403 => GatewayError::Authentication(body.to_string()),
        None => GatewayError::Rejected {
            code: i64::from(status),
            message: body.to_string(),
        },
    }
}

fn encode_params(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Decimal text without float noise or trailing zeros (8 dp, Binance's max)
pub fn format_decimal(value: f64) -> String {
    let text = format!("{:.8}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text.is_empty() {
        "0".to_string()
    } else {
        text.to_string()
    }
}

fn parse_decimal(field: &str, raw: &str) -> GatewayResult<f64> {
    raw.parse::<f64>()
        .map_err(|e| GatewayError::Malformed(format!("{} `{}`: {}", field, raw, e)))
}

fn side_param(side: Side) -> &'static str {
    match side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
}

fn parse_side(raw: &str) -> GatewayResult<Side> {
    match raw {
        "BUY" => Ok(Side::Buy),
        "SELL" => Ok(Side::Sell),
        other => Err(GatewayError::Malformed(format!("unknown side `{}`", other))),
    }
}

fn millis_to_utc(millis: Option<i64>) -> Option<DateTime<Utc>> {
    millis.and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

impl OrderResponse {
    fn into_order(self) -> GatewayResult<Order> {
        let filled = match self.executed_qty.as_deref() {
            Some(raw) => Some(parse_decimal("executedQty", raw)?),
            None => None,
        };

        Ok(Order {
            id: self.order_id.to_string(),
            price: parse_decimal("price", &self.price)?,
            amount: parse_decimal("origQty", &self.orig_qty)?,
            filled,
            side: parse_side(&self.side)?,
            status: OrderStatus::parse(&self.status),
            created_at: millis_to_utc(self.time.or(self.transact_time)),
            symbol: self.symbol,
        })
    }
}

#[async_trait]
impl ExchangeGateway for BinanceGateway {
    async fn balances(&self) -> GatewayResult<Balances> {
        let account: AccountResponse = self
            .signed(Method::GET, "/api/v3/account", Vec::new())
            .await?;

        let mut balances = Balances::new();
        for entry in account.balances {
            let total = parse_decimal("free", &entry.free)? + parse_decimal("locked", &entry.locked)?;
            if total > 0.0 {
                balances.insert(entry.asset, total);
            }
        }
        Ok(balances)
    }

    async fn last_price(&self, symbol: &str) -> GatewayResult<f64> {
        let ticker: TickerPrice = self
            .public_get("/api/v3/ticker/price", &[("symbol", normalize_symbol(symbol))])
            .await?;
        parse_decimal("price", &ticker.price)
    }

    async fn open_orders(&self) -> GatewayResult<Vec<Order>> {
        let orders: Vec<OrderResponse> = self
            .signed(Method::GET, "/api/v3/openOrders", Vec::new())
            .await?;
        orders.into_iter().map(OrderResponse::into_order).collect()
    }

    async fn create_limit_order(
        &self,
        symbol: &str,
        side: Side,
        amount: f64,
        price: f64,
    ) -> GatewayResult<Order> {
        let params = vec![
            ("symbol", normalize_symbol(symbol)),
            ("side", side_param(side).to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", format_decimal(amount)),
            ("price", format_decimal(price)),
            ("newClientOrderId", format!("swing-{}", uuid::Uuid::new_v4().simple())),
        ];

        let response: OrderResponse = self.signed(Method::POST, "/api/v3/order", params).await?;
        let order = response.into_order()?;

        tracing::info!(
            symbol,
            side = %side,
            order_id = %order.id,
            amount = order.amount,
            price = order.price,
            "Binance limit order placed"
        );
        Ok(order)
    }

    async fn order_status(&self, symbol: &str, order_id: &str) -> GatewayResult<OrderStatus> {
        let params = vec![
            ("symbol", normalize_symbol(symbol)),
            ("orderId", order_id.to_string()),
        ];
        let response: OrderResponse = self.signed(Method::GET, "/api/v3/order", params).await?;
        Ok(OrderStatus::parse(&response.status))
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> GatewayResult<bool> {
        let params = vec![
            ("symbol", normalize_symbol(symbol)),
            ("orderId", order_id.to_string()),
        ];
        let response: OrderResponse = self
            .signed(Method::DELETE, "/api/v3/order", params)
            .await?;
        Ok(OrderStatus::parse(&response.status) == OrderStatus::Canceled)
    }
}

#[async_trait]
impl PriceFeed for BinanceGateway {
    async fn price(&self, symbol: &str) -> GatewayResult<f64> {
        self.last_price(symbol).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn gateway(url: &str) -> BinanceGateway {
        BinanceGateway::new(url, "test-key".into(), "test-secret".into()).unwrap()
    }

    fn signed_query(extra: Vec<Matcher>) -> Matcher {
        let mut matchers = extra;
        matchers.push(Matcher::Regex("timestamp=\\d+".into()));
        matchers.push(Matcher::Regex("signature=[0-9a-f]{64}".into()));
        Matcher::AllOf(matchers)
    }

    #[test]
    fn test_signature_matches_documented_example() {
        let gateway = BinanceGateway::new(
            BINANCE_API_BASE,
            "key".into(),
            "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j".into(),
        )
        .unwrap();

        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            gateway.sign(query).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(67000.0), "67000");
        assert_eq!(format_decimal(0.0015), "0.0015");
        assert_eq!(format_decimal(100.0 / 66000.0), "0.00151515");
        assert_eq!(format_decimal(0.000000001), "0");
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(map_error(429, ""), GatewayError::RateLimited);
        assert_eq!(map_error(418, ""), GatewayError::RateLimited);
        assert!(matches!(map_error(503, "down"), GatewayError::Server { status: 503, .. }));
        assert!(matches!(
            map_error(401, r#"{"code":-2015,"msg":"Invalid API-key, IP, or permissions for action."}"#),
            GatewayError::Authentication(_)
        ));
        assert!(matches!(
            map_error(400, r#"{"code":-1022,"msg":"Signature for this request is not valid."}"#),
            GatewayError::Authentication(_)
        ));
        assert_eq!(
            map_error(400, r#"{"code":-1013,"msg":"Filter failure: LOT_SIZE"}"#),
            GatewayError::Rejected {
                code: -1013,
                message: "Filter failure: LOT_SIZE".into()
            }
        );
        assert!(matches!(map_error(403, "<html>WAF</html>"), GatewayError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_last_price() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/ticker/price")
            .match_query(Matcher::UrlEncoded("symbol".into(), "BTCUSDC".into()))
            .with_status(200)
            .with_body(r#"{"symbol":"BTCUSDC","price":"67012.34000000"}"#)
            .create_async()
            .await;

        let price = gateway(&server.url()).last_price("BTC/USDC").await.unwrap();

        assert_eq!(price, 67012.34);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_open_orders_are_parsed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/openOrders")
            .match_header("X-MBX-APIKEY", "test-key")
            .match_query(signed_query(vec![]))
            .with_status(200)
            .with_body(
                r#"[{"symbol":"BTCUSDC","orderId":28,"clientOrderId":"x","price":"67000.00000000",
                     "origQty":"0.00150000","executedQty":"0.00000000","status":"NEW",
                     "timeInForce":"GTC","type":"LIMIT","side":"BUY","time":1499827319559}]"#,
            )
            .create_async()
            .await;

        let orders = gateway(&server.url()).open_orders().await.unwrap();

        mock.assert_async().await;
        assert_eq!(orders.len(), 1);
        let order = &orders[0];
        assert_eq!(order.id, "28");
        assert_eq!(order.symbol, "BTCUSDC");
        assert_eq!(order.side, Side::Buy);
        assert_eq!(order.price, 67000.0);
        assert_eq!(order.amount, 0.0015);
        assert_eq!(order.filled, Some(0.0));
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.created_at.unwrap().timestamp_millis(), 1499827319559);
    }

    #[tokio::test]
    async fn test_create_limit_order() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v3/order")
            .match_header("X-MBX-APIKEY", "test-key")
            .match_query(signed_query(vec![
                Matcher::UrlEncoded("symbol".into(), "BTCUSDC".into()),
                Matcher::UrlEncoded("side".into(), "SELL".into()),
                Matcher::UrlEncoded("type".into(), "LIMIT".into()),
                Matcher::UrlEncoded("timeInForce".into(), "GTC".into()),
                Matcher::UrlEncoded("quantity".into(), "0.0015".into()),
                Matcher::UrlEncoded("price".into(), "70000".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"symbol":"BTCUSDC","orderId":29,"clientOrderId":"swing-1","transactTime":1507725176595,
                    "price":"70000.00000000","origQty":"0.00150000","executedQty":"0.00000000",
                    "status":"NEW","timeInForce":"GTC","type":"LIMIT","side":"SELL","fills":[]}"#,
            )
            .create_async()
            .await;

        let order = gateway(&server.url())
            .create_limit_order("BTC/USDC", Side::Sell, 0.0015, 70000.0)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(order.id, "29");
        assert_eq!(order.side, Side::Sell);
        assert!(order.created_at.is_some());
    }

    #[tokio::test]
    async fn test_order_status_maps_filled_to_closed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v3/order")
            .match_query(signed_query(vec![Matcher::UrlEncoded(
                "orderId".into(),
                "28".into(),
            )]))
            .with_status(200)
            .with_body(
                r#"{"symbol":"BTCUSDC","orderId":28,"price":"67000.0","origQty":"0.0015",
                    "executedQty":"0.0015","status":"FILLED","side":"BUY","time":1499827319559}"#,
            )
            .create_async()
            .await;

        let status = gateway(&server.url())
            .order_status("BTC/USDC", "28")
            .await
            .unwrap();
        assert_eq!(status, OrderStatus::Closed);
    }

    #[tokio::test]
    async fn test_cancel_order() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/api/v3/order")
            .match_query(signed_query(vec![Matcher::UrlEncoded(
                "orderId".into(),
                "28".into(),
            )]))
            .with_status(200)
            .with_body(
                r#"{"symbol":"BTCUSDC","orderId":28,"price":"67000.0","origQty":"0.0015",
                    "executedQty":"0.0","status":"CANCELED","side":"BUY"}"#,
            )
            .create_async()
            .await;

        assert!(gateway(&server.url())
            .cancel_order("BTC/USDC", "28")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_balances_sum_free_and_locked() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v3/account")
            .match_query(signed_query(vec![]))
            .with_status(200)
            .with_body(
                r#"{"balances":[{"asset":"BTC","free":"0.5","locked":"0.25"},
                                {"asset":"USDC","free":"1000.0","locked":"0.0"},
                                {"asset":"ETH","free":"0.0","locked":"0.0"}]}"#,
            )
            .create_async()
            .await;

        let balances = gateway(&server.url()).balances().await.unwrap();

        assert_eq!(balances.get("BTC"), Some(&0.75));
        assert_eq!(balances.get("USDC"), Some(&1000.0));
        assert!(!balances.contains_key("ETH"));
    }

    #[tokio::test]
    async fn test_auth_failure_is_fatal_kind() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v3/openOrders")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"code":-2015,"msg":"Invalid API-key, IP, or permissions for action."}"#)
            .create_async()
            .await;

        let err = gateway(&server.url()).open_orders().await.unwrap_err();

        assert!(matches!(err, GatewayError::Authentication(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v3/ticker/price")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = gateway(&server.url()).last_price("BTC/USDC").await.unwrap_err();
        assert!(matches!(err, GatewayError::Malformed(_)));
    }
}
